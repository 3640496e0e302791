//! Fan out the regions of a request to its extensions.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::Extension;
use super::ExtensionFactory;
use super::Region;
use crate::error::FatalError;
use crate::execution_context::ExecutionContext;
use crate::json_ext::Object;
use crate::middleware::FieldMiddleware;
use crate::middleware::Middleware;

/// The extensions of one request, in registration order, and the state they operate on.
///
/// A blocking runner polls every hook once. A hook that does not complete is
/// abandoned and recorded as [`FatalError::ExtensionSuspended`]; the other
/// hooks still run, so every entered region is exited.
pub struct ExtensionsRunner<'a> {
    context: &'a mut ExecutionContext,
    extensions: Vec<Box<dyn Extension>>,
    blocking: bool,
    fatal: Option<FatalError>,
}

/// Await `hook`, or poll it once when `blocking`.
async fn settle<T>(hook: BoxFuture<'_, T>, blocking: bool) -> Option<T> {
    if blocking {
        hook.now_or_never()
    } else {
        Some(hook.await)
    }
}

fn suspended(fatal: &mut Option<FatalError>, extension: &str, hook: &str) {
    tracing::error!(extension, hook, "{}", FatalError::ExtensionSuspended);
    fatal.get_or_insert(FatalError::ExtensionSuspended);
}

impl<'a> ExtensionsRunner<'a> {
    /// Instantiate every factory for this request, in order.
    pub fn new(context: &'a mut ExecutionContext, factories: &[ExtensionFactory]) -> Self {
        let extensions = factories
            .iter()
            .map(|factory| factory.create_instance(context))
            .collect();
        Self::with_extensions(context, extensions)
    }

    pub fn with_extensions(
        context: &'a mut ExecutionContext,
        extensions: Vec<Box<dyn Extension>>,
    ) -> Self {
        Self {
            context,
            extensions,
            blocking: false,
            fatal: None,
        }
    }

    /// Never wait for a hook: poll each one once.
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    pub fn context(&self) -> &ExecutionContext {
        self.context
    }

    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        self.context
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// The first fatal failure of a hook, if any.
    pub fn check(&self) -> Result<(), FatalError> {
        match self.fatal {
            Some(fatal) => Err(fatal),
            None => Ok(()),
        }
    }

    pub async fn enter(&mut self, region: Region) {
        tracing::trace!(%region, "entering region");
        for extension in self.extensions.iter_mut() {
            let hook = extension.on_enter_async(region, self.context);
            if settle(hook, self.blocking).await.is_none() {
                suspended(&mut self.fatal, extension.name(), "on_enter");
            }
        }
    }

    pub async fn exit(&mut self, region: Region) {
        for extension in self.extensions.iter_mut().rev() {
            let hook = extension.on_exit_async(region, self.context);
            if settle(hook, self.blocking).await.is_none() {
                suspended(&mut self.fatal, extension.name(), "on_exit");
            }
        }
        tracing::trace!(%region, "exited region");
    }

    /// Run `body` inside the parsing region.
    ///
    /// `body` is skipped if entering the region failed; the region is exited either way.
    pub async fn parsing<T>(
        &mut self,
        body: impl FnOnce(&mut ExecutionContext) -> T + Send,
    ) -> Result<T, FatalError>
    where
        T: Send,
    {
        self.scoped(Region::Parsing, body).await
    }

    /// Run `body` inside the validation region.
    ///
    /// Entering the region does not validate anything: `body` decides.
    pub async fn validation<T>(
        &mut self,
        body: impl FnOnce(&mut ExecutionContext) -> T + Send,
    ) -> Result<T, FatalError>
    where
        T: Send,
    {
        self.scoped(Region::Validation, body).await
    }

    async fn scoped<T>(
        &mut self,
        region: Region,
        body: impl FnOnce(&mut ExecutionContext) -> T + Send,
    ) -> Result<T, FatalError>
    where
        T: Send,
    {
        self.enter(region).await;
        let output = match self.check() {
            Ok(()) => Ok(body(self.context)),
            Err(fatal) => Err(fatal),
        };
        self.exit(region).await;
        self.check()?;
        output
    }

    /// The field middlewares of the extensions, followed by `additional` ones.
    pub fn as_middleware<'s>(&'s self, additional: &'s [Arc<dyn FieldMiddleware>]) -> Middleware<'s> {
        let mut middleware = Middleware::new();
        for extension in &self.extensions {
            if let Some(field_middleware) = extension.field_middleware() {
                middleware.push(field_middleware);
            }
        }
        for field_middleware in additional {
            middleware.push(field_middleware.as_ref());
        }
        middleware
    }

    /// Merge the results of every extension; on conflicting keys the last registered wins.
    pub async fn results(&mut self) -> Result<Object, FatalError> {
        let mut merged = Object::new();
        for extension in self.extensions.iter_mut() {
            let hook = extension.results_async(self.context);
            let Some(results) = settle(hook, self.blocking).await else {
                suspended(&mut self.fatal, extension.name(), "results");
                continue;
            };
            tracing::trace!(extension = extension.name(), entries = results.len(), "extension results");
            for (key, value) in results {
                merged.insert(key, value);
            }
        }
        self.check()?;
        Ok(merged)
    }

    /// [`ExtensionsRunner::results`], polling each terminal hook once.
    pub fn results_sync(&mut self) -> Result<Object, FatalError> {
        let blocking = std::mem::replace(&mut self.blocking, true);
        let results = self
            .results()
            .now_or_never()
            .unwrap_or(Err(FatalError::ExtensionSuspended));
        self.blocking = blocking;
        results
    }
}
