//! Extensions observe and alter the phases of a request.
//!
//! A request goes through nested regions: the [`Region::Request`] region
//! wraps [`Region::Parsing`] and, when validation runs, [`Region::Validation`].
//! Extensions are notified when each region is entered and exited, may resolve
//! every field through their own [`FieldMiddleware`], and contribute entries to
//! the `extensions` member of the response once the request is over.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use displaydoc::Display;

use crate::execution_context::ExecutionContext;
use crate::json_ext::Object;
use crate::middleware::FieldMiddleware;

pub mod runner;
mod timing;
mod validation_cache;
mod validation_rules;

pub use timing::ApolloTracing;
pub use validation_cache::ValidationCache;
pub use validation_rules::AddValidationRules;

/// A phase of a request, as seen by extensions.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Region {
    /// request
    Request,
    /// parsing
    Parsing,
    /// validation
    Validation,
}

/// Hooks into the lifecycle of one request.
///
/// A fresh instance is created for each request by its [`ExtensionFactory`].
/// Enter hooks run in registration order, exit hooks in reverse order, so the
/// last registered extension is the innermost one.
///
/// Every hook is optional. The `_async` variants default to their blocking
/// counterpart; an extension that overrides one of them and actually suspends
/// cannot be used with [`crate::Pipeline::execute_sync`].
#[async_trait]
pub trait Extension: Send + Sync + 'static {
    fn on_enter(&mut self, _region: Region, _context: &mut ExecutionContext) {}

    fn on_exit(&mut self, _region: Region, _context: &mut ExecutionContext) {}

    async fn on_enter_async(&mut self, region: Region, context: &mut ExecutionContext) {
        self.on_enter(region, context)
    }

    async fn on_exit_async(&mut self, region: Region, context: &mut ExecutionContext) {
        self.on_exit(region, context)
    }

    /// Entries to merge into the response `extensions`.
    ///
    /// Called once, after the request region closed. Earlier phases may have
    /// failed: do not assume a document or a result are available.
    fn results(&mut self, _context: &ExecutionContext) -> Object {
        Object::new()
    }

    async fn results_async(&mut self, context: &ExecutionContext) -> Object {
        self.results(context)
    }

    /// The middleware wrapping the resolution of every field, if any.
    fn field_middleware(&self) -> Option<&dyn FieldMiddleware> {
        None
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

type Constructor = dyn Fn(&ExecutionContext) -> Box<dyn Extension> + Send + Sync;

/// Creates the instance of an extension for each request.
#[derive(Clone)]
pub struct ExtensionFactory {
    name: String,
    constructor: Arc<Constructor>,
}

impl ExtensionFactory {
    pub fn new(
        name: impl Into<String>,
        constructor: impl Fn(&ExecutionContext) -> Box<dyn Extension> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            constructor: Arc::new(constructor),
        }
    }

    /// A factory creating `E::default()` for each request.
    pub fn of<E>() -> Self
    where
        E: Extension + Default,
    {
        Self::new(
            std::any::type_name::<E>(),
            |_: &ExecutionContext| -> Box<dyn Extension> { Box::new(E::default()) },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create_instance(&self, context: &ExecutionContext) -> Box<dyn Extension> {
        (self.constructor)(context)
    }
}

impl fmt::Debug for ExtensionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionFactory")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
