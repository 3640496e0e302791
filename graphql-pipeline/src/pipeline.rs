use std::sync::Arc;

use futures::FutureExt;
use tracing::Instrument;

use crate::configuration::Configuration;
use crate::error::FatalError;
use crate::execution_context::ErrorState;
use crate::execution_context::ExecutionContext;
use crate::executor::Execution;
use crate::executor::ExecutionRequest;
use crate::executor::QueryExecutor;
use crate::extension::ApolloTracing;
use crate::extension::ExtensionFactory;
use crate::extension::Region;
use crate::extension::ValidationCache;
use crate::extension::runner::ExtensionsRunner;
use crate::graphql;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::middleware::FieldMiddleware;
use crate::spec::ApolloParser;
use crate::spec::QueryParser;
use crate::spec::QueryValidator;
use crate::spec::RuleValidator;
use crate::spec::Schema;

/// How the pipeline waits for work that cannot complete immediately.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Await it.
    Suspending,
    /// Treat it as fatal.
    Blocking,
}

/// Parses, validates and executes GraphQL requests against one schema.
///
/// A pipeline holds no per-request state and can serve concurrent requests.
pub struct Pipeline {
    schema: Arc<Schema>,
    parser: Arc<dyn QueryParser>,
    validator: Arc<dyn QueryValidator>,
    executor: Arc<dyn QueryExecutor>,
    extensions: Vec<ExtensionFactory>,
    middlewares: Vec<Arc<dyn FieldMiddleware>>,
    validate_queries: bool,
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    schema: Arc<Schema>,
    executor: Arc<dyn QueryExecutor>,
    parser: Arc<dyn QueryParser>,
    validator: Arc<dyn QueryValidator>,
    builtin_extensions: Vec<ExtensionFactory>,
    extensions: Vec<ExtensionFactory>,
    middlewares: Vec<Arc<dyn FieldMiddleware>>,
    validate_queries: bool,
}

impl PipelineBuilder {
    /// Replace the default [`ApolloParser`].
    pub fn parser(mut self, parser: impl QueryParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    /// Replace the default [`RuleValidator`].
    pub fn validator(mut self, validator: impl QueryValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Register an extension. Extensions are instantiated and notified in registration order.
    pub fn extension(mut self, extension: ExtensionFactory) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Register a field middleware, run after the field middlewares of extensions.
    pub fn middleware(mut self, middleware: impl FieldMiddleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Whether queries are validated before execution. Defaults to true.
    pub fn validate_queries(mut self, validate_queries: bool) -> Self {
        self.validate_queries = validate_queries;
        self
    }

    /// Apply `configuration`.
    ///
    /// The built-in extensions it enables run before the registered ones.
    pub fn configuration(mut self, configuration: &Configuration) -> Self {
        self.validate_queries = configuration.validate_queries;
        self.builtin_extensions.clear();
        if configuration.validation_cache.enabled {
            let cache = ValidationCache::new(configuration.validation_cache.capacity);
            self.builtin_extensions.push(cache.factory());
        }
        if configuration.apollo_tracing {
            self.builtin_extensions
                .push(ExtensionFactory::of::<ApolloTracing>());
        }
        self
    }

    pub fn build(self) -> Pipeline {
        let extensions = self
            .builtin_extensions
            .into_iter()
            .chain(self.extensions)
            .collect();
        Pipeline {
            schema: self.schema,
            parser: self.parser,
            validator: self.validator,
            executor: self.executor,
            extensions,
            middlewares: self.middlewares,
            validate_queries: self.validate_queries,
        }
    }
}

impl Pipeline {
    /// Returns a builder for a pipeline serving `schema` with `executor`.
    pub fn builder(schema: Arc<Schema>, executor: impl QueryExecutor + 'static) -> PipelineBuilder {
        PipelineBuilder {
            schema,
            executor: Arc::new(executor),
            parser: Arc::new(ApolloParser),
            validator: Arc::new(RuleValidator),
            builtin_extensions: Vec::new(),
            extensions: Vec::new(),
            middlewares: Vec::new(),
            validate_queries: true,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The state of a new request for `query`, without variables.
    pub fn execution_context(&self, query: impl Into<String>) -> ExecutionContext {
        ExecutionContext::builder()
            .query(query)
            .schema(self.schema.clone())
            .build()
    }

    /// Run the request held by `context`, awaiting resolvers and extension hooks that suspend.
    ///
    /// Query errors are reported in the response. An `Err` is only returned on
    /// a [`FatalError`].
    pub async fn execute(&self, context: &mut ExecutionContext) -> Result<Response, FatalError> {
        let span = request_span(context);
        self.run(context, Mode::Suspending).instrument(span).await
    }

    /// Run the request held by `context` without ever suspending.
    ///
    /// Fails with [`FatalError::ExecutionIncomplete`] if the executor cannot
    /// complete synchronously, and with [`FatalError::ExtensionSuspended`] if
    /// an extension hook suspends. Either way the regions already entered are
    /// exited before returning.
    pub fn execute_sync(&self, context: &mut ExecutionContext) -> Result<Response, FatalError> {
        let span = request_span(context);
        match self
            .run(context, Mode::Blocking)
            .instrument(span)
            .now_or_never()
        {
            Some(result) => result,
            None => {
                tracing::error!("{}", FatalError::ExtensionSuspended);
                Err(FatalError::ExtensionSuspended)
            }
        }
    }

    async fn run(&self, context: &mut ExecutionContext, mode: Mode) -> Result<Response, FatalError> {
        let mut runner = ExtensionsRunner::new(context, &self.extensions);
        if mode == Mode::Blocking {
            runner = runner.blocking();
        }

        runner.enter(Region::Request).await;
        let outcome = match runner.check() {
            Ok(()) => self.run_phases(&mut runner, mode).await,
            Err(fatal) => Err(fatal),
        };
        runner.exit(Region::Request).await;

        let mut response = outcome?;
        runner.check()?;
        let results = match mode {
            Mode::Suspending => runner.results().await?,
            Mode::Blocking => runner.results_sync()?,
        };
        for (key, value) in results {
            response.extensions.insert(key, value);
        }
        Ok(response)
    }

    async fn run_phases(
        &self,
        runner: &mut ExtensionsRunner<'_>,
        mode: Mode,
    ) -> Result<Response, FatalError> {
        let parser = self.parser.as_ref();
        let document = match runner
            .parsing(|context| context.parse_document(parser))
            .await?
        {
            Ok(document) => document,
            Err(failure) => {
                let error = graphql::Error::from(failure);
                tracing::debug!(%error, "request failed to parse");
                runner.context_mut().record_errors(vec![error.clone()]);
                return Ok(Response::from_errors(vec![error]));
            }
        };

        if self.validate_queries && runner.context().errors().is_undetermined() {
            let validator = self.validator.as_ref();
            runner
                .validation(|context| {
                    // an extension may have determined the errors on entering the region
                    if context.errors().is_undetermined() {
                        let errors = validator.validate(
                            context.schema(),
                            &document,
                            context.validation_rules(),
                        );
                        context.record_errors(errors);
                    }
                })
                .await?;
        }
        if let ErrorState::Failed(errors) = runner.context().errors() {
            tracing::debug!(count = errors.len(), "request failed validation");
            return Ok(Response::from_errors(errors.clone()));
        }

        let result = {
            let context = runner.context();
            let request = ExecutionRequest {
                schema: context.schema(),
                document: &document,
                root_value: context.root_value(),
                middleware: runner.as_middleware(&self.middlewares),
                variables: context.variables(),
                operation_name: context.operation_name(),
                context: context.context(),
            };
            match self.executor.execute(request) {
                Execution::Complete(result) => result,
                Execution::Pending(pending) => match mode {
                    Mode::Suspending => pending.await,
                    Mode::Blocking => {
                        drop(pending);
                        tracing::error!("{}", FatalError::ExecutionIncomplete);
                        return Err(FatalError::ExecutionIncomplete);
                    }
                },
            }
        };

        let context = runner.context_mut();
        context.record_execution_errors(&result.errors);
        context.set_result(result.clone());
        Ok(Response {
            data: result.data,
            errors: result.errors,
            extensions: Object::new(),
        })
    }
}

fn request_span(context: &ExecutionContext) -> tracing::Span {
    tracing::info_span!(
        "graphql_request",
        "otel.kind" = "INTERNAL",
        "graphql.operation.name" = context.operation_name().unwrap_or_default(),
    )
}
