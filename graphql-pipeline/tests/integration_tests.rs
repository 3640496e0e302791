use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use graphql_pipeline::Configuration;
use graphql_pipeline::ErrorState;
use graphql_pipeline::ExecutionContext;
use graphql_pipeline::Extension;
use graphql_pipeline::ExtensionFactory;
use graphql_pipeline::Pipeline;
use graphql_pipeline::Region;
use graphql_pipeline::extension::AddValidationRules;
use graphql_pipeline::error::FatalError;
use graphql_pipeline::executor::Execution;
use graphql_pipeline::executor::ExecutionRequest;
use graphql_pipeline::executor::QueryExecutor;
use graphql_pipeline::graphql;
use graphql_pipeline::graphql::Response;
use graphql_pipeline::json_ext::Object;
use graphql_pipeline::json_ext::Value;
use graphql_pipeline::middleware::FieldInfo;
use graphql_pipeline::middleware::FieldMiddleware;
use graphql_pipeline::middleware::FieldResult;
use graphql_pipeline::middleware::Next;
use graphql_pipeline::spec::ApolloParser;
use graphql_pipeline::spec::Document;
use graphql_pipeline::spec::ParseFailure;
use graphql_pipeline::spec::ParsedDocument;
use graphql_pipeline::spec::QueryParser;
use graphql_pipeline::spec::QueryValidator;
use graphql_pipeline::spec::Schema;
use graphql_pipeline::spec::ValidationRule;
use graphql_pipeline::test_harness::RootValueExecutor;
use parking_lot::Mutex;
use serde_json_bytes::json;
use test_log::test;

const SDL: &str = "type Query { hello: String goodbye: String }";

mockall::mock! {
    Validator {}

    impl QueryValidator for Validator {
        fn validate(
            &self,
            schema: &Schema,
            document: &Document,
            rules: &[Arc<dyn ValidationRule>],
        ) -> Vec<graphql::Error>;
    }
}

#[derive(Clone, Copy, Debug)]
enum Mode {
    Async,
    Sync,
}

const MODES: [Mode; 2] = [Mode::Async, Mode::Sync];

async fn execute(
    pipeline: &Pipeline,
    context: &mut ExecutionContext,
    mode: Mode,
) -> Result<Response, FatalError> {
    match mode {
        Mode::Async => pipeline.execute(context).await,
        Mode::Sync => pipeline.execute_sync(context),
    }
}

fn schema() -> Arc<Schema> {
    Arc::new(Schema::parse(SDL).unwrap())
}

fn request(pipeline: &Pipeline, query: &str) -> ExecutionContext {
    ExecutionContext::builder()
        .query(query)
        .schema(pipeline.schema().clone())
        .root_value(json!({ "hello": "world" }))
        .build()
}

fn validator_never_called() -> MockValidator {
    let mut validator = MockValidator::new();
    validator.expect_validate().never();
    validator
}

/// Wraps [`RootValueExecutor`], counting executions.
#[derive(Clone, Default)]
struct CountingExecutor {
    calls: Arc<AtomicUsize>,
}

impl CountingExecutor {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl QueryExecutor for CountingExecutor {
    fn execute<'a>(&'a self, request: ExecutionRequest<'a>) -> Execution<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        RootValueExecutor.execute(request)
    }
}

/// Never completes. Records whether its pending work was dropped.
#[derive(Clone, Default)]
struct StuckExecutor {
    cancelled: Arc<AtomicBool>,
}

struct CancelGuard(Arc<AtomicBool>);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl QueryExecutor for StuckExecutor {
    fn execute<'a>(&'a self, _request: ExecutionRequest<'a>) -> Execution<'a> {
        let guard = CancelGuard(self.cancelled.clone());
        Execution::Pending(
            async move {
                let _guard = guard;
                futures::future::pending::<Response>().await
            }
            .boxed(),
        )
    }
}

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }
}

struct Recording {
    name: &'static str,
    journal: Journal,
    results: Object,
}

impl Extension for Recording {
    fn on_enter(&mut self, region: Region, _context: &mut ExecutionContext) {
        self.journal.push(format!("{} enter {region}", self.name));
    }

    fn on_exit(&mut self, region: Region, _context: &mut ExecutionContext) {
        self.journal.push(format!("{} exit {region}", self.name));
    }

    fn results(&mut self, context: &ExecutionContext) -> Object {
        let state = match context.errors() {
            ErrorState::Undetermined => "undetermined".to_string(),
            ErrorState::Clean => "clean".to_string(),
            ErrorState::Failed(errors) => format!("failed({})", errors.len()),
        };
        self.journal.push(format!("{} results {state}", self.name));
        self.results.clone()
    }
}

fn recording(name: &'static str, journal: &Journal, results: Value) -> ExtensionFactory {
    let journal = journal.clone();
    let results = results.as_object().cloned().unwrap_or_default();
    ExtensionFactory::new(name, move |_: &ExecutionContext| -> Box<dyn Extension> {
        Box::new(Recording {
            name,
            journal: journal.clone(),
            results: results.clone(),
        })
    })
}

/// Suspends once before resolving each field.
struct Yielding;

impl FieldMiddleware for Yielding {
    fn resolve<'a>(&'a self, info: &'a FieldInfo<'a>, next: Next<'a>) -> BoxFuture<'a, FieldResult> {
        async move {
            tokio::task::yield_now().await;
            next.run(info).await
        }
        .boxed()
    }
}

/// Fails every field named `goodbye`.
struct FailGoodbye;

impl FieldMiddleware for FailGoodbye {
    fn resolve<'a>(&'a self, info: &'a FieldInfo<'a>, next: Next<'a>) -> BoxFuture<'a, FieldResult> {
        async move {
            if info.field_name == "goodbye" {
                return Err(graphql::Error::builder().message("no goodbyes").build());
            }
            next.run(info).await
        }
        .boxed()
    }
}

#[test(tokio::test)]
async fn hello_world() {
    for mode in MODES {
        let pipeline = Pipeline::builder(schema(), RootValueExecutor).build();
        let mut context = request(&pipeline, "{ hello }");
        let response = execute(&pipeline, &mut context, mode).await.unwrap();

        insta::allow_duplicates! {
            insta::assert_json_snapshot!(response, @r###"
            {
              "data": {
                "hello": "world"
              }
            }
            "###);
        }
        assert_eq!(context.errors(), &ErrorState::Clean);
        assert_eq!(context.result(), Some(&response));
    }
}

#[test(tokio::test)]
async fn malformed_query_is_a_single_error() {
    for query in ["{ hello", "query {", "}{", "{ hello(: 1) }"] {
        for mode in MODES {
            let executor = CountingExecutor::default();
            let journal = Journal::default();
            let pipeline = Pipeline::builder(schema(), executor.clone())
                .validator(validator_never_called())
                .extension(recording("ext", &journal, json!({ "seen": true })))
                .build();
            let mut context = request(&pipeline, query);
            let response = execute(&pipeline, &mut context, mode).await.unwrap();

            assert_eq!(response.data, None, "{query} ({mode:?})");
            assert_eq!(response.errors.len(), 1, "{query} ({mode:?})");
            assert_eq!(
                response.errors[0].extension_code().as_deref(),
                Some("GRAPHQL_PARSING_FAILED")
            );
            assert_eq!(response.extensions, json!({ "seen": true }).as_object().cloned().unwrap());
            assert_eq!(executor.calls(), 0);
            assert_eq!(
                journal.entries(),
                [
                    "ext enter request",
                    "ext enter parsing",
                    "ext exit parsing",
                    "ext exit request",
                    "ext results failed(1)",
                ]
            );
        }
    }
}

#[test(tokio::test)]
async fn validation_errors_skip_execution() {
    for mode in MODES {
        let executor = CountingExecutor::default();
        let journal = Journal::default();
        let mut validator = MockValidator::new();
        validator.expect_validate().times(1).returning(|_, _, _| {
            (0..3)
                .map(|i| graphql::Error::builder().message(format!("error {i}")).build())
                .collect()
        });
        let pipeline = Pipeline::builder(schema(), executor.clone())
            .validator(validator)
            .extension(recording("ext", &journal, json!({ "a": 1 })))
            .build();
        let mut context = request(&pipeline, "{ hello }");
        let response = execute(&pipeline, &mut context, mode).await.unwrap();

        assert_eq!(response.data, None);
        assert_eq!(response.errors.len(), 3);
        assert_eq!(response.errors[2].message, "error 2");
        // extension results are merged on this path in both modes
        assert_eq!(response.extensions, json!({ "a": 1 }).as_object().cloned().unwrap());
        assert_eq!(executor.calls(), 0);
        assert_eq!(
            journal.entries(),
            [
                "ext enter request",
                "ext enter parsing",
                "ext exit parsing",
                "ext enter validation",
                "ext exit validation",
                "ext exit request",
                "ext results failed(3)",
            ]
        );
    }
}

#[test(tokio::test)]
async fn schema_validation_errors_are_reported() {
    for mode in MODES {
        let executor = CountingExecutor::default();
        let pipeline = Pipeline::builder(schema(), executor.clone()).build();
        let mut context = request(&pipeline, "{ hello unknown }");
        let response = execute(&pipeline, &mut context, mode).await.unwrap();

        assert_eq!(response.data, None);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(
            response.errors[0].extension_code().as_deref(),
            Some("GRAPHQL_VALIDATION_FAILED")
        );
        assert_eq!(executor.calls(), 0);
    }
}

#[test(tokio::test)]
async fn disabled_validation_still_executes() {
    for mode in MODES {
        let executor = CountingExecutor::default();
        let journal = Journal::default();
        let pipeline = Pipeline::builder(schema(), executor.clone())
            .validator(validator_never_called())
            .validate_queries(false)
            .extension(recording("ext", &journal, json!({})))
            .build();
        let mut context = request(&pipeline, "{ hello unknown }");
        let response = execute(&pipeline, &mut context, mode).await.unwrap();

        assert_eq!(executor.calls(), 1);
        assert_eq!(
            response.data,
            Some(json!({ "hello": "world", "unknown": null }))
        );
        assert_eq!(journal.count("ext enter validation"), 0);
    }
}

#[test(tokio::test)]
async fn regions_exit_once_in_reverse_order() {
    for mode in MODES {
        let journal = Journal::default();
        let pipeline = Pipeline::builder(schema(), RootValueExecutor)
            .extension(recording("first", &journal, json!({})))
            .extension(recording("second", &journal, json!({})))
            .build();
        let mut context = request(&pipeline, "{ hello }");
        execute(&pipeline, &mut context, mode).await.unwrap();

        assert_eq!(
            journal.entries(),
            [
                "first enter request",
                "second enter request",
                "first enter parsing",
                "second enter parsing",
                "second exit parsing",
                "first exit parsing",
                "first enter validation",
                "second enter validation",
                "second exit validation",
                "first exit validation",
                "second exit request",
                "first exit request",
                "first results clean",
                "second results clean",
            ]
        );
    }
}

#[test(tokio::test)]
async fn last_registered_extension_wins() {
    for mode in MODES {
        let journal = Journal::default();
        let pipeline = Pipeline::builder(schema(), RootValueExecutor)
            .extension(recording("first", &journal, json!({ "a": 1, "b": 1 })))
            .extension(recording("second", &journal, json!({ "a": 2 })))
            .build();
        let mut context = request(&pipeline, "{ hello }");
        let response = execute(&pipeline, &mut context, mode).await.unwrap();

        insta::allow_duplicates! {
            insta::assert_json_snapshot!(response, @r###"
            {
              "data": {
                "hello": "world"
              },
              "extensions": {
                "a": 2,
                "b": 1
              }
            }
            "###);
        }
    }
}

#[test]
fn pending_execution_is_fatal_without_awaiting() {
    let executor = StuckExecutor::default();
    let journal = Journal::default();
    let pipeline = Pipeline::builder(schema(), executor.clone())
        .extension(recording("ext", &journal, json!({})))
        .build();
    let mut context = request(&pipeline, "{ hello }");

    let result = pipeline.execute_sync(&mut context);

    assert_eq!(result, Err(FatalError::ExecutionIncomplete));
    assert!(executor.cancelled.load(Ordering::SeqCst));
    assert_eq!(journal.count("ext exit request"), 1);
    assert_eq!(journal.count("ext results clean"), 0);
    assert!(context.result().is_none());
}

#[test(tokio::test)]
async fn suspending_resolvers_are_awaited() {
    let pipeline = Pipeline::builder(schema(), RootValueExecutor)
        .middleware(Yielding)
        .build();

    let mut context = request(&pipeline, "{ hello }");
    let response = pipeline.execute(&mut context).await.unwrap();
    assert_eq!(response.data, Some(json!({ "hello": "world" })));

    let mut context = request(&pipeline, "{ hello }");
    assert_eq!(
        pipeline.execute_sync(&mut context),
        Err(FatalError::ExecutionIncomplete)
    );
}

#[derive(Default)]
struct SuspendingHooks;

#[async_trait]
impl Extension for SuspendingHooks {
    async fn on_enter_async(&mut self, _region: Region, _context: &mut ExecutionContext) {
        tokio::task::yield_now().await;
    }
}

#[test(tokio::test)]
async fn suspending_hooks_are_rejected_synchronously() {
    let pipeline = Pipeline::builder(schema(), RootValueExecutor)
        .extension(ExtensionFactory::of::<SuspendingHooks>())
        .build();

    let mut context = request(&pipeline, "{ hello }");
    assert_eq!(
        pipeline.execute_sync(&mut context),
        Err(FatalError::ExtensionSuspended)
    );

    let mut context = request(&pipeline, "{ hello }");
    let response = pipeline.execute(&mut context).await.unwrap();
    assert_eq!(response.data, Some(json!({ "hello": "world" })));
}

#[test(tokio::test)]
async fn resolver_errors_are_visible_to_extensions() {
    for mode in MODES {
        let journal = Journal::default();
        let pipeline = Pipeline::builder(schema(), RootValueExecutor)
            .middleware(FailGoodbye)
            .extension(recording("ext", &journal, json!({})))
            .build();
        let mut context = request(&pipeline, "{ hello goodbye }");
        let response = execute(&pipeline, &mut context, mode).await.unwrap();

        insta::allow_duplicates! {
            insta::assert_json_snapshot!(response, @r###"
            {
              "data": {
                "hello": "world",
                "goodbye": null
              },
              "errors": [
                {
                  "message": "no goodbyes",
                  "path": [
                    "goodbye"
                  ]
                }
              ]
            }
            "###);
        }
        assert_eq!(journal.count("ext results failed(1)"), 1);
    }
}

/// Records the order in which field middlewares run.
struct Tag {
    name: &'static str,
    journal: Journal,
}

impl FieldMiddleware for Tag {
    fn resolve<'a>(&'a self, info: &'a FieldInfo<'a>, next: Next<'a>) -> BoxFuture<'a, FieldResult> {
        async move {
            self.journal.push(format!("{} {}", self.name, info.path));
            next.run(info).await
        }
        .boxed()
    }
}

struct TaggingExtension {
    tag: Tag,
}

impl Extension for TaggingExtension {
    fn field_middleware(&self) -> Option<&dyn FieldMiddleware> {
        Some(&self.tag)
    }
}

#[test(tokio::test)]
async fn extension_middlewares_run_before_pipeline_middlewares() {
    for mode in MODES {
        let journal = Journal::default();
        let extension_journal = journal.clone();
        let pipeline = Pipeline::builder(schema(), RootValueExecutor)
            .middleware(Tag {
                name: "pipeline",
                journal: journal.clone(),
            })
            .extension(ExtensionFactory::new(
                "tagging",
                move |_: &ExecutionContext| -> Box<dyn Extension> {
                    Box::new(TaggingExtension {
                        tag: Tag {
                            name: "extension",
                            journal: extension_journal.clone(),
                        },
                    })
                },
            ))
            .build();
        let mut context = request(&pipeline, "{ hello }");
        execute(&pipeline, &mut context, mode).await.unwrap();

        assert_eq!(journal.entries(), ["extension /hello", "pipeline /hello"]);
    }
}

#[test(tokio::test)]
async fn validation_cache_replaces_the_validator() {
    let configuration = Configuration::from_yaml("validation_cache:\n  enabled: true").unwrap();
    let executor = CountingExecutor::default();
    let pipeline = Pipeline::builder(schema(), executor.clone())
        .validator(validator_never_called())
        .configuration(&configuration)
        .build();

    for mode in MODES {
        let mut context = request(&pipeline, "{ hello unknown }");
        let response = execute(&pipeline, &mut context, mode).await.unwrap();
        assert_eq!(response.errors.len(), 1);

        let mut context = request(&pipeline, "{ hello }");
        let response = execute(&pipeline, &mut context, mode).await.unwrap();
        assert_eq!(response.data, Some(json!({ "hello": "world" })));
    }
    assert_eq!(executor.calls(), 2);
}

#[test(tokio::test)]
async fn apollo_tracing_reports_resolvers() {
    let configuration = Configuration::from_yaml("apollo_tracing: true").unwrap();
    let pipeline = Pipeline::builder(schema(), RootValueExecutor)
        .configuration(&configuration)
        .build();

    for mode in MODES {
        let mut context = request(&pipeline, "{ hello greeting: hello }");
        let response = execute(&pipeline, &mut context, mode).await.unwrap();

        let tracing = serde_json::to_value(response.extensions.get("tracing").unwrap()).unwrap();
        assert_eq!(tracing["version"], 1);
        assert!(tracing["duration"].as_u64().is_some());
        let paths: Vec<_> = tracing["execution"]["resolvers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|resolver| resolver["path"].clone())
            .collect();
        assert_eq!(
            paths,
            [serde_json::json!(["hello"]), serde_json::json!(["greeting"])]
        );
    }
}

#[test(tokio::test)]
async fn preparsed_documents_are_not_parsed_again() {
    let pipeline = Pipeline::builder(schema(), RootValueExecutor).build();
    let document = ApolloParser.parse("{ hello }").unwrap();

    for mode in MODES {
        // the query text is not valid GraphQL: only the document is used
        let mut context = ExecutionContext::builder()
            .query("not graphql")
            .schema(pipeline.schema().clone())
            .document(document.clone())
            .root_value(json!({ "hello": "world" }))
            .build();
        let response = execute(&pipeline, &mut context, mode).await.unwrap();
        assert_eq!(response.data, Some(json!({ "hello": "world" })));
        assert!(Arc::ptr_eq(context.document().unwrap(), &document));
    }
}

/// Suspends when the parsing region is entered.
#[derive(Default)]
struct SuspendsWhileParsing;

#[async_trait]
impl Extension for SuspendsWhileParsing {
    async fn on_enter_async(&mut self, region: Region, _context: &mut ExecutionContext) {
        if region == Region::Parsing {
            tokio::task::yield_now().await;
        }
    }
}

#[test(tokio::test)]
async fn suspended_hooks_still_exit_entered_regions() {
    let executor = CountingExecutor::default();
    let journal = Journal::default();
    let pipeline = Pipeline::builder(schema(), executor.clone())
        .extension(recording("ext", &journal, json!({ "seen": true })))
        .extension(ExtensionFactory::of::<SuspendsWhileParsing>())
        .build();

    let mut context = request(&pipeline, "{ hello }");
    assert_eq!(
        pipeline.execute_sync(&mut context),
        Err(FatalError::ExtensionSuspended)
    );
    assert_eq!(
        journal.entries(),
        [
            "ext enter request",
            "ext enter parsing",
            "ext exit parsing",
            "ext exit request",
        ]
    );
    assert!(context.document().is_none());
    assert_eq!(executor.calls(), 0);

    let mut context = request(&pipeline, "{ hello }");
    let response = pipeline.execute(&mut context).await.unwrap();
    assert_eq!(response.data, Some(json!({ "hello": "world" })));
    assert_eq!(executor.calls(), 1);
    assert_eq!(journal.count("ext exit request"), 2);
}

/// Fails without a GraphQL diagnostic.
#[derive(Clone, Default)]
struct CrashingParser {
    calls: Arc<AtomicUsize>,
}

impl QueryParser for CrashingParser {
    fn parse(&self, _query: &str) -> Result<ParsedDocument, ParseFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ParseFailure::Unexpected(
            std::io::Error::other("parser crashed").into(),
        ))
    }
}

#[test(tokio::test)]
async fn unexpected_parse_failures_are_reported() {
    for mode in MODES {
        let parser = CrashingParser::default();
        let executor = CountingExecutor::default();
        let pipeline = Pipeline::builder(schema(), executor.clone())
            .parser(parser.clone())
            .validator(validator_never_called())
            .build();
        let mut context = request(&pipeline, "{ hello }");
        let response = execute(&pipeline, &mut context, mode).await.unwrap();

        assert_eq!(response.data, None);
        assert_eq!(response.errors.len(), 1);
        let error = &response.errors[0];
        assert_eq!(error.message, "parser crashed");
        assert_eq!(error.extension_code().as_deref(), Some("PARSING_ERROR"));
        assert_eq!(error.source().unwrap().to_string(), "parser crashed");
        assert_eq!(context.errors().errors(), response.errors.as_slice());
        assert_eq!(parser.calls.load(Ordering::SeqCst), 1);
        assert_eq!(executor.calls(), 0);
    }
}

/// Fails every request once it is parsed.
#[derive(Default)]
struct RejectAfterParsing;

impl Extension for RejectAfterParsing {
    fn on_exit(&mut self, region: Region, context: &mut ExecutionContext) {
        if region == Region::Parsing {
            context.record_errors(vec![graphql::Error::builder().message("rejected").build()]);
        }
    }
}

#[test(tokio::test)]
async fn failed_requests_skip_execution_without_validation() {
    for mode in MODES {
        let executor = CountingExecutor::default();
        let pipeline = Pipeline::builder(schema(), executor.clone())
            .validator(validator_never_called())
            .validate_queries(false)
            .extension(ExtensionFactory::of::<RejectAfterParsing>())
            .build();
        let mut context = request(&pipeline, "{ hello }");
        let response = execute(&pipeline, &mut context, mode).await.unwrap();

        assert_eq!(response.data, None);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].message, "rejected");
        assert_eq!(executor.calls(), 0);
        assert!(context.result().is_none());
    }
}

/// Rejects queries selecting `goodbye`.
struct NoGoodbye;

impl ValidationRule for NoGoodbye {
    fn name(&self) -> &str {
        "NoGoodbye"
    }

    fn validate(&self, _schema: &Schema, document: &Document) -> Vec<graphql::Error> {
        if document.source().contains("goodbye") {
            vec![graphql::Error::builder().message("goodbye is not allowed").build()]
        } else {
            Vec::new()
        }
    }
}

#[test(tokio::test)]
async fn added_validation_rules_apply_to_every_request() {
    let executor = CountingExecutor::default();
    let rules = AddValidationRules::new([Arc::new(NoGoodbye) as Arc<dyn ValidationRule>]);
    let pipeline = Pipeline::builder(schema(), executor.clone())
        .extension(rules.factory())
        .build();

    for mode in MODES {
        let mut context = request(&pipeline, "{ hello goodbye }");
        let response = execute(&pipeline, &mut context, mode).await.unwrap();
        assert_eq!(response.data, None);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].message, "goodbye is not allowed");
        let names: Vec<_> = context
            .validation_rules()
            .iter()
            .map(|rule| rule.name().to_string())
            .collect();
        assert_eq!(names, ["SpecifiedRules", "NoGoodbye"]);

        let mut context = request(&pipeline, "{ hello }");
        let response = execute(&pipeline, &mut context, mode).await.unwrap();
        assert_eq!(response.data, Some(json!({ "hello": "world" })));
    }
    assert_eq!(executor.calls(), 2);
}
