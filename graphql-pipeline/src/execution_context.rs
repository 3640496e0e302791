//! Per-request state threaded through the pipeline and its extensions.

use std::fmt;
use std::sync::Arc;

use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;

use crate::context::Context;
use crate::graphql::Error;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::ParseFailure;
use crate::spec::ParsedDocument;
use crate::spec::QueryParser;
use crate::spec::Schema;
use crate::spec::ValidationRule;
use crate::spec::specified_rules;

/// What is known about the query errors of a request.
///
/// Once `Failed`, the remaining phases of the request are skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ErrorState {
    /// No phase reported on errors yet.
    #[default]
    Undetermined,
    /// The query was checked and found valid.
    Clean,
    /// The query failed; the list is never empty.
    Failed(Vec<Error>),
}

impl ErrorState {
    pub fn is_undetermined(&self) -> bool {
        matches!(self, ErrorState::Undetermined)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ErrorState::Failed(_))
    }

    /// The recorded errors, empty unless `Failed`.
    pub fn errors(&self) -> &[Error] {
        match self {
            ErrorState::Failed(errors) => errors,
            ErrorState::Undetermined | ErrorState::Clean => &[],
        }
    }
}

/// The state of one request, exclusively owned by the pipeline while it runs.
///
/// The request inputs are fixed at construction. The document and the error
/// state are written at most once; later writes are ignored.
pub struct ExecutionContext {
    query: String,
    schema: Arc<Schema>,
    document: Option<ParsedDocument>,
    variables: Object,
    operation_name: Option<String>,
    root_value: Value,
    context: Context,
    validation_rules: Vec<Arc<dyn ValidationRule>>,
    errors: ErrorState,
    result: Option<Response>,
}

#[buildstructor::buildstructor]
impl ExecutionContext {
    /// Returns a builder for the state of a new request.
    ///
    /// `validation_rules` defaults to [`specified_rules`] when empty.
    #[builder(visibility = "pub")]
    #[allow(clippy::too_many_arguments)]
    fn new(
        query: String,
        schema: Arc<Schema>,
        document: Option<ParsedDocument>,
        variables: JsonMap<ByteString, Value>,
        operation_name: Option<String>,
        root_value: Option<Value>,
        context: Option<Context>,
        validation_rules: Vec<Arc<dyn ValidationRule>>,
    ) -> Self {
        let validation_rules = if validation_rules.is_empty() {
            specified_rules()
        } else {
            validation_rules
        };
        Self {
            query,
            schema,
            document,
            variables,
            operation_name,
            root_value: root_value.unwrap_or(Value::Null),
            context: context.unwrap_or_default(),
            validation_rules,
            errors: ErrorState::Undetermined,
            result: None,
        }
    }
}

impl ExecutionContext {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn document(&self) -> Option<&ParsedDocument> {
        self.document.as_ref()
    }

    pub fn variables(&self) -> &Object {
        &self.variables
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    pub fn root_value(&self) -> &Value {
        &self.root_value
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn validation_rules(&self) -> &[Arc<dyn ValidationRule>] {
        &self.validation_rules
    }

    /// Append `rules` to the validation rules, unless the errors are already determined.
    pub(crate) fn add_validation_rules(
        &mut self,
        rules: impl IntoIterator<Item = Arc<dyn ValidationRule>>,
    ) -> bool {
        if !self.errors.is_undetermined() {
            return false;
        }
        self.validation_rules.extend(rules);
        true
    }

    pub fn errors(&self) -> &ErrorState {
        &self.errors
    }

    /// The executor's response, once execution completed.
    pub fn result(&self) -> Option<&Response> {
        self.result.as_ref()
    }

    /// Return the parsed document, parsing the query on first use only.
    pub fn parse_document(
        &mut self,
        parser: &dyn QueryParser,
    ) -> Result<ParsedDocument, ParseFailure> {
        if let Some(document) = &self.document {
            return Ok(document.clone());
        }
        let document = parser.parse(&self.query)?;
        self.document = Some(document.clone());
        Ok(document)
    }

    /// Provide the document ahead of the parsing phase. Returns `false` if one was already set.
    pub fn set_document(&mut self, document: ParsedDocument) -> bool {
        if self.document.is_some() {
            return false;
        }
        self.document = Some(document);
        true
    }

    /// Record the query errors of the request. Returns `false` if they were already determined.
    pub fn record_errors(&mut self, errors: Vec<Error>) -> bool {
        if !self.errors.is_undetermined() {
            return false;
        }
        self.errors = if errors.is_empty() {
            ErrorState::Clean
        } else {
            ErrorState::Failed(errors)
        };
        true
    }

    /// Errors reported by the executor fail a request that had not failed yet.
    pub(crate) fn record_execution_errors(&mut self, errors: &[Error]) {
        if errors.is_empty() || self.errors.is_failed() {
            return;
        }
        self.errors = ErrorState::Failed(errors.to_vec());
    }

    pub(crate) fn set_result(&mut self, result: Response) {
        if self.result.is_none() {
            self.result = Some(result);
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("query", &self.query)
            .field("document", &self.document.is_some())
            .field("variables", &self.variables)
            .field("operation_name", &self.operation_name)
            .field(
                "validation_rules",
                &self
                    .validation_rules
                    .iter()
                    .map(|rule| rule.name())
                    .collect::<Vec<_>>(),
            )
            .field("errors", &self.errors)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}
