use std::sync::Arc;

use super::Document;
use super::GRAPHQL_VALIDATION_FAILED;
use super::Schema;
use crate::graphql::Error;
use crate::graphql::Location;

/// A check run against a parsed query before it is executed.
pub trait ValidationRule: Send + Sync {
    /// Identifies the rule in logs and cache keys.
    fn name(&self) -> &str;

    fn validate(&self, schema: &Schema, document: &Document) -> Vec<Error>;
}

/// The rules of the GraphQL specification, as implemented by apollo-compiler.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpecifiedRules;

impl ValidationRule for SpecifiedRules {
    fn name(&self) -> &str {
        "SpecifiedRules"
    }

    fn validate(&self, schema: &Schema, document: &Document) -> Vec<Error> {
        match document.ast().to_executable_validate(schema.definitions()) {
            Ok(_) => Vec::new(),
            Err(invalid) => invalid
                .errors
                .iter()
                .map(|diagnostic| {
                    let json = diagnostic.to_json();
                    Error::builder()
                        .message(json.message)
                        .locations(
                            json.locations
                                .iter()
                                .map(|location| Location {
                                    line: location.line as u32,
                                    column: location.column as u32,
                                })
                                .collect(),
                        )
                        .extension_code(GRAPHQL_VALIDATION_FAILED)
                        .build()
                })
                .collect(),
        }
    }
}

/// The rules used when a request does not name its own.
pub fn specified_rules() -> Vec<Arc<dyn ValidationRule>> {
    vec![Arc::new(SpecifiedRules)]
}

/// Run every rule in order and concatenate their errors.
pub fn validate_document(
    schema: &Schema,
    document: &Document,
    rules: &[Arc<dyn ValidationRule>],
) -> Vec<Error> {
    rules
        .iter()
        .flat_map(|rule| rule.validate(schema, document))
        .collect()
}

/// Validates a parsed query. An empty result means the query is valid.
#[cfg_attr(test, mockall::automock)]
pub trait QueryValidator: Send + Sync {
    fn validate(
        &self,
        schema: &Schema,
        document: &Document,
        rules: &[Arc<dyn ValidationRule>],
    ) -> Vec<Error>;
}

/// The default [`QueryValidator`]: [`validate_document`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleValidator;

impl QueryValidator for RuleValidator {
    fn validate(
        &self,
        schema: &Schema,
        document: &Document,
        rules: &[Arc<dyn ValidationRule>],
    ) -> Vec<Error> {
        let span = tracing::info_span!("validate_query", "otel.kind" = "INTERNAL");
        span.in_scope(|| {
            let errors = validate_document(schema, document, rules);
            if !errors.is_empty() {
                tracing::debug!(count = errors.len(), "query validation failed");
            }
            errors
        })
    }
}
