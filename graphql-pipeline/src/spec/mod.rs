//! GraphQL schemas and documents, and the parser and validator the pipeline calls.

mod document;
mod schema;
mod validation;

#[cfg(test)]
pub(crate) use document::MockQueryParser;
pub use document::ApolloParser;
pub use document::Document;
pub use document::ParseFailure;
pub use document::ParsedDocument;
pub use document::QueryParser;
pub use schema::Schema;
pub use schema::SchemaDiagnostics;
pub use schema::SchemaError;
#[cfg(test)]
pub(crate) use validation::MockQueryValidator;
pub use validation::QueryValidator;
pub use validation::RuleValidator;
pub use validation::SpecifiedRules;
pub use validation::ValidationRule;
pub use validation::specified_rules;
pub use validation::validate_document;

/// Error code of a query that is not syntactically valid GraphQL.
pub const GRAPHQL_PARSING_FAILED: &str = "GRAPHQL_PARSING_FAILED";
/// Error code of a parser failure that is not a syntax error.
pub const PARSING_ERROR: &str = "PARSING_ERROR";
/// Error code of a query rejected by a validation rule.
pub const GRAPHQL_VALIDATION_FAILED: &str = "GRAPHQL_VALIDATION_FAILED";
