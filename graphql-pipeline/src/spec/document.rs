use std::sync::Arc;

use apollo_compiler::Node;
use apollo_compiler::ast;
use displaydoc::Display;
use thiserror::Error;

use super::GRAPHQL_PARSING_FAILED;
use super::PARSING_ERROR;
use crate::error::BoxError;
use crate::graphql::Error;
use crate::graphql::Location;

/// A parsed query, shared between the pipeline, its extensions and the executor.
pub type ParsedDocument = Arc<Document>;

/// The syntax tree of a query together with its source text.
#[derive(Debug)]
pub struct Document {
    source: String,
    ast: ast::Document,
}

impl Document {
    pub fn new(source: impl Into<String>, ast: ast::Document) -> Self {
        Self {
            source: source.into(),
            ast,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &ast::Document {
        &self.ast
    }

    /// Select the operation to run.
    ///
    /// Without a name the document must hold exactly one operation.
    pub fn operation(&self, name: Option<&str>) -> Option<&Node<ast::OperationDefinition>> {
        let mut operations = self.ast.definitions.iter().filter_map(|definition| {
            if let ast::Definition::OperationDefinition(operation) = definition {
                Some(operation)
            } else {
                None
            }
        });
        match name {
            Some(name) => operations.find(|operation| {
                operation
                    .name
                    .as_ref()
                    .is_some_and(|operation_name| operation_name.as_str() == name)
            }),
            None => {
                let first = operations.next()?;
                operations.next().is_none().then_some(first)
            }
        }
    }
}

/// A query that could not be parsed.
#[derive(Error, Display, Debug)]
pub enum ParseFailure {
    /// {0}
    Syntax(Error),

    /// unexpected parser failure: {0}
    Unexpected(BoxError),
}

impl From<ParseFailure> for Error {
    fn from(failure: ParseFailure) -> Self {
        match failure {
            ParseFailure::Syntax(error) => error,
            ParseFailure::Unexpected(source) => Error::builder()
                .message(source.to_string())
                .extension_code(PARSING_ERROR)
                .build()
                .with_source(source),
        }
    }
}

/// Turns query text into a [`Document`].
#[cfg_attr(test, mockall::automock)]
pub trait QueryParser: Send + Sync {
    fn parse(&self, query: &str) -> Result<ParsedDocument, ParseFailure>;
}

/// The default [`QueryParser`], backed by apollo-compiler.
///
/// Only the first syntax error is reported.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApolloParser;

impl QueryParser for ApolloParser {
    fn parse(&self, query: &str) -> Result<ParsedDocument, ParseFailure> {
        let span = tracing::info_span!("parse_query", "otel.kind" = "INTERNAL");
        span.in_scope(|| match ast::Document::parse(query, "query.graphql") {
            Ok(ast) => Ok(Arc::new(Document::new(query, ast))),
            Err(invalid) => {
                let error = invalid
                    .errors
                    .iter()
                    .next()
                    .map(|diagnostic| {
                        Error::builder()
                            .message(diagnostic.error.to_string())
                            .locations(
                                diagnostic
                                    .line_column_range()
                                    .map(|range| range.start)
                                    .map(|location| {
                                        vec![Location {
                                            line: location.line as u32,
                                            column: location.column as u32,
                                        }]
                                    })
                                    .unwrap_or_default(),
                            )
                            .extension_code(GRAPHQL_PARSING_FAILED)
                            .build()
                    })
                    .ok_or_else(|| {
                        ParseFailure::Unexpected("query rejected without a diagnostic".into())
                    })?;
                tracing::debug!(%error, "query parsing failed");
                Err(ParseFailure::Syntax(error))
            }
        })
    }
}
