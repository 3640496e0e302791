//! The boundary between the pipeline and the GraphQL executor.

use futures::future::BoxFuture;

use crate::context::Context;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::middleware::Middleware;
use crate::spec::Document;
use crate::spec::Schema;

/// Everything an executor needs to run a parsed and validated query.
#[derive(Debug)]
pub struct ExecutionRequest<'a> {
    pub schema: &'a Schema,
    pub document: &'a Document,
    pub root_value: &'a Value,
    /// Every field must be resolved through this chain.
    pub middleware: Middleware<'a>,
    pub variables: &'a Object,
    pub operation_name: Option<&'a str>,
    pub context: &'a Context,
}

/// The result of handing a request to an executor.
pub enum Execution<'a> {
    /// Every field resolved without suspending.
    Complete(Response),
    /// Some resolver suspended. Dropping the future cancels the remaining work.
    Pending(BoxFuture<'a, Response>),
}

impl Execution<'_> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Execution::Pending(_))
    }
}

impl std::fmt::Debug for Execution<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Execution::Complete(response) => f.debug_tuple("Complete").field(response).finish(),
            Execution::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Runs a query and produces its response.
///
/// Query-level failures (resolver errors for instance) belong in
/// [`Response::errors`].
pub trait QueryExecutor: Send + Sync {
    fn execute<'a>(&'a self, request: ExecutionRequest<'a>) -> Execution<'a>;
}
