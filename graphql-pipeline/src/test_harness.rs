//! A minimal executor for tests and embedders.
//!
//! [`RootValueExecutor`] resolves the root fields of the selected operation by
//! reading the entry of the same name in the request root value. Every field
//! goes through the request middleware chain, so extensions and middlewares
//! observe it like they would with a full executor.

use apollo_compiler::ast;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::executor::Execution;
use crate::executor::ExecutionRequest;
use crate::executor::QueryExecutor;
use crate::graphql::Error;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::middleware::FieldInfo;
use crate::middleware::FieldResolver;
use crate::middleware::FieldResult;

/// Resolves root fields from the root value, e.g. `{ hello }` against `{"hello": "world"}`.
///
/// Nested selections and fragments are not resolved: a field value is
/// returned as found in the root value.
#[derive(Clone, Copy, Debug, Default)]
pub struct RootValueExecutor;

struct RootValueResolver;

impl FieldResolver for RootValueResolver {
    fn resolve<'a>(&'a self, info: &'a FieldInfo<'a>) -> BoxFuture<'a, FieldResult> {
        let value = info
            .parent
            .as_object()
            .and_then(|parent| parent.get(info.field_name.as_str()))
            .cloned()
            .unwrap_or(Value::Null);
        futures::future::ready(Ok(value)).boxed()
    }
}

impl QueryExecutor for RootValueExecutor {
    fn execute<'a>(&'a self, request: ExecutionRequest<'a>) -> Execution<'a> {
        let Some(operation) = request.document.operation(request.operation_name) else {
            let message = match request.operation_name {
                Some(name) => format!("Unknown operation named \"{name}\"."),
                None => "Must provide operation name if query contains multiple operations."
                    .to_string(),
            };
            return Execution::Complete(Response::from_errors(vec![
                Error::builder().message(message).build(),
            ]));
        };
        let definitions = request.schema.definitions();
        let Some(root_type) = definitions.root_operation(operation.operation_type) else {
            return Execution::Complete(Response::from_errors(vec![
                Error::builder()
                    .message(format!(
                        "Schema does not define a root type for {:?} operations.",
                        operation.operation_type
                    ))
                    .build(),
            ]));
        };

        let mut execution = async move {
            let mut data = Object::new();
            let mut errors = Vec::new();
            for selection in &operation.selection_set {
                let ast::Selection::Field(field) = selection else {
                    continue;
                };
                let response_key = field.alias.as_ref().unwrap_or(&field.name).as_str();
                if field.name.as_str() == "__typename" {
                    data.insert(response_key, Value::String(root_type.as_str().into()));
                    continue;
                }
                let info = FieldInfo {
                    parent_type: root_type.to_string(),
                    field_name: field.name.to_string(),
                    response_key: response_key.to_string(),
                    return_type: definitions
                        .type_field(root_type, &field.name)
                        .map(|definition| definition.ty.to_string())
                        .unwrap_or_default(),
                    path: Path::empty().join(response_key),
                    arguments: field
                        .arguments
                        .iter()
                        .map(|argument| {
                            (
                                argument.name.as_str().into(),
                                argument_value(&argument.value, request.variables),
                            )
                        })
                        .collect(),
                    parent: request.root_value,
                    context: request.context,
                };
                match request.middleware.resolve(&info, &RootValueResolver).await {
                    Ok(value) => {
                        data.insert(response_key, value);
                    }
                    Err(mut error) => {
                        if error.path.is_none() {
                            error.path = Some(info.path.clone());
                        }
                        errors.push(error);
                        data.insert(response_key, Value::Null);
                    }
                }
            }
            Response::builder()
                .data(Value::Object(data))
                .errors(errors)
                .build()
        }
        .boxed();

        match (&mut execution).now_or_never() {
            Some(response) => Execution::Complete(response),
            None => Execution::Pending(execution),
        }
    }
}

fn argument_value(value: &ast::Value, variables: &Object) -> Value {
    match value {
        ast::Value::Null => Value::Null,
        ast::Value::Variable(name) => variables.get(name.as_str()).cloned().unwrap_or_default(),
        ast::Value::Enum(name) => name.as_str().into(),
        ast::Value::String(s) => s.as_str().into(),
        ast::Value::Boolean(b) => Value::Bool(*b),
        ast::Value::Int(i) => i
            .as_str()
            .parse::<i64>()
            .map(Into::into)
            .unwrap_or_default(),
        ast::Value::Float(f) => f
            .as_str()
            .parse::<f64>()
            .map(Into::into)
            .unwrap_or_default(),
        ast::Value::List(items) => Value::Array(
            items
                .iter()
                .map(|item| argument_value(item, variables))
                .collect(),
        ),
        ast::Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.as_str().into(), argument_value(value, variables)))
                .collect(),
        ),
    }
}
