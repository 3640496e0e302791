//! Field resolution hooks.
//!
//! An executor resolves every field through a [`Middleware`] chain: each
//! [`FieldMiddleware`] receives the field and a [`Next`] handle that runs the
//! rest of the chain, ending with the executor's own [`FieldResolver`].
//! The first middleware of the chain is the outermost one.

use futures::future::BoxFuture;

use crate::context::Context;
use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;

/// The outcome of resolving one field.
pub type FieldResult = Result<Value, Error>;

/// The field being resolved.
#[derive(Clone, Debug)]
pub struct FieldInfo<'a> {
    /// Name of the object type the field belongs to.
    pub parent_type: String,
    pub field_name: String,
    /// Alias if any, else the field name.
    pub response_key: String,
    /// The field type, as written in the schema.
    pub return_type: String,
    /// Location of the field in the response.
    pub path: Path,
    /// Argument values, with variables substituted.
    pub arguments: Object,
    /// The value the field is resolved on.
    pub parent: &'a Value,
    pub context: &'a Context,
}

/// Produces the value of a field. Implemented by executors.
pub trait FieldResolver: Send + Sync {
    fn resolve<'a>(&'a self, info: &'a FieldInfo<'a>) -> BoxFuture<'a, FieldResult>;
}

/// Wraps the resolution of every field of a request.
pub trait FieldMiddleware: Send + Sync {
    /// Resolve the field, usually by calling `next.run(info)`.
    fn resolve<'a>(&'a self, info: &'a FieldInfo<'a>, next: Next<'a>) -> BoxFuture<'a, FieldResult>;
}

/// The remainder of a middleware chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middlewares: &'a [&'a dyn FieldMiddleware],
    resolver: &'a dyn FieldResolver,
}

impl<'a> Next<'a> {
    pub fn run(self, info: &'a FieldInfo<'a>) -> BoxFuture<'a, FieldResult> {
        match self.middlewares.split_first() {
            Some((middleware, rest)) => middleware.resolve(
                info,
                Next {
                    middlewares: rest,
                    resolver: self.resolver,
                },
            ),
            None => self.resolver.resolve(info),
        }
    }
}

/// An ordered middleware chain, handed to the executor of a request.
#[derive(Clone, Default)]
pub struct Middleware<'a> {
    chain: Vec<&'a dyn FieldMiddleware>,
}

impl<'a> Middleware<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `middleware`, making it the innermost one.
    pub fn push(&mut self, middleware: &'a dyn FieldMiddleware) {
        self.chain.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Resolve a field through the whole chain, then `resolver`.
    pub fn resolve<'b>(
        &'b self,
        info: &'b FieldInfo<'b>,
        resolver: &'b dyn FieldResolver,
    ) -> BoxFuture<'b, FieldResult>
    where
        'a: 'b,
    {
        Next {
            middlewares: &self.chain,
            resolver,
        }
        .run(info)
    }
}

impl<'a> FromIterator<&'a dyn FieldMiddleware> for Middleware<'a> {
    fn from_iter<I: IntoIterator<Item = &'a dyn FieldMiddleware>>(iter: I) -> Self {
        Self {
            chain: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Debug for Middleware<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Middleware")
            .field("len", &self.chain.len())
            .finish()
    }
}
