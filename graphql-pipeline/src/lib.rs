//! A GraphQL execution pipeline.
//!
//! [`Pipeline`] parses, validates and executes a query held by an
//! [`ExecutionContext`], letting [`Extension`]s observe each phase and
//! contribute to the `extensions` entry of the final [`graphql::Response`].
//! The same algorithm backs [`Pipeline::execute`] and [`Pipeline::execute_sync`].

#![warn(unreachable_pub)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod json_ext;

pub mod configuration;
mod context;
pub mod error;
mod execution_context;
pub mod executor;
pub mod extension;
pub mod graphql;
pub mod middleware;
mod pipeline;
pub mod spec;
pub mod test_harness;

pub use configuration::Configuration;
pub use context::Context;
pub use context::ContextError;
pub use execution_context::ErrorState;
pub use execution_context::ExecutionContext;
pub use extension::Extension;
pub use extension::ExtensionFactory;
pub use extension::Region;
pub use extension::runner::ExtensionsRunner;
pub use pipeline::Pipeline;
pub use pipeline::PipelineBuilder;
