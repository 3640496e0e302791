//! Pipeline errors.
//!
//! Query errors (bad syntax, failed validation, resolver errors) are not Rust
//! errors: they are reported as [`crate::graphql::Error`]s inside the
//! [`crate::graphql::Response`]. Only the failures below escape a call.

use displaydoc::Display;
use thiserror::Error;

/// A type-erased error, as accepted from external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures that abort a request instead of being reported in its response.
///
/// These indicate that the extensions or resolvers broke the contract of the
/// entry point they were called from.
#[derive(Error, Display, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FatalError {
    /// GraphQL execution failed to complete synchronously
    ExecutionIncomplete,

    /// an extension hook suspended during synchronous execution
    ExtensionSuspended,
}

/// Errors raised while loading a [`crate::Configuration`].
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },

    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_json::Error),
}
