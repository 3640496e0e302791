use std::sync::Arc;

use apollo_compiler::validation::DiagnosticList;
use apollo_compiler::validation::Valid;
use displaydoc::Display;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

/// A validated GraphQL schema, shared read-only by every request.
#[derive(Debug)]
pub struct Schema {
    definitions: Valid<apollo_compiler::Schema>,
    raw_sdl: Arc<String>,
    fingerprint: String,
}

/// Error in the schema.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum SchemaError {
    /// GraphQL schema error: {0}
    Invalid(SchemaDiagnostics),
}

/// Diagnostics reported while parsing and validating a schema.
#[derive(Debug)]
pub struct SchemaDiagnostics {
    errors: DiagnosticList,
}

impl std::fmt::Display for SchemaDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut errors = self.errors.iter();
        for (i, error) in errors.by_ref().take(5).enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", error)?;
        }
        let remaining = errors.count();
        if remaining > 0 {
            write!(f, "\n...and {remaining} other errors")?;
        }
        Ok(())
    }
}

impl Schema {
    pub fn parse(sdl: &str) -> Result<Self, SchemaError> {
        let definitions = apollo_compiler::Schema::parse_and_validate(sdl, "schema.graphql")
            .map_err(|invalid| {
                SchemaError::Invalid(SchemaDiagnostics {
                    errors: invalid.errors,
                })
            })?;
        let fingerprint = hex::encode(Sha256::digest(sdl.as_bytes()));
        tracing::debug!(%fingerprint, "schema loaded");

        Ok(Schema {
            definitions,
            raw_sdl: Arc::new(sdl.to_string()),
            fingerprint,
        })
    }

    pub fn definitions(&self) -> &Valid<apollo_compiler::Schema> {
        &self.definitions
    }

    /// Extracts a string containing the entire [`Schema`].
    pub fn raw_sdl(&self) -> &Arc<String> {
        &self.raw_sdl
    }

    /// Hex-encoded SHA-256 of the SDL this schema was parsed from.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}
