//! Error types for graph construction, catalog access, and serialization
//!
//! All errors are raised synchronously to the immediate caller; nothing in
//! this crate retries or recovers internally. The transport layer behind
//! [`crate::catalog::CatalogFetcher`] owns its own retry policy.

use thiserror::Error;

/// Main error type for the expression engine
#[derive(Debug, Error)]
pub enum ExprError {
    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("Operation name must not be empty")]
    EmptyOperationName,

    #[error("Operation catalog has not been initialized")]
    CatalogNotInitialized,

    #[error("Failed to load operation catalog: {0}")]
    CatalogSource(#[from] anyhow::Error),

    #[error("Too many positional arguments to '{operation}': expected at most {declared}, got {supplied}")]
    TooManyArguments {
        operation: String,
        declared: usize,
        supplied: usize,
    },

    #[error("Argument '{name}' to '{operation}' supplied both positionally and by keyword")]
    DuplicateArgument { operation: String, name: String },

    #[error("Unrecognized argument '{name}' to '{operation}'")]
    UnrecognizedArgument { operation: String, name: String },

    #[error("Required argument '{name}' to '{operation}' is missing")]
    MissingArgument { operation: String, name: String },

    #[error("Unknown member '{name}' on type '{type_name}'")]
    UnknownMember { type_name: String, name: String },

    #[error("Member '{name}' on type '{type_name}' is hand-written and has no attached handler")]
    ManualMember { type_name: String, name: String },

    #[error("Cannot serialize a variable with no assigned name")]
    UnresolvedVariable,

    #[error("Cannot serialize non-finite number {0}")]
    NonFiniteNumber(f64),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, ExprError>;
