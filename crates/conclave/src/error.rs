//! Error types for the conclave CLI.

use thiserror::Error;

/// Configuration errors raised while wiring providers.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Duplicate provider id: {0}")]
    DuplicateProvider(String),

    #[error("Provider {provider} requires `{field}`")]
    MissingField {
        provider: String,
        field: &'static str,
    },

    #[error("Environment variable {var} for provider {provider} is not set")]
    MissingApiKey { provider: String, var: String },

    #[error("Insight provider {0} is not configured")]
    UnknownInsightProvider(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] conclave_core::config::ConfigValidationError),
}
