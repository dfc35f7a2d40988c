//! Error types for conclave-core.

use thiserror::Error;

use crate::config::ConfigValidationError;

/// Result type alias using conclave-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for conclave operations
#[derive(Error, Debug)]
pub enum Error {
    // Persistence errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    // Configuration errors
    #[error("Invalid sequence: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigValidationError),

    #[error("Invalid {entity} status transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    // Provider errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create an invalid transition error
    pub fn invalid_transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error came from the storage layer
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Database(_) | Self::LockPoisoned)
    }
}

/// Failure reported by a provider adapter.
///
/// Absorbed by the orchestrator at step granularity; never fatal to a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    #[error("request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

impl ProviderError {
    /// Create an API error
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Check if this error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Malformed sequence or agent configuration, rejected before anything runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("llm chain is empty")]
    EmptyChain,

    #[error("llm chain has {len} steps, maximum is {max}")]
    ChainTooLong { len: usize, max: usize },

    #[error("iterations must be at least 1")]
    ZeroIterations,

    #[error("synthesis provider is not set")]
    MissingSynthesisProvider,

    #[error("initial prompt is empty")]
    EmptyPrompt,

    #[error("step {step}: unknown provider '{provider_id}'")]
    UnknownProvider { step: usize, provider_id: String },

    #[error("unknown synthesis provider '{0}'")]
    UnknownSynthesisProvider(String),

    #[error("step {step}: unknown agent '{agent_id}'")]
    UnknownAgent { step: usize, agent_id: String },

    #[error("secondary personality must differ from primary ({0})")]
    DuplicatePersonality(String),

    #[error("unknown personality trait: {0}")]
    UnknownTrait(String),

    #[error("{0} is required")]
    Required(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::not_found("Sequence", "seq-1");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Sequence"));
        assert!(err.to_string().contains("seq-1"));

        let err = Error::invalid_transition("sequence", "completed", "running");
        assert_eq!(
            err.to_string(),
            "Invalid sequence status transition: completed -> running"
        );
    }

    #[test]
    fn test_provider_error() {
        let err = ProviderError::timeout(30_000);
        assert!(err.is_timeout());
        assert!(err.to_string().contains("30000"));

        let err = ProviderError::api("rate_limited", "slow down");
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "rate_limited: slow down");
    }

    #[test]
    fn test_validation_wraps() {
        let err: Error = ValidationError::EmptyChain.into();
        assert!(matches!(err, Error::Validation(ValidationError::EmptyChain)));
        assert!(!err.is_persistence());
    }

    #[test]
    fn test_required_names_field() {
        let err = ValidationError::Required("name");
        assert_eq!(err.to_string(), "name is required");

        let err: Error = err.into();
        assert!(err.to_string().contains("name is required"));
    }
}
