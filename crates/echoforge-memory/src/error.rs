//! Memory Error Types
//!
//! Defines the error taxonomy for the memory subsystem.

use thiserror::Error;

/// Memory result type alias
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory subsystem errors
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Malformed entry, query or hook registration. Raised before any
    /// provider is touched.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Failure inside exactly one provider call
    #[error("storage error in provider '{provider}': {message}")]
    Storage { provider: String, message: String },

    /// Embedding or summarization capability failure
    #[error("{capability} capability error: {message}")]
    Capability {
        capability: &'static str,
        message: String,
    },

    /// Entry not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),
}

impl MemoryError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a storage error attributed to a provider
    pub fn storage(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Storage {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// Create an embedding capability error
    pub fn embedding(message: impl std::fmt::Display) -> Self {
        Self::Capability {
            capability: "embedding",
            message: message.to_string(),
        }
    }

    /// Create a summarization capability error
    pub fn summarization(message: impl std::fmt::Display) -> Self {
        Self::Capability {
            capability: "summarization",
            message: message.to_string(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Check if this error is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if this error is a storage error
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }

    /// Check if this error is a capability error
    pub fn is_capability(&self) -> bool {
        matches!(self, Self::Capability { .. })
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
