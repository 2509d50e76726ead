// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Atrium chat orchestration layer.

use thiserror::Error;

/// The primary error type used across Atrium adapter traits and chat operations.
#[derive(Debug, Error)]
pub enum AtriumError {
    /// Configuration errors (invalid TOML, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A backend call was rejected (transport failure or remote rejection).
    #[error("backend error: {message}")]
    Backend {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The external worker could not be invoked.
    #[error("worker error: {message}")]
    Worker {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Input rejected locally before reaching the backend.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The current user has not joined the department conversation.
    #[error("not a member of conversation {conversation_id}")]
    NotMember { conversation_id: String },

    /// A request for the conversation is still queued or processing.
    #[error("a request is still outstanding for conversation {conversation_id}")]
    RequestPending { conversation_id: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AtriumError {
    /// Shorthand for a [`AtriumError::Backend`] without an underlying source.
    pub fn backend(message: impl Into<String>) -> Self {
        AtriumError::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`AtriumError::Worker`] without an underlying source.
    pub fn worker(message: impl Into<String>) -> Self {
        AtriumError::Worker {
            message: message.into(),
            source: None,
        }
    }
}
