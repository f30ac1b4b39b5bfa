//! Error types for the AURA core library.

use thiserror::Error;

/// Top-level error type for all AURA core operations.
///
/// Fusion, planning and chord advancement are total functions and never
/// return this type; it only surfaces at loading and parsing boundaries.
#[derive(Error, Debug)]
pub enum AuraError {
    /// Configuration could not be parsed or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A chord bank was authored inconsistently.
    #[error("Invalid chord bank '{bank}': {reason}")]
    InvalidBank {
        /// Name of the offending bank.
        bank: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A mood / emotion key outside the fixed key set.
    #[error("Unknown emotion key: {0}")]
    UnknownEmotion(String),

    /// A source id outside {game_state, face, speech}.
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for AuraError {
    fn from(err: serde_json::Error) -> Self {
        AuraError::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, AuraError>;
