//! Error types for the snapstreak engine
//!
//! All errors use thiserror for structured error handling.
//! These errors can be serialized to a host UI.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Image preparation error: {0}")]
    ImagePreparation(String),

    #[error("Image upload error: {0}")]
    Upload(String),

    #[error("Completion insert error: {0}")]
    Insert(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Generic(String),
}

impl serde::Serialize for EngineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
