//! Error types for Dockyard.

use thiserror::Error;

use crate::value::ValueError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Value(#[from] ValueError),

    /// The requested image does not exist locally or in the registry.
    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("transport failure: {0}")]
    Transport(String),

    /// A runtime version constraint could not be parsed.
    #[error("invalid version constraint: {0}")]
    ConstraintParse(String),

    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error("push failed: {0}")]
    PushFailed(String),

    #[error("notify failed: {0}")]
    NotifyFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid state: expected {expected}, found {found}")]
    InvalidState { expected: String, found: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when this error only signals that a cache-warm image is absent.
    pub fn is_image_not_found(&self) -> bool {
        matches!(self, Error::ImageNotFound(_))
    }

    /// True when a nested configuration field was missing.
    pub fn is_field_not_found(&self) -> bool {
        matches!(self, Error::Value(e) if e.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
