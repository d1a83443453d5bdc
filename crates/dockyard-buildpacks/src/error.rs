//! Error types for buildpack detection.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("error fetching contents of {file}: {source}")]
    Fetch {
        file: String,
        #[source]
        source: dockyard_core::Error,
    },

    #[error("error decoding {file}: {message}")]
    Decode { file: String, message: String },

    #[error("invalid version constraint specified in {file}: {content:?}")]
    ConstraintParse { file: String, content: String },

    #[error("scanner failed: {0}")]
    Scan(String),
}

pub type DetectResult<T> = std::result::Result<T, DetectError>;

impl From<DetectError> for dockyard_core::Error {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::Fetch { source, .. } => source,
            DetectError::Decode { .. } => dockyard_core::Error::Transport(err.to_string()),
            DetectError::ConstraintParse { .. } => {
                dockyard_core::Error::ConstraintParse(err.to_string())
            }
            DetectError::Scan(message) => dockyard_core::Error::Internal(message),
        }
    }
}
