//! Configuration errors.

use dockyard_core::ValueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("could not read release configuration: {0}")]
    Value(#[from] ValueError),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for dockyard_core::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Value(e) => dockyard_core::Error::Value(e),
            ConfigError::Io(e) => dockyard_core::Error::Io(e),
            other => dockyard_core::Error::InvalidInput(other.to_string()),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
