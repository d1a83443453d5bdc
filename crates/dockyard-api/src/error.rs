//! API client error handling.

/// Errors raised by the HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Request(err.to_string())
    }
}

impl From<ApiError> for dockyard_core::Error {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Api { status: 404, message } => dockyard_core::Error::NotFound(message),
            ApiError::Url(e) => dockyard_core::Error::InvalidInput(e.to_string()),
            other => dockyard_core::Error::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_core_not_found() {
        let err: dockyard_core::Error = ApiError::Api {
            status: 404,
            message: "release web not found".to_string(),
        }
        .into();
        assert!(matches!(err, dockyard_core::Error::NotFound(_)));
    }

    #[test]
    fn test_other_failures_map_to_transport() {
        let err: dockyard_core::Error = ApiError::Api {
            status: 502,
            message: "bad gateway".to_string(),
        }
        .into();
        assert!(matches!(err, dockyard_core::Error::Transport(_)));

        let err: dockyard_core::Error = ApiError::Parse("expected value".to_string()).into();
        assert!(matches!(err, dockyard_core::Error::Transport(_)));
    }
}
