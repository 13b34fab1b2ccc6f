use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    // Fetch outcomes surfaced to callers
    #[error("Resource not found: {resource_id}")]
    ResourceNotFound { resource_id: String },

    #[error("No servers found for {resource_id}")]
    NoServersFound { resource_id: String },

    #[error("Rate limited and no cached data available for {resource_id}")]
    RateLimited { resource_id: String },

    #[error("Unable to fetch {resource_id}, please try again")]
    UpstreamUnavailable { resource_id: String },

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Proxy source errors
    #[error("Proxy source error: {0}")]
    ProxySource(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,

            // 404 Not Found
            GatewayError::ResourceNotFound { .. } | GatewayError::NoServersFound { .. } => {
                StatusCode::NOT_FOUND
            }

            // 429 Too Many Requests
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            GatewayError::UpstreamUnavailable { .. }
            | GatewayError::InvalidConfig(_)
            | GatewayError::ProxySource(_)
            | GatewayError::HttpClient(_)
            | GatewayError::Io(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

impl From<url::ParseError> for GatewayError {
    fn from(err: url::ParseError) -> Self {
        GatewayError::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_code_mapping() {
        assert_eq!(
            GatewayError::ResourceNotFound {
                resource_id: "1".to_string()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::NoServersFound {
                resource_id: "1".to_string()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::RateLimited {
                resource_id: "1".to_string()
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::UpstreamUnavailable {
                resource_id: "1".to_string()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::InvalidRequest("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_error_client_server_helpers() {
        let throttled = GatewayError::RateLimited {
            resource_id: "1".to_string(),
        };
        assert!(throttled.is_client_error());
        assert!(!throttled.is_server_error());

        let down = GatewayError::UpstreamUnavailable {
            resource_id: "1".to_string(),
        };
        assert!(down.is_server_error());
        assert!(!down.is_client_error());
    }

    #[test]
    fn test_error_messages_name_the_resource() {
        let err = GatewayError::NoServersFound {
            resource_id: "920587237".to_string(),
        };
        assert_eq!(err.to_string(), "No servers found for 920587237");
    }
}
