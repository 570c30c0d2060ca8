//! Error types for the ARM client.

use serde::Deserialize;

/// Result type for ARM operations.
pub type ArmResult<T> = Result<T, ArmError>;

/// Errors raised by the cloud resource provider.
#[derive(Debug, thiserror::Error)]
pub enum ArmError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The management API answered with an error status.
    #[error("API error (status {status}, code {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Caller input rejected before any request was made.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No access token could be obtained.
    #[error("Credential error: {0}")]
    Credential(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Response body did not have the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ArmError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Build an API error from a status code and the ARM error envelope.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<CloudErrorResponse>(body) {
            Ok(response) => Self::Api {
                status,
                code: response.error.code,
                message: response.error.message,
            },
            Err(_) => Self::Api {
                status,
                code: "Unknown".to_string(),
                message: body.to_string(),
            },
        }
    }
}

/// `{"error": {"code": ..., "message": ...}}` as returned by the management plane.
#[derive(Debug, Deserialize)]
pub struct CloudErrorResponse {
    pub error: CloudErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct CloudErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_response_parses_arm_envelope() {
        let body = r#"{"error":{"code":"SubscriptionNotFound","message":"The subscription could not be found."}}"#;
        let err = ArmError::from_response(404, body);

        match &err {
            ArmError::Api { status, code, .. } => {
                assert_eq!(*status, 404);
                assert_eq!(code, "SubscriptionNotFound");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
        assert!(err.to_string().contains("The subscription could not be found."));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_from_response_keeps_unstructured_body() {
        let err = ArmError::from_response(503, "Service Unavailable");

        assert!(matches!(&err, ArmError::Api { code, .. } if code == "Unknown"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_input_is_not_retryable() {
        assert!(!ArmError::InvalidInput("bad".to_string()).is_retryable());
    }
}
