//! Error types for the backend client and the answer gateway.

use thiserror::Error;

/// Backend error code that marks an account without interview credits.
pub const INSUFFICIENT_CREDITS_CODE: &str = "E2003";

/// Result type alias for backend calls
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors raised by [`crate::api::ApiClient`].
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request failed: {message}")]
    Request { message: String, timeout: bool },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Backend error {}: {message}", code.as_deref().unwrap_or("-"))]
    Backend { code: Option<String>, message: String },

    #[error("Response decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ApiError::Decode(err.to_string());
        }
        ApiError::Request {
            timeout: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Discriminator of a failed answer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayErrorKind {
    InsufficientCredits,
    Unauthorized,
    Transient,
    Unknown,
}

/// Failure of [`crate::gateway::AnswerGateway::get_answer`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Insufficient credits: {0}")]
    InsufficientCredits(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Temporary failure: {0}")]
    Transient(String),

    #[error("Unexpected failure: {0}")]
    Unknown(String),
}

impl GatewayError {
    pub fn kind(&self) -> GatewayErrorKind {
        match self {
            GatewayError::InsufficientCredits(_) => GatewayErrorKind::InsufficientCredits,
            GatewayError::Unauthorized(_) => GatewayErrorKind::Unauthorized,
            GatewayError::Transient(_) => GatewayErrorKind::Transient,
            GatewayError::Unknown(_) => GatewayErrorKind::Unknown,
        }
    }

    /// True when the interview can carry on by listening again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            GatewayErrorKind::Transient | GatewayErrorKind::Unknown
        )
    }
}

impl From<ApiError> for GatewayError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Backend { code, message } => {
                if code.as_deref() == Some(INSUFFICIENT_CREDITS_CODE) {
                    GatewayError::InsufficientCredits(message)
                } else {
                    GatewayError::Unknown(message)
                }
            }
            ApiError::Unauthorized(message) => GatewayError::Unauthorized(message),
            ApiError::Request { message, .. } => GatewayError::Transient(message),
            ApiError::Status { status, body } => {
                if status == 408 || status == 429 || status >= 500 {
                    GatewayError::Transient(format!("HTTP {}: {}", status, body))
                } else {
                    GatewayError::Unknown(format!("HTTP {}: {}", status, body))
                }
            }
            other => GatewayError::Unknown(other.to_string()),
        }
    }
}
