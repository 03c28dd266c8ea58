/// Failure of a REST call against the dashboard backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// The bearer credential was rejected (`401`). Callers treat this as
    /// "session ended" rather than as a transient failure.
    #[error("unauthorized")]
    Unauthorized,
    #[error("server returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timeout: {0}")]
    Timeout(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("config error: {0}")]
    Config(String),
}

impl ApiError {
    /// Whether a later retry of the same call can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Unauthorized | Self::InvalidResponse(_) | Self::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            return Self::Timeout(value.to_string());
        }
        Self::Request(value.to_string())
    }
}
