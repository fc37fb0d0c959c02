use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Discriminator shared by every [`ApiError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Api,
    Communication,
    Authentication,
    NotFound,
    RateLimit,
}

/// Failures raised by the Notion client.
///
/// Every variant is an API error; the non-`Api` variants narrow it down so callers can
/// branch on the variant instead of the message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    Api(String),
    #[error("{0}")]
    Communication(String),
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    RateLimit(String),
}

impl ApiError {
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::Api(_) => ApiErrorKind::Api,
            Self::Communication(_) => ApiErrorKind::Communication,
            Self::Authentication(_) => ApiErrorKind::Authentication,
            Self::NotFound(_) => ApiErrorKind::NotFound,
            Self::RateLimit(_) => ApiErrorKind::RateLimit,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Api(message)
            | Self::Communication(message)
            | Self::Authentication(message)
            | Self::NotFound(message)
            | Self::RateLimit(message) => message,
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("record has no id")]
    MissingId,
    #[error("property '{property}' is malformed: {message}")]
    MalformedProperty { property: String, message: String },
}
