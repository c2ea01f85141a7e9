use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrichError {
    /// Malformed designation or coordinate encoding.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Caller mistake detected before any network activity.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Network, timeout or malformed-response failure from a remote service.
    /// `retryable` is false when the service refused the request itself.
    #[error("Remote service error ({service}): {message}")]
    RemoteService {
        service: String,
        message: String,
        retryable: bool,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EnrichError {
    pub fn parse(message: impl Into<String>) -> Self {
        EnrichError::Parse(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        EnrichError::InvalidParameter(message.into())
    }

    pub fn remote(service: impl Into<String>, message: impl Into<String>) -> Self {
        EnrichError::RemoteService {
            service: service.into(),
            message: message.into(),
            retryable: true,
        }
    }

    /// A refusal (bad query, unknown table) that repeating will not change.
    pub fn rejected(service: impl Into<String>, message: impl Into<String>) -> Self {
        EnrichError::RemoteService {
            service: service.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// Transient failures a batch records and moves past instead of aborting.
    pub fn is_remote(&self) -> bool {
        matches!(self, EnrichError::RemoteService { .. } | EnrichError::Http(_))
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            EnrichError::RemoteService { retryable, .. } => *retryable,
            EnrichError::Http(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EnrichError>;
