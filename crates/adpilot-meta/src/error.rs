use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Quota exhausted. Not retried in-process; the next scheduled run is the retry.
    #[error("Meta API rate limit reached: {message}. Please wait a few minutes and try again.")]
    RateLimited { message: String },

    /// Structured `{"error": {...}}` body from the platform.
    #[error("Meta API error (HTTP {status}, code {code:?}): {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        subcode: Option<i64>,
        message: String,
    },

    #[error("unexpected HTTP status {status} from {context}: {body}")]
    UnexpectedStatus {
        status: u16,
        context: String,
        body: String,
    },

    #[error("pagination limit reached for {context}: exceeded {max_pages} pages")]
    PaginationLimit { context: String, max_pages: usize },

    #[error("invalid base URL \"{base_url}\": {reason}")]
    InvalidBaseUrl { base_url: String, reason: String },
}

impl MetaError {
    /// The platform's own error text when the response carried one,
    /// otherwise the raw body for unstructured failures.
    #[must_use]
    pub fn platform_message(&self) -> Option<&str> {
        match self {
            MetaError::RateLimited { message } | MetaError::Api { message, .. } => Some(message),
            MetaError::UnexpectedStatus { body, .. } if !body.is_empty() => Some(body),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, MetaError::RateLimited { .. })
    }
}
