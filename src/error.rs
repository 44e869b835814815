use thiserror::Error;

/// Errors produced while talking to the control service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure, or a body that was not JSON at all.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success HTTP status.
    #[error("service returned HTTP {0}")]
    Status(u16),

    /// The body was JSON but did not match the expected shape.
    #[error("could not decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A listing payload that is neither a control message nor an image.
    #[error("unrecognized {endpoint} payload: {payload}")]
    Malformed {
        endpoint: &'static str,
        payload: String,
    },

    /// The configured base URL cannot address the service endpoints.
    #[error("invalid service URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ApiError {
    /// Whether this error came from a payload we refused to interpret.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ApiError::Malformed { .. })
    }
}
