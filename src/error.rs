use thiserror::Error;

/// Fatal discovery failures. Unlike per-site extraction there is no partial
/// result to fall back on, so these propagate to the HTTP boundary.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search provider returned status {0}")]
    BadStatus(reqwest::StatusCode),
}

/// Failures from a single external provider call (rating lookup, content
/// generation, email dispatch). These are always quarantined into the item's
/// own result record by the caller.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {message}")]
    Api {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}
