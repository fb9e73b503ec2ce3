use thiserror::Error;

/// Adapter-level failures. Both variants are non-fatal to a collection run.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport, auth, decoding, or any other non-success response.
    #[error("{adapter} unavailable: {reason}")]
    Unavailable {
        adapter: &'static str,
        reason: String,
    },

    /// HTTP 429 or a source-specific quota code.
    #[error("{adapter} rate limited")]
    RateLimited {
        adapter: &'static str,
        retry_after_secs: Option<u64>,
    },

    /// The adapter could not be constructed.
    #[error("invalid {adapter} configuration: {reason}")]
    Config {
        adapter: &'static str,
        reason: String,
    },
}

impl SourceError {
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::RateLimited { .. })
    }
}
