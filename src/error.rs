use thiserror::Error;

/// Errors raised by the extraction pipeline and its stores
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Browser automation failed: {0}")]
    Automation(String),

    #[error("Extraction payload invalid: {0}")]
    Extraction(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Extraction cancelled")]
    Cancelled,

    #[error("Extraction timed out after {0} seconds")]
    Timeout(u64),
}

impl ScoutError {
    /// Whether a fresh browser session could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScoutError::Automation(_) | ScoutError::Extraction(_))
    }
}

impl From<reqwest::Error> for ScoutError {
    fn from(e: reqwest::Error) -> Self {
        ScoutError::Automation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScoutError>;
