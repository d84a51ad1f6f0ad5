use thiserror::Error;

/// Failures of timer operations. Displayed verbatim in the `error` field of page responses.
#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Invalid domain format: {0}")]
    Validation(String),

    #[error("Time limit must be positive")]
    InvalidTimeLimit,

    #[error("Domain already exists")]
    Duplicate,

    #[error("Domain not found")]
    NotFound,

    /// Store or tab lookup failed. Worth retrying later.
    #[error("Failed to access state: {0:#}")]
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for SiteError {
    fn from(value: anyhow::Error) -> Self {
        Self::Storage(value)
    }
}

pub type SiteResult<T> = Result<T, SiteError>;
