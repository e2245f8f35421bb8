use thiserror::Error;

/// Failure of a single management-page request
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status {status}")]
    HttpStatus { status: u16 },
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;
