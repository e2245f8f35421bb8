use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Device directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Invalid device status: {0}")]
    InvalidDeviceStatus(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
