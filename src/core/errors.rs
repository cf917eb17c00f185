use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("host install failed: {0}")]
    Install(String),

    #[error("host {0} has no live connection")]
    HostUnavailable(Uuid),

    #[error("remote execution failed: {0}")]
    RemoteExecution(String),

    #[error("repository error: {0}")]
    Repository(String),
}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        Error::Connection(err.to_string())
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Error::RemoteExecution(status.message().to_string())
    }
}
