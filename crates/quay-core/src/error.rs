use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not connected")]
    NotConnected,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("list error: {0}")]
    List(String),
    #[error("transfer error: {0}")]
    Transfer(String),
    #[error("remote operation failed: {0}")]
    Remote(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid data: {0}")]
    Invalid(String),
}
