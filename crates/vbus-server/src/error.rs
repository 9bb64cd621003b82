use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("static root is not a directory: {0}")]
    StaticRoot(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;
