//! Error types for the registry and for remote requests.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vbus_tree::TreeError;

/// Errors returned to the host by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("registry is already connected")]
    AlreadyConnected,

    #[error("registry is already closed")]
    AlreadyClosed,

    #[error("registry is not connected")]
    NotConnected,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("registry lock poisoned")]
    Poisoned,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised by a bus transport implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("bus unreachable: {0}")]
    Unreachable(String),

    #[error("transport is not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Other(String),
}

/// Failure of a remote request, reported to the remote requester only.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("{path} is not a readable attribute")]
    NotReadable { path: String },

    #[error("{path} is not a writable attribute")]
    NotWritable { path: String },

    #[error("{path} is not a method")]
    NotCallable { path: String },

    #[error("resolver error at {path}: {message}")]
    Resolver { path: String, message: String },

    #[error("request timed out: {path}")]
    Timeout { path: String },

    #[error("service unavailable")]
    Unavailable,

    #[error("request cancelled: {path}")]
    Cancelled { path: String },
}

impl RemoteError {
    /// Translate a tree failure for the request addressed to `path`.
    pub fn from_tree(err: TreeError, path: &str) -> Self {
        match err {
            TreeError::NotFound { path } => Self::NotFound { path },
            TreeError::InvalidPath { path, reason } => Self::InvalidPath { path, reason },
            TreeError::Resolver(e) => Self::Resolver {
                path: path.to_string(),
                message: e.message,
            },
            other => Self::Resolver {
                path: path.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// HTTP-flavoured status code carried in the error response.
    pub fn code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::InvalidPath { .. } => 400,
            Self::NotReadable { .. } | Self::NotWritable { .. } | Self::NotCallable { .. } => 405,
            Self::Resolver { .. } => 500,
            Self::Timeout { .. } => 504,
            Self::Unavailable => 503,
            Self::Cancelled { .. } => 499,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// Error body sent back over the bus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbus_tree::ResolverError;

    #[test]
    fn tree_errors_map_to_remote_errors() {
        let nf = RemoteError::from_tree(TreeError::NotFound { path: "a.b".into() }, "a.b");
        assert_eq!(nf, RemoteError::NotFound { path: "a.b".into() });
        assert_eq!(nf.code(), 404);

        let re = RemoteError::from_tree(TreeError::Resolver(ResolverError::new("boom")), "a");
        assert_eq!(re.code(), 500);
        assert_eq!(
            re,
            RemoteError::Resolver {
                path: "a".into(),
                message: "boom".into()
            }
        );
    }

    #[test]
    fn error_response_serializes() {
        let resp = RemoteError::Unavailable.to_response();
        assert_eq!(resp.code, 503);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["message"], "service unavailable");
    }

    #[test]
    fn registry_error_wraps_tree_error() {
        let err: RegistryError = TreeError::PathConflict { path: "x".into() }.into();
        assert_eq!(err.to_string(), "path already in use: x");
    }
}
