//! Error types for node tree operations.

use thiserror::Error;

/// Errors that can occur while building, querying, or resolving the tree.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The path is malformed, or an intermediate segment is missing or is a leaf.
    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// An entity already exists at this exact path.
    #[error("path already in use: {path}")]
    PathConflict { path: String },

    /// Nothing exists at this path.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// A resolver or handler attempted a structural change.
    #[error("structural mutation of {path} attempted from inside a resolver")]
    MutationInResolver { path: String },

    /// The entity exists but does not support the requested operation.
    #[error("{path} is not {expected}")]
    WrongKind { path: String, expected: &'static str },

    /// A user-supplied resolver or handler failed or panicked.
    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

impl TreeError {
    pub(crate) fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Failure raised by a user resolver, set handler, or method handler.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("resolver failed: {message}")]
pub struct ResolverError {
    pub message: String,
}

impl ResolverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::new(format!("panicked: {detail}"))
    }
}

/// Convenience type alias for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;
