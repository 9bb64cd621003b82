//! The bus transport seam.
//!
//! A [`BusTransport`] owns the connection to the bus. On connect it receives
//! a [`RemoteDispatcher`] and routes every inbound path-addressed request to
//! it. The registry implements [`RemoteDispatcher`].
//!
//! Transports must stop accepting requests and drop the dispatcher when
//! `close()` is called.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorResponse, RemoteError, TransportError};

/// Receiver of inbound remote requests.
#[async_trait]
pub trait RemoteDispatcher: Send + Sync {
    /// Representation of the element at `path` (node tree, attribute, or method).
    async fn on_remote_get(&self, path: &str) -> Result<Value, RemoteError>;

    /// Current value of the attribute at `path`, resolved on demand.
    async fn on_remote_read(&self, path: &str) -> Result<Value, RemoteError>;

    /// Assign a new value to the attribute at `path`.
    async fn on_remote_write(&self, path: &str, value: Value) -> Result<(), RemoteError>;

    /// Invoke the method at `path`.
    async fn on_remote_call(&self, path: &str, args: Vec<Value>) -> Result<Value, RemoteError>;
}

/// Connection to the bus.
#[async_trait]
pub trait BusTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Establish the connection and start routing requests to `dispatcher`.
    async fn connect(&self, dispatcher: Arc<dyn RemoteDispatcher>) -> Result<(), TransportError>;

    /// Stop accepting requests and tear the connection down.
    async fn close(&self) -> Result<(), TransportError>;
}

/// An inbound request as carried on the bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum RemoteRequest {
    Get { path: String },
    Read { path: String },
    Write { path: String, value: Value },
    Call { path: String, args: Vec<Value> },
}

impl RemoteRequest {
    pub fn path(&self) -> &str {
        match self {
            Self::Get { path } | Self::Read { path } => path,
            Self::Write { path, .. } | Self::Call { path, .. } => path,
        }
    }

    /// Route this request to `dispatcher`, folding failures into the reply.
    pub async fn dispatch(self, dispatcher: &dyn RemoteDispatcher) -> RemoteReply {
        let result = match self {
            Self::Get { path } => dispatcher.on_remote_get(&path).await,
            Self::Read { path } => dispatcher.on_remote_read(&path).await,
            Self::Write { path, value } => dispatcher
                .on_remote_write(&path, value)
                .await
                .map(|()| Value::Null),
            Self::Call { path, args } => dispatcher.on_remote_call(&path, args).await,
        };
        RemoteReply::from(result)
    }
}

/// Reply sent back to the remote requester.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteReply {
    Ok(Value),
    Error(ErrorResponse),
}

impl RemoteReply {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

impl From<Result<Value, RemoteError>> for RemoteReply {
    fn from(result: Result<Value, RemoteError>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(e) => Self::Error(e.to_response()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl RemoteDispatcher for Echo {
        async fn on_remote_get(&self, path: &str) -> Result<Value, RemoteError> {
            Ok(json!({ "get": path }))
        }

        async fn on_remote_read(&self, path: &str) -> Result<Value, RemoteError> {
            Err(RemoteError::NotFound { path: path.into() })
        }

        async fn on_remote_write(&self, _path: &str, _value: Value) -> Result<(), RemoteError> {
            Ok(())
        }

        async fn on_remote_call(&self, _path: &str, args: Vec<Value>) -> Result<Value, RemoteError> {
            Ok(Value::Array(args))
        }
    }

    #[tokio::test]
    async fn requests_route_to_dispatcher() {
        let reply = RemoteRequest::Get { path: "a".into() }.dispatch(&Echo).await;
        assert_eq!(reply, RemoteReply::Ok(json!({ "get": "a" })));

        let reply = RemoteRequest::Write { path: "a".into(), value: json!(1) }
            .dispatch(&Echo)
            .await;
        assert_eq!(reply, RemoteReply::Ok(Value::Null));

        let reply = RemoteRequest::Call { path: "m".into(), args: vec![json!(1)] }
            .dispatch(&Echo)
            .await;
        assert_eq!(reply, RemoteReply::Ok(json!([1])));
    }

    #[tokio::test]
    async fn failures_become_error_replies() {
        let reply = RemoteRequest::Read { path: "nope".into() }.dispatch(&Echo).await;
        match reply {
            RemoteReply::Error(resp) => {
                assert_eq!(resp.code, 404);
                assert_eq!(resp.message, "not found: nope");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn request_wire_format() {
        let req: RemoteRequest =
            serde_json::from_value(json!({ "op": "read", "path": "status.hour" })).unwrap();
        assert_eq!(req.path(), "status.hour");
        assert!(matches!(req, RemoteRequest::Read { .. }));
    }
}
