//! In-process bus transport.
//!
//! [`LoopbackTransport`] delivers requests straight to the connected
//! dispatcher without any wire encoding. It is suitable for unit tests,
//! local demos, and embedding a registry in a process that answers its own
//! requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{RemoteError, TransportError};
use crate::transport::{BusTransport, RemoteDispatcher, RemoteReply, RemoteRequest};

pub struct LoopbackTransport {
    name: String,
    dispatcher: RwLock<Option<Arc<dyn RemoteDispatcher>>>,
    accepting: AtomicBool,
    fail_next_connect: Mutex<Option<String>>,
}

impl LoopbackTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dispatcher: RwLock::new(None),
            accepting: AtomicBool::new(false),
            fail_next_connect: Mutex::new(None),
        }
    }

    /// Make the next `connect()` fail with `reason`.
    pub fn fail_next_connect(&self, reason: impl Into<String>) {
        *self
            .fail_next_connect
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Deliver a request as if it arrived from the bus.
    pub async fn request(&self, request: RemoteRequest) -> RemoteReply {
        match self.dispatcher() {
            Ok(dispatcher) => request.dispatch(dispatcher.as_ref()).await,
            Err(e) => RemoteReply::Error(e.to_response()),
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value, RemoteError> {
        self.dispatcher()?.on_remote_get(path).await
    }

    pub async fn read(&self, path: &str) -> Result<Value, RemoteError> {
        self.dispatcher()?.on_remote_read(path).await
    }

    pub async fn write(&self, path: &str, value: Value) -> Result<(), RemoteError> {
        self.dispatcher()?.on_remote_write(path, value).await
    }

    pub async fn call(&self, path: &str, args: Vec<Value>) -> Result<Value, RemoteError> {
        self.dispatcher()?.on_remote_call(path, args).await
    }

    fn dispatcher(&self) -> Result<Arc<dyn RemoteDispatcher>, RemoteError> {
        if !self.is_accepting() {
            return Err(RemoteError::Unavailable);
        }
        self.dispatcher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(RemoteError::Unavailable)
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new("loopback")
    }
}

#[async_trait]
impl BusTransport for LoopbackTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self, dispatcher: Arc<dyn RemoteDispatcher>) -> Result<(), TransportError> {
        let injected = self
            .fail_next_connect
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reason) = injected {
            return Err(TransportError::Unreachable(reason));
        }
        *self.dispatcher.write().unwrap_or_else(PoisonError::into_inner) = Some(dispatcher);
        self.accepting.store(true, Ordering::SeqCst);
        info!(transport = %self.name, "loopback transport connected");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.accepting.store(false, Ordering::SeqCst);
        let previous = self
            .dispatcher
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_none() {
            return Err(TransportError::NotConnected);
        }
        debug!(transport = %self.name, "loopback transport stopped accepting requests");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed;

    #[async_trait]
    impl RemoteDispatcher for Fixed {
        async fn on_remote_get(&self, _path: &str) -> Result<Value, RemoteError> {
            Ok(json!({}))
        }
        async fn on_remote_read(&self, _path: &str) -> Result<Value, RemoteError> {
            Ok(json!(7))
        }
        async fn on_remote_write(&self, _path: &str, _value: Value) -> Result<(), RemoteError> {
            Ok(())
        }
        async fn on_remote_call(&self, _path: &str, _args: Vec<Value>) -> Result<Value, RemoteError> {
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn requests_before_connect_are_unavailable() {
        let t = LoopbackTransport::default();
        assert_eq!(t.read("x").await, Err(RemoteError::Unavailable));
        assert!(!t.request(RemoteRequest::Get { path: "x".into() }).await.is_ok());
    }

    #[tokio::test]
    async fn connect_routes_and_close_stops() {
        let t = LoopbackTransport::default();
        t.connect(Arc::new(Fixed)).await.unwrap();
        assert!(t.is_accepting());
        assert_eq!(t.read("x").await, Ok(json!(7)));
        t.close().await.unwrap();
        assert!(!t.is_accepting());
        assert_eq!(t.read("x").await, Err(RemoteError::Unavailable));
        assert_eq!(t.close().await, Err(TransportError::NotConnected));
    }

    #[tokio::test]
    async fn injected_connect_failure_is_one_shot() {
        let t = LoopbackTransport::default();
        t.fail_next_connect("broker down");
        assert_eq!(
            t.connect(Arc::new(Fixed)).await,
            Err(TransportError::Unreachable("broker down".into()))
        );
        assert!(!t.is_accepting());
        t.connect(Arc::new(Fixed)).await.unwrap();
        assert!(t.is_accepting());
    }
}
