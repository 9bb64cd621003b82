//! Node registry for vBus.
//!
//! A [`Registry`] owns the published [`NodeTree`](vbus_tree::NodeTree) of one
//! service, connects it to the bus through a [`BusTransport`], and answers
//! remote requests (get, read, write, call) by path.
//!
//! # Lifecycle
//!
//! `Uninitialized → Connected → Closing → Closed`. Only a connected registry
//! serves remote requests. Closing stops the transport, cancels requests in
//! flight, and waits a bounded time for them to drain.
//!
//! # Modules
//!
//! - [`config`]: Service identity and timeouts, loadable from TOML
//! - [`error`]: Registry, transport, and remote request errors
//! - [`event`]: Tree change notifications
//! - [`lifecycle`]: Lifecycle states and transition checks
//! - [`transport`]: The [`BusTransport`] and [`RemoteDispatcher`] seam
//! - [`loopback`]: In-process transport
//! - [`registry`]: The [`Registry`] itself

pub mod config;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod loopback;
pub mod registry;
pub mod transport;

pub use config::RegistryConfig;
pub use error::{ErrorResponse, RegistryError, RegistryResult, RemoteError, TransportError};
pub use event::{TreeEvent, TreeEventKind};
pub use lifecycle::LifecycleState;
pub use loopback::LoopbackTransport;
pub use registry::Registry;
pub use transport::{BusTransport, RemoteDispatcher, RemoteReply, RemoteRequest};
