use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tracing::{debug, info, warn};
use vbus_tree::{
    Attribute, Definition, Entity, EntityKind, Located, Method, Node, NodeTree, Path, RawNode,
    TreeError,
};

use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult, RemoteError};
use crate::event::{TreeEvent, TreeEventKind};
use crate::lifecycle::LifecycleState;
use crate::transport::{BusTransport, RemoteDispatcher};

// ---------------------------------------------------------------------------
// In-flight request tracking
// ---------------------------------------------------------------------------

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard<'a>(&'a InFlight);

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(self)
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

// ---------------------------------------------------------------------------
// Commit gate
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Pending,
    Committed,
    Cancelled,
}

/// Settles, exactly once, whether a request's side effect lands or the
/// request is cancelled by close.
struct CommitGate(StdMutex<Outcome>);

impl CommitGate {
    fn new() -> Self {
        Self(StdMutex::new(Outcome::Pending))
    }

    /// Run `apply` unless the request was already cancelled.
    fn commit(&self, apply: impl FnOnce()) -> bool {
        let mut outcome = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if *outcome != Outcome::Pending {
            return false;
        }
        apply();
        *outcome = Outcome::Committed;
        true
    }

    /// Mark the request cancelled unless it already committed.
    fn cancel(&self) -> bool {
        let mut outcome = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if *outcome == Outcome::Committed {
            return false;
        }
        *outcome = Outcome::Cancelled;
        true
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Owns the published node tree and serves remote requests against it.
///
/// Structural changes take the tree write lock; lookups take the read lock
/// only long enough to clone an entity handle. Resolvers always run after
/// the lock is released, so a slow resolver never blocks other requests.
///
/// The registry must live in an `Arc` to connect, because the transport
/// holds it as its [`RemoteDispatcher`] until close.
pub struct Registry {
    config: RegistryConfig,
    tree: RwLock<NodeTree>,
    transport: Arc<dyn BusTransport>,
    state: watch::Sender<LifecycleState>,
    lifecycle: Mutex<()>,
    in_flight: InFlight,
    events: broadcast::Sender<TreeEvent>,
}

impl Registry {
    pub fn new(config: RegistryConfig, transport: Arc<dyn BusTransport>) -> Self {
        let (state, _) = watch::channel(LifecycleState::Uninitialized);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            tree: RwLock::new(NodeTree::new(config.id())),
            config,
            transport,
            state,
            lifecycle: Mutex::new(()),
            in_flight: InFlight::default(),
            events,
        }
    }

    /// Create a registry already wrapped in an `Arc`.
    pub fn shared(config: RegistryConfig, transport: Arc<dyn BusTransport>) -> Arc<Self> {
        Arc::new(Self::new(config, transport))
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Subscribe to tree change events.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }

    /// Number of remote requests currently being served.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    // ---- Structure ----

    /// Insert `definition` as child `name` of the node at `parent`.
    pub fn add(
        &self,
        parent: &str,
        name: &str,
        definition: impl Into<Definition>,
    ) -> RegistryResult<Entity> {
        let parent = Path::parse(parent)?;
        let entity = {
            let mut tree = self.tree.write().map_err(|_| RegistryError::Poisoned)?;
            tree.add(&parent, name, definition.into())?
        };
        let path = parent.join(name)?;
        info!(path = %path, kind = ?entity.kind(), "registered");
        self.emit(TreeEventKind::Added, path);
        Ok(entity)
    }

    /// Register a node at `path` (its last segment is the node name).
    ///
    /// The returned handle is a snapshot of the node as inserted; later
    /// additions below it are visible through [`Registry::lookup`].
    pub fn add_node(&self, path: &str, node: RawNode) -> RegistryResult<Arc<Node>> {
        let (parent, name) = split_for_insert(path)?;
        let entity = self.add(&parent.to_string(), &name, node)?;
        expect_kind(entity, path, EntityKind::Node, |e| e.as_node().cloned())
    }

    /// Register an attribute under the node at `parent`, keyed by its name.
    pub fn add_attribute(&self, parent: &str, attribute: Attribute) -> RegistryResult<Arc<Attribute>> {
        let name = attribute.name().to_string();
        let entity = self.add(parent, &name, attribute)?;
        expect_kind(entity, parent, EntityKind::Attribute, |e| e.as_attribute().cloned())
    }

    /// Register a method under the node at `parent`, keyed by its name.
    pub fn add_method(&self, parent: &str, method: Method) -> RegistryResult<Arc<Method>> {
        let name = method.name().to_string();
        let entity = self.add(parent, &name, method)?;
        expect_kind(entity, parent, EntityKind::Method, |e| e.as_method().cloned())
    }

    /// Detach and return the entity at `path`.
    pub fn remove(&self, path: &str) -> RegistryResult<Entity> {
        let path = Path::parse(path)?;
        let removed = {
            let mut tree = self.tree.write().map_err(|_| RegistryError::Poisoned)?;
            tree.remove(&path)?
        };
        info!(path = %path, "unregistered");
        self.emit(TreeEventKind::Removed, path);
        Ok(removed)
    }

    pub fn lookup(&self, path: &str) -> RegistryResult<Entity> {
        self.lookup_path(&Path::parse(path)?)
    }

    /// A consistent copy-on-write snapshot of the whole tree.
    pub fn snapshot(&self) -> RegistryResult<NodeTree> {
        let tree = self.tree.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(tree.clone())
    }

    // ---- Local access ----

    /// Read the attribute addressed by `path`, running its resolver if any.
    pub fn read(&self, path: &str) -> RegistryResult<Value> {
        let located = self.locate(&Path::parse(path)?)?;
        let attribute = located
            .entity
            .as_attribute()
            .ok_or_else(|| wrong_kind(&located, EntityKind::Attribute))?;
        Ok(attribute.read(&located.segments).map_err(TreeError::from)?)
    }

    pub fn write(&self, path: &str, value: Value) -> RegistryResult<()> {
        let located = self.locate(&Path::parse(path)?)?;
        let attribute = located
            .entity
            .as_attribute()
            .ok_or_else(|| wrong_kind(&located, EntityKind::Attribute))?;
        attribute
            .set(value, &located.segments)
            .map_err(TreeError::from)?;
        self.emit(TreeEventKind::Set, located.matched);
        Ok(())
    }

    pub fn call(&self, path: &str, args: Vec<Value>) -> RegistryResult<Value> {
        let located = self.locate(&Path::parse(path)?)?;
        let method = located
            .entity
            .as_method()
            .ok_or_else(|| wrong_kind(&located, EntityKind::Method))?;
        Ok(method.call(args, &located.segments).map_err(TreeError::from)?)
    }

    /// Bus representation of the element at `path`.
    pub fn repr(&self, path: &str) -> RegistryResult<Value> {
        Ok(self.lookup(path)?.repr())
    }

    // ---- Lifecycle ----

    /// Connect the transport: `Uninitialized → Connected`.
    ///
    /// A failed connect leaves the registry `Uninitialized`, so the host may
    /// retry.
    pub async fn connect(self: &Arc<Self>) -> RegistryResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.state().check_connect()?;

        self.state.send_replace(LifecycleState::Connected);
        let dispatcher: Arc<dyn RemoteDispatcher> = self.clone();
        if let Err(e) = self.transport.connect(dispatcher).await {
            self.state.send_replace(LifecycleState::Uninitialized);
            warn!(transport = self.transport.name(), error = %e, "connect failed");
            return Err(RegistryError::ConnectionFailed(e.to_string()));
        }

        info!(
            id = %self.config.id(),
            hostname = %self.config.hostname,
            transport = self.transport.name(),
            "registry connected"
        );
        Ok(())
    }

    /// Close: `Connected → Closing → Closed`.
    ///
    /// The transport stops accepting requests, in-flight requests are
    /// cancelled, and the call waits (at most `close_timeout`) for them to
    /// drain. Resolvers that cannot be interrupted may still finish on their
    /// own thread; their results are discarded.
    pub async fn close(&self) -> RegistryResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.state().check_close()?;

        self.state.send_replace(LifecycleState::Closing);
        info!(in_flight = self.in_flight(), "registry closing");

        let transport_result = self.transport.close().await;
        if let Err(e) = &transport_result {
            warn!(error = %e, "transport close failed");
        }

        let timeout = self.config.close_timeout();
        if tokio::time::timeout(timeout, self.in_flight.wait_idle())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.in_flight(),
                ?timeout,
                "gave up waiting for in-flight requests"
            );
        }

        self.state.send_replace(LifecycleState::Closed);
        info!("registry closed");
        transport_result.map_err(RegistryError::from)
    }

    /// Resolve once the registry reaches `Closed`.
    pub async fn closed(&self) {
        wait_until(self.state.subscribe(), |s| s == LifecycleState::Closed).await;
    }

    /// Serve until `shutdown` resolves (or someone else closes the registry),
    /// then close.
    pub async fn run_until<F>(self: &Arc<Self>, shutdown: F) -> RegistryResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => info!("shutdown requested"),
            _ = self.closed() => return Ok(()),
        }
        match self.close().await {
            Ok(()) | Err(RegistryError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    // ---- Internals ----

    fn lookup_path(&self, path: &Path) -> RegistryResult<Entity> {
        let tree = self.tree.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(tree.lookup(path)?)
    }

    fn locate(&self, path: &Path) -> RegistryResult<Located> {
        let tree = self.tree.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(tree.locate(path)?)
    }

    fn emit(&self, kind: TreeEventKind, path: Path) {
        // No subscribers is not an error.
        let _ = self.events.send(TreeEvent::new(kind, path));
    }

    /// Count the request as in flight if the registry is serving.
    fn admit(&self) -> Result<InFlightGuard<'_>, RemoteError> {
        let guard = self.in_flight.enter();
        if !self.state().accepts_requests() {
            return Err(RemoteError::Unavailable);
        }
        Ok(guard)
    }

    /// Resolve `raw`, then run `work` on the blocking pool, racing it against
    /// the close signal.
    ///
    /// Side effects inside `work` must go through the [`CommitGate`]: once the
    /// caller has been told `Cancelled`, a commit no longer applies, and a
    /// request that committed first is reported as done.
    async fn dispatch<T, F>(&self, raw: &str, work: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(Located, &CommitGate) -> Result<T, RemoteError> + Send + 'static,
    {
        let _guard = self.admit()?;
        let path = Path::parse(raw).map_err(|e| RemoteError::from_tree(e, raw))?;
        let located = self.locate(&path).map_err(|e| remote_from_registry(e, raw))?;

        let gate = Arc::new(CommitGate::new());
        let signal = self.state.subscribe();
        let mut task = tokio::task::spawn_blocking({
            let gate = Arc::clone(&gate);
            move || work(located, gate.as_ref())
        });
        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = wait_until(signal, |s| !s.accepts_requests()) => {
                if gate.cancel() {
                    debug!(path = raw, "request cancelled by close");
                    return Err(RemoteError::Cancelled { path: raw.to_string() });
                }
                // Already committed; the task is about to finish.
                task.await
            }
        };
        joined.unwrap_or_else(|e| {
            Err(RemoteError::Resolver {
                path: raw.to_string(),
                message: e.to_string(),
            })
        })
    }
}

#[async_trait]
impl RemoteDispatcher for Registry {
    async fn on_remote_get(&self, raw: &str) -> Result<Value, RemoteError> {
        let _guard = self.admit()?;
        debug!(path = raw, "remote get");
        let path = Path::parse(raw).map_err(|e| RemoteError::from_tree(e, raw))?;
        let entity = self.lookup_path(&path).map_err(|e| remote_from_registry(e, raw))?;
        Ok(entity.repr())
    }

    async fn on_remote_read(&self, raw: &str) -> Result<Value, RemoteError> {
        debug!(path = raw, "remote read");
        let owned = raw.to_string();
        self.dispatch(raw, move |located, _| {
            let attribute = located
                .entity
                .as_attribute()
                .ok_or_else(|| RemoteError::NotReadable { path: owned.clone() })?;
            attribute
                .read(&located.segments)
                .map_err(|e| RemoteError::Resolver {
                    path: owned,
                    message: e.message,
                })
        })
        .await
    }

    async fn on_remote_write(&self, raw: &str, value: Value) -> Result<(), RemoteError> {
        debug!(path = raw, "remote write");
        let owned = raw.to_string();
        let matched = self
            .dispatch(raw, move |located, gate| {
                let attribute = located
                    .entity
                    .as_attribute()
                    .ok_or_else(|| RemoteError::NotWritable { path: owned.clone() })?;
                attribute
                    .check_set(&value, &located.segments)
                    .map_err(|e| RemoteError::Resolver {
                        path: owned.clone(),
                        message: e.message,
                    })?;
                if !gate.commit(|| attribute.store(value)) {
                    return Err(RemoteError::Cancelled { path: owned });
                }
                Ok(located.matched)
            })
            .await?;
        self.emit(TreeEventKind::Set, matched);
        Ok(())
    }

    async fn on_remote_call(&self, raw: &str, args: Vec<Value>) -> Result<Value, RemoteError> {
        debug!(path = raw, args = args.len(), "remote call");
        let owned = raw.to_string();
        let call = self.dispatch(raw, move |located, _| {
            let method = located
                .entity
                .as_method()
                .ok_or_else(|| RemoteError::NotCallable { path: owned.clone() })?;
            method
                .call(args, &located.segments)
                .map_err(|e| RemoteError::Resolver {
                    path: owned,
                    message: e.message,
                })
        });
        tokio::time::timeout(self.config.call_timeout(), call)
            .await
            .map_err(|_| RemoteError::Timeout {
                path: raw.to_string(),
            })?
    }
}

/// Resolve once the lifecycle state satisfies `done`, or the sender is gone.
async fn wait_until(
    mut state: watch::Receiver<LifecycleState>,
    done: impl Fn(LifecycleState) -> bool,
) {
    loop {
        let current = *state.borrow_and_update();
        if done(current) || state.changed().await.is_err() {
            return;
        }
    }
}

fn split_for_insert(path: &str) -> RegistryResult<(Path, String)> {
    let path = Path::parse(path)?;
    path.split_last().ok_or_else(|| {
        RegistryError::Tree(TreeError::InvalidPath {
            path: String::new(),
            reason: "cannot register at the root".into(),
        })
    })
}

fn expect_kind<T>(
    entity: Entity,
    path: &str,
    kind: EntityKind,
    pick: impl FnOnce(&Entity) -> Option<T>,
) -> RegistryResult<T> {
    pick(&entity).ok_or_else(|| {
        RegistryError::Tree(TreeError::WrongKind {
            path: path.to_string(),
            expected: kind.as_str(),
        })
    })
}

fn wrong_kind(located: &Located, expected: EntityKind) -> RegistryError {
    RegistryError::Tree(TreeError::WrongKind {
        path: located.matched.to_string(),
        expected: expected.as_str(),
    })
}

fn remote_from_registry(err: RegistryError, path: &str) -> RemoteError {
    match err {
        RegistryError::Tree(e) => RemoteError::from_tree(e, path),
        _ => RemoteError::Unavailable,
    }
}
