//! Resolver, set-handler, and method-handler contracts.
//!
//! User callbacks are stored as trait objects on tree leaves. Closures of the
//! right shape implement the traits directly, so
//! `|current: &Value, segments: &[String]| Ok(current.clone())` is a valid
//! [`Resolver`].
//!
//! Every callback runs inside a resolver scope. While the scope is active on
//! a thread, structural tree mutations on that thread are rejected with
//! [`TreeError::MutationInResolver`](crate::TreeError::MutationInResolver).
//! Panics raised by a callback are caught at the scope boundary and surface
//! as [`ResolverError`].

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;

use crate::error::ResolverError;

/// Result of a resolver or method invocation.
pub type ResolveResult = std::result::Result<Value, ResolverError>;

/// Computes an attribute value at read time.
pub trait Resolver: Send + Sync {
    /// `current` is the attribute's last assigned static value; `segments` is
    /// the full path used to reach the attribute.
    fn resolve(&self, current: &Value, segments: &[String]) -> ResolveResult;
}

impl<F> Resolver for F
where
    F: Fn(&Value, &[String]) -> ResolveResult + Send + Sync,
{
    fn resolve(&self, current: &Value, segments: &[String]) -> ResolveResult {
        self(current, segments)
    }
}

/// Observes (and may veto) a remote write before it is stored.
pub trait SetHandler: Send + Sync {
    fn on_set(&self, value: &Value, segments: &[String]) -> Result<(), ResolverError>;
}

impl<F> SetHandler for F
where
    F: Fn(&Value, &[String]) -> Result<(), ResolverError> + Send + Sync,
{
    fn on_set(&self, value: &Value, segments: &[String]) -> Result<(), ResolverError> {
        self(value, segments)
    }
}

/// Handles a remote method call.
pub trait MethodHandler: Send + Sync {
    fn call(&self, args: Vec<Value>, segments: &[String]) -> ResolveResult;
}

impl<F> MethodHandler for F
where
    F: Fn(Vec<Value>, &[String]) -> ResolveResult + Send + Sync,
{
    fn call(&self, args: Vec<Value>, segments: &[String]) -> ResolveResult {
        self(args, segments)
    }
}

thread_local! {
    static SCOPE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Returns `true` while a user callback is running on the current thread.
pub fn in_resolver_scope() -> bool {
    SCOPE_DEPTH.with(|depth| depth.get() > 0)
}

struct ScopeGuard;

impl ScopeGuard {
    fn enter() -> Self {
        SCOPE_DEPTH.with(|depth| depth.set(depth.get() + 1));
        ScopeGuard
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Run a user callback inside a resolver scope, converting panics to errors.
pub(crate) fn guarded<T>(f: impl FnOnce() -> Result<T, ResolverError>) -> Result<T, ResolverError> {
    let _scope = ScopeGuard::enter();
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(ResolverError::from_panic(payload)),
    }
}
