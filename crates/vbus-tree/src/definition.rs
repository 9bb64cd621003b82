//! Leaf and node definitions supplied by the host at registration time.
//!
//! - [`Attribute`] holds a static value and optionally a get resolver and a
//!   set handler.
//! - [`Method`] wraps a remotely callable handler.
//! - [`RawNode`] is a builder of named children that becomes a tree node when
//!   registered.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ResolverError;
use crate::resolver::{guarded, MethodHandler, ResolveResult, Resolver, SetHandler};

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a tree entity, assigned at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Infer a minimal JSON schema from a sample value.
pub fn infer_schema(value: &Value) -> Value {
    let ty = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    json!({ "type": ty })
}

// ---------------------------------------------------------------------------
// Attribute
// ---------------------------------------------------------------------------

/// Optional behaviour attached to an attribute at construction.
#[derive(Clone)]
pub enum AttrOption {
    /// Compute the value on every read.
    OnGet(Arc<dyn Resolver>),
    /// Observe or veto remote writes.
    OnSet(Arc<dyn SetHandler>),
    /// Override the inferred schema.
    Schema(Value),
}

impl fmt::Debug for AttrOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnGet(_) => f.write_str("OnGet(..)"),
            Self::OnSet(_) => f.write_str("OnSet(..)"),
            Self::Schema(s) => f.debug_tuple("Schema").field(s).finish(),
        }
    }
}

/// Attach an infallible get resolver.
pub fn on_get<F>(f: F) -> AttrOption
where
    F: Fn(&Value, &[String]) -> Value + Send + Sync + 'static,
{
    AttrOption::OnGet(Arc::new(move |current: &Value, segments: &[String]| -> ResolveResult {
        Ok(f(current, segments))
    }))
}

/// Attach a get resolver that may fail.
pub fn try_on_get<F>(f: F) -> AttrOption
where
    F: Fn(&Value, &[String]) -> ResolveResult + Send + Sync + 'static,
{
    AttrOption::OnGet(Arc::new(f))
}

/// Attach a set handler.
pub fn on_set<F>(f: F) -> AttrOption
where
    F: Fn(&Value, &[String]) -> Result<(), ResolverError> + Send + Sync + 'static,
{
    AttrOption::OnSet(Arc::new(f))
}

/// A leaf holding a value, optionally computed on demand.
///
/// When a resolver is present it is authoritative: every [`Attribute::read`]
/// invokes it afresh and its result is never stored back.
pub struct Attribute {
    id: EntityId,
    name: String,
    value: RwLock<Value>,
    schema: Value,
    resolver: Option<Arc<dyn Resolver>>,
    set_handler: Option<Arc<dyn SetHandler>>,
}

impl Attribute {
    /// Create a static attribute.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        let schema = infer_schema(&value);
        Self {
            id: EntityId::next(),
            name: name.into(),
            value: RwLock::new(value),
            schema,
            resolver: None,
            set_handler: None,
        }
    }

    /// Apply an option, builder style.
    pub fn with(mut self, option: AttrOption) -> Self {
        match option {
            AttrOption::OnGet(r) => self.resolver = Some(r),
            AttrOption::OnSet(h) => self.set_handler = Some(h),
            AttrOption::Schema(s) => self.schema = s,
        }
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }

    /// The last assigned static value.
    pub fn value(&self) -> Value {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Read the attribute as seen through `segments`.
    pub fn read(&self, segments: &[String]) -> Result<Value, ResolverError> {
        match &self.resolver {
            Some(resolver) => {
                let current = self.value();
                guarded(|| resolver.resolve(&current, segments))
            }
            None => Ok(self.value()),
        }
    }

    /// Handle a write: the set handler (if any) runs first and may veto.
    pub fn set(&self, value: Value, segments: &[String]) -> Result<(), ResolverError> {
        self.check_set(&value, segments)?;
        self.store(value);
        Ok(())
    }

    /// Run the set handler without storing anything.
    pub fn check_set(&self, value: &Value, segments: &[String]) -> Result<(), ResolverError> {
        match &self.set_handler {
            Some(handler) => guarded(|| handler.on_set(value, segments)),
            None => Ok(()),
        }
    }

    /// Replace the static value, bypassing the set handler.
    pub fn store(&self, value: Value) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// Bus representation: schema plus the static value.
    pub fn repr(&self) -> Value {
        json!({ "schema": self.schema, "value": self.value() })
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("value", &self.value())
            .field("resolver", &self.resolver.is_some())
            .field("set_handler", &self.set_handler.is_some())
            .finish()
    }
}

/// Shorthand constructor: name, initial value, and options.
///
/// ```
/// use serde_json::{json, Value};
/// use vbus_tree::{attr, on_get};
///
/// let hour = attr("hour", json!("00:00:00"), [on_get(|_: &Value, _: &[String]| json!("12:00:00"))]);
/// assert_eq!(hour.read(&[]).unwrap(), json!("12:00:00"));
/// ```
pub fn attr(
    name: impl Into<String>,
    value: Value,
    options: impl IntoIterator<Item = AttrOption>,
) -> Attribute {
    options
        .into_iter()
        .fold(Attribute::new(name, value), Attribute::with)
}

// ---------------------------------------------------------------------------
// Method
// ---------------------------------------------------------------------------

/// A remotely callable leaf.
pub struct Method {
    id: EntityId,
    name: String,
    handler: Arc<dyn MethodHandler>,
    params: Value,
    returns: Value,
}

impl Method {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>, &[String]) -> ResolveResult + Send + Sync + 'static,
    {
        Self {
            id: EntityId::next(),
            name: name.into(),
            handler: Arc::new(handler),
            params: json!({ "type": "array" }),
            returns: json!({}),
        }
    }

    /// Declare parameter and return schemas.
    pub fn with_schemas(mut self, params: Value, returns: Value) -> Self {
        self.params = params;
        self.returns = returns;
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: Vec<Value>, segments: &[String]) -> ResolveResult {
        guarded(|| self.handler.call(args, segments))
    }

    pub fn repr(&self) -> Value {
        json!({
            "params": { "schema": self.params },
            "returns": { "schema": self.returns },
        })
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RawNode / Definition
// ---------------------------------------------------------------------------

/// Anything that can be registered at a path.
#[derive(Debug)]
pub enum Definition {
    Node(RawNode),
    Attribute(Attribute),
    Method(Method),
}

impl From<RawNode> for Definition {
    fn from(node: RawNode) -> Self {
        Self::Node(node)
    }
}

impl From<Attribute> for Definition {
    fn from(attribute: Attribute) -> Self {
        Self::Attribute(attribute)
    }
}

impl From<Method> for Definition {
    fn from(method: Method) -> Self {
        Self::Method(method)
    }
}

/// Unregistered node contents, keyed by child name.
///
/// Names given more than once are remembered and rejected when the node is
/// registered.
#[derive(Debug, Default)]
pub struct RawNode {
    pub(crate) children: BTreeMap<String, Definition>,
    pub(crate) duplicates: Vec<String>,
}

impl RawNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute under its own name.
    pub fn attribute(self, attribute: Attribute) -> Self {
        let name = attribute.name().to_string();
        self.child(name, Definition::Attribute(attribute))
    }

    /// Add a method under its own name.
    pub fn method(self, method: Method) -> Self {
        let name = method.name().to_string();
        self.child(name, Definition::Method(method))
    }

    /// Add a child node.
    pub fn node(self, name: impl Into<String>, node: RawNode) -> Self {
        self.child(name.into(), Definition::Node(node))
    }

    /// Whether some name was given to more than one child.
    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }

    fn child(mut self, name: String, definition: Definition) -> Self {
        match self.children.entry(name) {
            Entry::Occupied(taken) => self.duplicates.push(taken.key().clone()),
            Entry::Vacant(slot) => {
                slot.insert(definition);
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
