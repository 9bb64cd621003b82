//! The path-keyed node tree.
//!
//! Nodes are shared as `Arc<Node>` and mutated copy-on-write: an insertion or
//! removal clones only the nodes along the path from the root, so any
//! snapshot a reader already holds stays internally consistent. A subtree
//! is built completely before it is linked into its parent, which makes
//! [`NodeTree::add`] atomic with respect to lookups.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::definition::{Attribute, Definition, EntityId, Method, RawNode};
use crate::error::{Result, TreeError};
use crate::path::Path;
use crate::resolver::in_resolver_scope;

/// Kind of a tree entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Attribute,
    Method,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "a node",
            Self::Attribute => "an attribute",
            Self::Method => "a method",
        }
    }
}

/// A registered entity: cheap to clone, shares the underlying definition.
#[derive(Clone, Debug)]
pub enum Entity {
    Node(Arc<Node>),
    Attribute(Arc<Attribute>),
    Method(Arc<Method>),
}

impl Entity {
    pub fn id(&self) -> EntityId {
        match self {
            Self::Node(n) => n.id(),
            Self::Attribute(a) => a.id(),
            Self::Method(m) => m.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Node(n) => n.name(),
            Self::Attribute(a) => a.name(),
            Self::Method(m) => m.name(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Node(_) => EntityKind::Node,
            Self::Attribute(_) => EntityKind::Attribute,
            Self::Method(_) => EntityKind::Method,
        }
    }

    pub fn as_node(&self) -> Option<&Arc<Node>> {
        match self {
            Self::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_attribute(&self) -> Option<&Arc<Attribute>> {
        match self {
            Self::Attribute(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&Arc<Method>> {
        match self {
            Self::Method(m) => Some(m),
            _ => None,
        }
    }

    /// Returns `true` if both handles refer to the same registered entity.
    pub fn same_entity(&self, other: &Entity) -> bool {
        self.id() == other.id()
    }

    /// Bus representation of the entity.
    pub fn repr(&self) -> Value {
        match self {
            Self::Node(n) => n.repr(),
            Self::Attribute(a) => a.repr(),
            Self::Method(m) => m.repr(),
        }
    }

    fn is_leaf(&self) -> bool {
        !matches!(self, Self::Node(_))
    }

    fn from_definition(path: &Path, definition: Definition) -> Result<Self> {
        let name = path.name().unwrap_or_default();
        let own_name = match &definition {
            Definition::Node(_) => None,
            Definition::Attribute(a) => Some(a.name()),
            Definition::Method(m) => Some(m.name()),
        };
        if let Some(own) = own_name.filter(|own| *own != name) {
            return Err(TreeError::invalid(
                path.to_string(),
                format!("leaf is named {own}, not {name}"),
            ));
        }
        Ok(match definition {
            Definition::Node(raw) => Self::Node(Arc::new(Node::from_raw(path, raw)?)),
            Definition::Attribute(a) => Self::Attribute(Arc::new(a)),
            Definition::Method(m) => Self::Method(Arc::new(m)),
        })
    }
}

/// A non-leaf entity owning its children.
#[derive(Clone, Debug)]
pub struct Node {
    id: EntityId,
    name: String,
    children: BTreeMap<String, Entity>,
}

impl Node {
    fn empty(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::next(),
            name: name.into(),
            children: BTreeMap::new(),
        }
    }

    /// Build a node from raw contents, validating every child name.
    ///
    /// A name given twice in the builder is a `PathConflict`.
    fn from_raw(path: &Path, raw: RawNode) -> Result<Self> {
        if let Some(duplicate) = raw.duplicates.first() {
            return Err(TreeError::PathConflict {
                path: path.join(duplicate.clone())?.to_string(),
            });
        }
        let mut node = Self::empty(path.name().unwrap_or_default());
        for (child_name, definition) in raw.children {
            let child_path = path.join(child_name.clone())?;
            let child = Entity::from_definition(&child_path, definition)?;
            node.children.insert(child_name, child);
        }
        Ok(node)
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn child(&self, name: &str) -> Option<&Entity> {
        self.children.get(name)
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &Entity)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// JSON map of every child's representation.
    pub fn repr(&self) -> Value {
        let mut map = Map::new();
        for (name, child) in &self.children {
            map.insert(name.clone(), child.repr());
        }
        Value::Object(map)
    }

    fn count(&self) -> usize {
        self.children
            .values()
            .map(|child| match child {
                Entity::Node(n) => 1 + n.count(),
                _ => 1,
            })
            .sum()
    }

    fn collect_leaves(&self, prefix: &Path, out: &mut Vec<Path>) {
        for (name, child) in &self.children {
            let Ok(path) = prefix.join(name.clone()) else {
                continue;
            };
            match child {
                Entity::Node(n) => n.collect_leaves(&path, out),
                _ => out.push(path),
            }
        }
    }
}

/// Result of a longest-prefix walk: the entity reached and the full request.
#[derive(Clone, Debug)]
pub struct Located {
    pub entity: Entity,
    /// Path of the entity itself.
    pub matched: Path,
    /// Every segment of the request, including any past a leaf.
    pub segments: Vec<String>,
}

impl Located {
    /// Segments beyond the matched leaf (empty for exact matches).
    pub fn remainder(&self) -> &[String] {
        &self.segments[self.matched.len()..]
    }
}

/// A tree of nodes rooted at a registered top-level name.
#[derive(Clone, Debug)]
pub struct NodeTree {
    root: Arc<Node>,
}

impl NodeTree {
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            root: Arc::new(Node::empty(root_name)),
        }
    }

    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    /// Insert `definition` at `parent.name`.
    ///
    /// Fails with `PathConflict` if something already exists there, and with
    /// `InvalidPath` if the parent is missing or is a leaf.
    pub fn add(&mut self, parent: &Path, name: &str, definition: Definition) -> Result<Entity> {
        let full = parent.join(name)?;
        if in_resolver_scope() {
            return Err(TreeError::MutationInResolver {
                path: full.to_string(),
            });
        }

        // Validate against the current shape before cloning anything.
        let target = self.walk_to_node(parent, &full)?;
        if target.children.contains_key(name) {
            return Err(TreeError::PathConflict {
                path: full.to_string(),
            });
        }

        let entity = Entity::from_definition(&full, definition)?;
        let node = self.node_mut(parent);
        node.children.insert(name.to_string(), entity.clone());
        debug!(path = %full, kind = ?entity.kind(), "entity added");
        Ok(entity)
    }

    /// Return the entity at exactly `path`.
    pub fn lookup(&self, path: &Path) -> Result<Entity> {
        let mut current = &self.root;
        let Some((last, parents)) = path.segments().split_last() else {
            return Ok(Entity::Node(Arc::clone(&self.root)));
        };
        for segment in parents {
            match current.children.get(segment) {
                Some(Entity::Node(child)) => current = child,
                _ => return Err(not_found(path)),
            }
        }
        current
            .children
            .get(last)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    /// Detach and return the entity at `path`.
    pub fn remove(&mut self, path: &Path) -> Result<Entity> {
        let Some((parent, name)) = path.split_last() else {
            return Err(TreeError::invalid(path.to_string(), "cannot remove the root"));
        };
        if in_resolver_scope() {
            return Err(TreeError::MutationInResolver {
                path: path.to_string(),
            });
        }
        // Fails with NotFound before any copy-on-write happens.
        self.lookup(path)?;

        let node = self.node_mut(&parent);
        let removed = node.children.remove(&name).ok_or_else(|| not_found(path))?;
        debug!(path = %path, kind = ?removed.kind(), "entity removed");
        Ok(removed)
    }

    /// Walk `path` as far as it goes, stopping at the first leaf.
    ///
    /// Segments past a leaf are kept in [`Located::segments`] so that a
    /// resolver can interpret them (an index, a sub-key).
    pub fn locate(&self, path: &Path) -> Result<Located> {
        let mut current = &self.root;
        for (depth, segment) in path.segments().iter().enumerate() {
            match current.children.get(segment) {
                Some(Entity::Node(child)) => current = child,
                Some(leaf) => {
                    let matched = Path::from_segments(path.segments()[..=depth].iter().cloned())?;
                    return Ok(Located {
                        entity: leaf.clone(),
                        matched,
                        segments: path.segments().to_vec(),
                    });
                }
                None => return Err(not_found(path)),
            }
        }
        Ok(Located {
            entity: Entity::Node(Arc::clone(current)),
            matched: path.clone(),
            segments: path.segments().to_vec(),
        })
    }

    /// Total number of entities below the root.
    pub fn entity_count(&self) -> usize {
        self.root.count()
    }

    /// Paths of every attribute and method, in sorted order.
    pub fn leaf_paths(&self) -> Vec<Path> {
        let mut out = Vec::new();
        self.root.collect_leaves(&Path::root(), &mut out);
        out
    }

    fn walk_to_node(&self, parent: &Path, full: &Path) -> Result<&Node> {
        let mut current = self.root.as_ref();
        for (depth, segment) in parent.segments().iter().enumerate() {
            let reached = parent.segments()[..=depth].join(".");
            match current.children.get(segment) {
                Some(Entity::Node(child)) => current = child.as_ref(),
                Some(leaf) if leaf.is_leaf() => {
                    return Err(TreeError::invalid(
                        full.to_string(),
                        format!("{reached} is {}, not a node", leaf.kind().as_str()),
                    ));
                }
                _ => {
                    return Err(TreeError::invalid(
                        full.to_string(),
                        format!("{reached} does not exist"),
                    ));
                }
            }
        }
        Ok(current)
    }

    /// Mutable access to a node already known to exist, cloning shared
    /// ancestors as needed.
    fn node_mut(&mut self, path: &Path) -> &mut Node {
        let mut current = Arc::make_mut(&mut self.root);
        for segment in path.segments() {
            current = match current.children.get_mut(segment) {
                Some(Entity::Node(child)) => Arc::make_mut(child),
                _ => unreachable!("node_mut called on a path that was not validated"),
            };
        }
        current
    }
}

fn not_found(path: &Path) -> TreeError {
    TreeError::NotFound {
        path: path.to_string(),
    }
}
