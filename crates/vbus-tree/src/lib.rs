//! Hierarchical node tree for vBus.
//!
//! A process publishes its data on the bus as a tree: nodes contain named
//! children, and leaves are either attributes (values, optionally computed on
//! demand by a resolver) or methods (remotely callable handlers). Every entity
//! is addressed by a [`Path`] from the tree root.
//!
//! # Architecture
//!
//! - **Definitions** are built by the host ([`Attribute`], [`Method`],
//!   [`RawNode`]) and handed to the tree at registration.
//! - **Resolvers** run on every read of an attribute that carries one. Their
//!   result is returned to the caller and never stored.
//! - **The tree** is copy-on-write: snapshots held by readers are never
//!   observed half-updated.
//!
//! # Modules
//!
//! - [`error`]: Error types for tree operations
//! - [`path`]: Path grammar and segment validation
//! - [`resolver`]: The [`Resolver`], [`SetHandler`], and [`MethodHandler`] traits
//! - [`definition`]: Attribute, method, and raw node definitions
//! - [`tree`]: The [`NodeTree`] and its entities

pub mod definition;
pub mod error;
pub mod path;
pub mod resolver;
pub mod tree;

pub use definition::{
    attr, infer_schema, on_get, on_set, try_on_get, AttrOption, Attribute, Definition, EntityId,
    Method, RawNode,
};
pub use error::{ResolverError, Result, TreeError};
pub use path::{validate_segment, Path};
pub use resolver::{in_resolver_scope, MethodHandler, ResolveResult, Resolver, SetHandler};
pub use tree::{Entity, EntityKind, Located, Node, NodeTree};
