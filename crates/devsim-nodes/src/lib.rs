//! ---
//! devsim_section: "02-address-space"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Node model, node arena, and template node builder."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
//! Typed address-space nodes for the simulated device namespace.
//!
//! Nodes live in a [`NodeSet`] arena keyed by [`NodeId`]. The arena is the only
//! place parent/child links are written, which keeps both directions of every
//! link consistent. [`NodeBuilder`] produces fully-populated folder, object,
//! variable and method nodes.

pub mod builder;
pub mod errors;
pub mod generator;
pub mod ids;
pub mod node;
pub mod node_set;
pub mod value;

pub use builder::NodeBuilder;
pub use errors::{NodeError, Result};
pub use generator::{RandomValueGenerator, ValueSource};
pub use ids::{Identifier, NodeId, QualifiedName};
pub use node::{
    Argument, MethodAttributes, MethodContext, MethodHandler, Node, NodeBody, NodeClass,
    ReferenceType, TypeDefinition, VariableAttributes,
};
pub use node_set::NodeSet;
pub use value::{AccessLevel, DataType, DataValue, StatusCode, ValueRank, Variant, WriteMask};
