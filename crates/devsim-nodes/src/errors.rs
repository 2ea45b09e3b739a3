//! ---
//! devsim_section: "02-address-space"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Node model, node arena, and template node builder."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
use thiserror::Error;

use crate::ids::NodeId;
use crate::value::{DataType, ValueRank};

pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node {0} already exists in the address space")]
    DuplicateIdentity(NodeId),
    #[error("node {0} not found")]
    UnknownNode(NodeId),
    #[error("parent node {0} not found")]
    UnknownParent(NodeId),
    #[error("node {0} has no child named {1}")]
    UnknownChild(NodeId, String),
    #[error("node {0} is not a variable")]
    NotAVariable(NodeId),
    #[error("value written to {node} does not conform to {data_type} ({value_rank})")]
    TypeMismatch {
        node: NodeId,
        data_type: DataType,
        value_rank: ValueRank,
    },
    #[error("subtree root {0} is still linked to a parent")]
    AttachedSubtreeRoot(NodeId),
    #[error("node {0} is missing from the identity mapping")]
    UnmappedNode(NodeId),
}
