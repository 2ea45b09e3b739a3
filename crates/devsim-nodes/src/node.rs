//! ---
//! devsim_section: "02-address-space"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Node model, node arena, and template node builder."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::errors::{NodeError, Result};
use crate::ids::{NodeId, QualifiedName};
use crate::node_set::NodeSet;
use crate::value::{AccessLevel, DataType, StatusCode, ValueRank, Variant, WriteMask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum NodeClass {
    Folder,
    Object,
    Variable,
    Method,
}

/// Reference from a parent to the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ReferenceType {
    Organizes,
    HasComponent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum TypeDefinition {
    FolderType,
    BaseObjectType,
    BaseDataVariableType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableAttributes {
    pub data_type: DataType,
    pub value_rank: ValueRank,
    pub array_dimensions: Vec<u32>,
    pub value: Variant,
    pub status: StatusCode,
    pub access_level: AccessLevel,
    pub user_access_level: AccessLevel,
    pub historizing: bool,
    pub timestamp: DateTime<Utc>,
}

/// One declared input argument of a method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub data_type: DataType,
    #[serde(default)]
    pub value_rank: ValueRank,
}

impl Argument {
    pub fn new(name: impl Into<String>, description: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            data_type,
            value_rank: ValueRank::Scalar,
        }
    }
}

/// Callback invoked when a client calls a method.
///
/// The handler runs with the address-space lock held and receives exclusive
/// access to the node set through the [`MethodContext`].
pub type MethodHandler = Arc<dyn Fn(&mut MethodContext<'_>, &[Variant]) -> StatusCode + Send + Sync>;

#[derive(Clone, Default, Serialize)]
pub struct MethodAttributes {
    pub input_arguments: Vec<Argument>,
    pub executable: bool,
    pub user_executable: bool,
    #[serde(skip)]
    pub handler: Option<MethodHandler>,
}

impl fmt::Debug for MethodAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodAttributes")
            .field("input_arguments", &self.input_arguments)
            .field("executable", &self.executable)
            .field("user_executable", &self.user_executable)
            .field("handler", &self.handler.as_ref().map(|_| "<bound>"))
            .finish()
    }
}

/// Execution context handed to a [`MethodHandler`].
pub struct MethodContext<'a> {
    pub nodes: &'a mut NodeSet,
    pub object: NodeId,
    pub method: NodeId,
}

impl<'a> MethodContext<'a> {
    pub fn new(nodes: &'a mut NodeSet, object: NodeId, method: NodeId) -> Self {
        Self {
            nodes,
            object,
            method,
        }
    }

    fn child_id(&self, browse_name: &str) -> Result<NodeId> {
        self.nodes
            .find_child(&self.object, browse_name)
            .map(|node| node.id.clone())
            .ok_or_else(|| NodeError::UnknownChild(self.object.clone(), browse_name.to_owned()))
    }

    /// Write a sibling variable of the method, addressed by browse name.
    pub fn set_child_value(&mut self, browse_name: &str, value: Variant) -> Result<()> {
        let id = self.child_id(browse_name)?;
        self.nodes.set_value(&id, value, Utc::now())
    }

    pub fn child_value(&self, browse_name: &str) -> Result<&Variant> {
        let id = self.child_id(browse_name)?;
        self.nodes
            .get(&id)
            .and_then(Node::variable)
            .map(|variable| &variable.value)
            .ok_or(NodeError::NotAVariable(id))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "class", rename_all = "lowercase")]
pub enum NodeBody {
    Folder,
    Object,
    Variable(VariableAttributes),
    Method(MethodAttributes),
}

/// An addressable entity of the address space.
///
/// `parent` and `children` are maintained by [`NodeSet`] only.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub symbolic_name: String,
    pub browse_name: QualifiedName,
    pub display_name: String,
    pub description: Option<String>,
    pub reference_type: ReferenceType,
    pub type_definition: Option<TypeDefinition>,
    pub write_mask: WriteMask,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    #[serde(flatten)]
    pub body: NodeBody,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        name: &str,
        reference_type: ReferenceType,
        type_definition: Option<TypeDefinition>,
        write_mask: WriteMask,
        body: NodeBody,
    ) -> Self {
        Self {
            browse_name: QualifiedName::new(id.namespace, name),
            id,
            symbolic_name: name.to_owned(),
            display_name: name.to_owned(),
            description: None,
            reference_type,
            type_definition,
            write_mask,
            parent: None,
            children: Vec::new(),
            body,
        }
    }

    pub fn class(&self) -> NodeClass {
        match self.body {
            NodeBody::Folder => NodeClass::Folder,
            NodeBody::Object => NodeClass::Object,
            NodeBody::Variable(_) => NodeClass::Variable,
            NodeBody::Method(_) => NodeClass::Method,
        }
    }

    pub fn parent(&self) -> Option<&NodeId> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn variable(&self) -> Option<&VariableAttributes> {
        match &self.body {
            NodeBody::Variable(variable) => Some(variable),
            _ => None,
        }
    }

    pub fn variable_mut(&mut self) -> Option<&mut VariableAttributes> {
        match &mut self.body {
            NodeBody::Variable(variable) => Some(variable),
            _ => None,
        }
    }

    pub fn method(&self) -> Option<&MethodAttributes> {
        match &self.body {
            NodeBody::Method(method) => Some(method),
            _ => None,
        }
    }

    pub fn method_mut(&mut self) -> Option<&mut MethodAttributes> {
        match &mut self.body {
            NodeBody::Method(method) => Some(method),
            _ => None,
        }
    }
}
