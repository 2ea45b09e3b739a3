//! ---
//! devsim_section: "02-address-space"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Node model, node arena, and template node builder."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
use chrono::Utc;
use tracing::trace;

use crate::errors::Result;
use crate::generator::ValueSource;
use crate::ids::{Identifier, NodeId};
use crate::node::{
    MethodAttributes, Node, NodeBody, ReferenceType, TypeDefinition, VariableAttributes,
};
use crate::node_set::NodeSet;
use crate::value::{AccessLevel, DataType, StatusCode, ValueRank, Variant, WriteMask};

/// Creates fully-populated nodes inside one namespace and links them into a
/// [`NodeSet`].
pub struct NodeBuilder {
    namespace: u16,
    values: Box<dyn ValueSource>,
}

impl NodeBuilder {
    pub fn new(namespace: u16, values: Box<dyn ValueSource>) -> Self {
        Self { namespace, values }
    }

    pub fn namespace(&self) -> u16 {
        self.namespace
    }

    pub fn node_id(&self, identifier: impl Into<Identifier>) -> NodeId {
        NodeId::new(self.namespace, identifier)
    }

    pub fn folder(
        &mut self,
        nodes: &mut NodeSet,
        parent: Option<&NodeId>,
        id: impl Into<Identifier>,
        name: &str,
    ) -> Result<NodeId> {
        let node = Node::new(
            self.node_id(id),
            name,
            ReferenceType::Organizes,
            Some(TypeDefinition::FolderType),
            WriteMask::NONE,
            NodeBody::Folder,
        );
        self.link(nodes, node, parent)
    }

    pub fn object(
        &mut self,
        nodes: &mut NodeSet,
        parent: Option<&NodeId>,
        id: impl Into<Identifier>,
        name: &str,
    ) -> Result<NodeId> {
        let node = Node::new(
            self.node_id(id),
            name,
            ReferenceType::Organizes,
            Some(TypeDefinition::BaseObjectType),
            WriteMask::NONE,
            NodeBody::Object,
        );
        self.link(nodes, node, parent)
    }

    /// Variable with a generated initial value of the requested type and rank.
    pub fn variable(
        &mut self,
        nodes: &mut NodeSet,
        parent: Option<&NodeId>,
        id: impl Into<Identifier>,
        name: &str,
        data_type: DataType,
        value_rank: ValueRank,
    ) -> Result<NodeId> {
        let value = self.initial_value(data_type, value_rank);
        let attributes = VariableAttributes {
            data_type,
            value_rank,
            array_dimensions: value_rank.array_dimensions(),
            value,
            status: StatusCode::Good,
            access_level: AccessLevel::CURRENT_READ_OR_WRITE,
            user_access_level: AccessLevel::CURRENT_READ_OR_WRITE,
            historizing: false,
            timestamp: Utc::now(),
        };
        let node = Node::new(
            self.node_id(id),
            name,
            ReferenceType::Organizes,
            Some(TypeDefinition::BaseDataVariableType),
            WriteMask::DISPLAY_NAME | WriteMask::DESCRIPTION,
            NodeBody::Variable(attributes),
        );
        self.link(nodes, node, parent)
    }

    /// Executable method with an empty argument list and no handler yet.
    pub fn method(
        &mut self,
        nodes: &mut NodeSet,
        parent: Option<&NodeId>,
        id: impl Into<Identifier>,
        name: &str,
    ) -> Result<NodeId> {
        let attributes = MethodAttributes {
            input_arguments: Vec::new(),
            executable: true,
            user_executable: true,
            handler: None,
        };
        let node = Node::new(
            self.node_id(id),
            name,
            ReferenceType::HasComponent,
            None,
            WriteMask::NONE,
            NodeBody::Method(attributes),
        );
        self.link(nodes, node, parent)
    }

    /// Folder `name` at `path` holding `count` numbered variables named
    /// `name_00`, `name_01`, ... at paths `path_name_00`, ...
    #[allow(clippy::too_many_arguments)]
    pub fn variables(
        &mut self,
        nodes: &mut NodeSet,
        parent: Option<&NodeId>,
        path: &str,
        name: &str,
        data_type: DataType,
        value_rank: ValueRank,
        count: u16,
    ) -> Result<Vec<NodeId>> {
        let folder = self.folder(nodes, parent, path, name)?;
        (0..count)
            .map(|index| {
                let numbered = format!("{name}_{index:02}");
                let numbered_path = format!("{path}_{numbered}");
                self.variable(
                    nodes,
                    Some(&folder),
                    numbered_path,
                    &numbered,
                    data_type,
                    value_rank,
                )
            })
            .collect()
    }

    fn initial_value(&mut self, data_type: DataType, value_rank: ValueRank) -> Variant {
        loop {
            if let Some(value) = self.values.draw(data_type, value_rank) {
                return value;
            }
        }
    }

    fn link(&mut self, nodes: &mut NodeSet, node: Node, parent: Option<&NodeId>) -> Result<NodeId> {
        trace!(node = %node.id, class = %node.class(), "building node");
        nodes.insert(node, parent)
    }
}
