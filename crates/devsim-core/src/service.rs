//! ---
//! devsim_section: "03-device-simulation"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Device factory, registry, simulation scheduler and coordinator."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
//! Attribute service used by the hosting runtime to read, write, browse and
//! call into the address space. Every operation takes the address-space lock.

use chrono::Utc;
use devsim_nodes::{
    Argument, DataValue, MethodContext, Node, NodeBody, NodeClass, NodeError, NodeId,
    QualifiedName, ReferenceType, StatusCode, Variant,
};
use serde::Serialize;
use strum::Display;
use tracing::debug;

use crate::space::AddressSpace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum AttributeId {
    NodeId,
    NodeClass,
    BrowseName,
    DisplayName,
    Description,
    WriteMask,
    Value,
    DataType,
    ValueRank,
    ArrayDimensions,
    AccessLevel,
    UserAccessLevel,
    Historizing,
    Executable,
    UserExecutable,
    /// Declared input arguments of a method.
    InputArguments,
}

/// One forward reference returned by [`AttributeService::browse`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrowseEntry {
    pub node_id: NodeId,
    pub browse_name: QualifiedName,
    pub display_name: String,
    pub class: NodeClass,
    pub reference_type: ReferenceType,
}

#[derive(Debug, Clone)]
pub struct AttributeService {
    space: AddressSpace,
}

impl AttributeService {
    pub fn new(space: AddressSpace) -> Self {
        Self { space }
    }

    pub fn read(&self, node: &NodeId, attribute: AttributeId) -> DataValue {
        let state = self.space.lock();
        let Some(node) = state.nodes.get(node) else {
            return DataValue::bad(StatusCode::BadNodeIdUnknown);
        };
        if attribute == AttributeId::Value {
            return read_value(node);
        }
        match attribute_value(node, attribute) {
            Some(value) => DataValue::good(value, None),
            None => DataValue::bad(StatusCode::BadAttributeIdInvalid),
        }
    }

    pub fn read_value(&self, node: &NodeId) -> DataValue {
        self.read(node, AttributeId::Value)
    }

    /// Client write of a variable value, honouring access level and type.
    pub fn write_value(&self, node: &NodeId, value: Variant) -> StatusCode {
        let mut state = self.space.lock();
        let Some(variable) = state.nodes.get(node).map(Node::variable) else {
            return StatusCode::BadNodeIdUnknown;
        };
        match variable {
            None => return StatusCode::BadAttributeIdInvalid,
            Some(variable) if !variable.user_access_level.writable() => {
                return StatusCode::BadNotWritable
            }
            Some(_) => {}
        }
        match state.nodes.set_value(node, value, Utc::now()) {
            Ok(()) => StatusCode::Good,
            Err(NodeError::TypeMismatch { .. }) => StatusCode::BadTypeMismatch,
            Err(_) => StatusCode::Bad,
        }
    }

    pub fn browse(&self, node: &NodeId) -> Result<Vec<BrowseEntry>, StatusCode> {
        let state = self.space.lock();
        if !state.nodes.contains(node) {
            return Err(StatusCode::BadNodeIdUnknown);
        }
        Ok(state
            .nodes
            .children_of(node)
            .map(|child| BrowseEntry {
                node_id: child.id.clone(),
                browse_name: child.browse_name.clone(),
                display_name: child.display_name.clone(),
                class: child.class(),
                reference_type: child.reference_type,
            })
            .collect())
    }

    /// Declared input arguments of `method`, in call order.
    pub fn input_arguments(&self, method: &NodeId) -> Result<Vec<Argument>, StatusCode> {
        let state = self.space.lock();
        let node = state.nodes.get(method).ok_or(StatusCode::BadNodeIdUnknown)?;
        node.method()
            .map(|attributes| attributes.input_arguments.clone())
            .ok_or(StatusCode::BadAttributeIdInvalid)
    }

    /// Invoke the handler bound to `method`, a method component of `object`.
    pub fn call(&self, object: &NodeId, method: &NodeId, arguments: &[Variant]) -> StatusCode {
        let mut state = self.space.lock();
        if !state.nodes.contains(object) {
            return StatusCode::BadNodeIdUnknown;
        }
        let Some(node) = state.nodes.get(method) else {
            return StatusCode::BadMethodInvalid;
        };
        if node.parent() != Some(object) {
            return StatusCode::BadMethodInvalid;
        }
        let Some(attributes) = node.method() else {
            return StatusCode::BadMethodInvalid;
        };
        if !attributes.user_executable {
            return StatusCode::BadNotExecutable;
        }
        let Some(handler) = attributes.handler.clone() else {
            return StatusCode::BadNotExecutable;
        };
        let mut context = MethodContext::new(&mut state.nodes, object.clone(), method.clone());
        let status = handler(&mut context, arguments);
        debug!(object = %object, method = %method, %status, "method called");
        status
    }
}

fn read_value(node: &Node) -> DataValue {
    match node.variable() {
        None => DataValue::bad(StatusCode::BadAttributeIdInvalid),
        Some(variable) if !variable.user_access_level.readable() => {
            DataValue::bad(StatusCode::BadNotReadable)
        }
        Some(variable) => DataValue {
            value: Some(variable.value.clone()),
            status: variable.status,
            source_timestamp: Some(variable.timestamp),
        },
    }
}

fn attribute_value(node: &Node, attribute: AttributeId) -> Option<Variant> {
    let common = match attribute {
        AttributeId::NodeId => Some(Variant::String(node.id.to_string())),
        AttributeId::NodeClass => Some(Variant::String(node.class().to_string())),
        AttributeId::BrowseName => Some(Variant::String(node.browse_name.to_string())),
        AttributeId::DisplayName => Some(Variant::String(node.display_name.clone())),
        AttributeId::Description => Some(Variant::String(node.description.clone().unwrap_or_default())),
        AttributeId::WriteMask => Some(Variant::UInt32(node.write_mask.bits())),
        _ => None,
    };
    if common.is_some() {
        return common;
    }
    match (&node.body, attribute) {
        (NodeBody::Variable(variable), AttributeId::DataType) => {
            Some(Variant::String(variable.data_type.to_string()))
        }
        (NodeBody::Variable(variable), AttributeId::ValueRank) => {
            Some(Variant::Int32(variable.value_rank.code()))
        }
        (NodeBody::Variable(variable), AttributeId::ArrayDimensions) => Some(Variant::Array(
            variable
                .array_dimensions
                .iter()
                .map(|dimension| Variant::UInt32(*dimension))
                .collect(),
        )),
        (NodeBody::Variable(variable), AttributeId::AccessLevel) => {
            Some(Variant::Byte(variable.access_level.bits()))
        }
        (NodeBody::Variable(variable), AttributeId::UserAccessLevel) => {
            Some(Variant::Byte(variable.user_access_level.bits()))
        }
        (NodeBody::Variable(variable), AttributeId::Historizing) => {
            Some(Variant::Boolean(variable.historizing))
        }
        (NodeBody::Method(method), AttributeId::Executable) => Some(Variant::Boolean(method.executable)),
        (NodeBody::Method(method), AttributeId::UserExecutable) => {
            Some(Variant::Boolean(method.user_executable))
        }
        (NodeBody::Method(method), AttributeId::InputArguments) => Some(Variant::Array(
            method.input_arguments.iter().map(argument_value).collect(),
        )),
        _ => None,
    }
}

/// Encode an argument as `[name, description, data type, value rank]`.
fn argument_value(argument: &Argument) -> Variant {
    Variant::Array(vec![
        Variant::String(argument.name.clone()),
        Variant::String(argument.description.clone()),
        Variant::String(argument.data_type.to_string()),
        Variant::Int32(argument.value_rank.code()),
    ])
}
