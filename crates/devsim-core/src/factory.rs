//! ---
//! devsim_section: "03-device-simulation"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Device factory, registry, simulation scheduler and coordinator."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
//! Instance factory: stamps a detached copy of a template, shifts its
//! identities into the instance range and binds method callbacks.

use std::collections::HashMap;

use chrono::Utc;
use devsim_nodes::{
    AccessLevel, MethodHandler, NodeBuilder, NodeClass, NodeId, NodeSet,
};
use tracing::{debug, warn};

use crate::errors::{Result, SpaceError};
use crate::registry::IdentityRange;
use crate::template::{Access, DeviceTemplate, TemplateNode};

/// Method callbacks keyed by method browse name.
#[derive(Clone, Default)]
pub struct MethodTable {
    handlers: HashMap<String, MethodHandler>,
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("MethodTable").field("methods", &names).finish()
    }
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method: impl Into<String>, handler: MethodHandler) {
        self.handlers.insert(method.into(), handler);
    }

    pub fn get(&self, method: &str) -> Option<&MethodHandler> {
        self.handlers.get(method)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// A remapped subtree not yet attached to the address space.
#[derive(Debug)]
pub struct BuiltInstance {
    pub nodes: NodeSet,
    pub root: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    /// Every declared method needs a handler.
    Required,
    /// Methods without a handler are exposed as non-executable.
    Optional,
}

pub struct InstanceFactory {
    builder: NodeBuilder,
    methods: MethodTable,
}

impl InstanceFactory {
    pub fn new(builder: NodeBuilder, methods: MethodTable) -> Self {
        Self { builder, methods }
    }

    pub fn namespace(&self) -> u16 {
        self.builder.namespace()
    }

    pub fn builder_mut(&mut self) -> &mut NodeBuilder {
        &mut self.builder
    }

    /// Build one device instance inside `range`.
    pub fn instantiate(
        &mut self,
        template: &DeviceTemplate,
        name: &str,
        range: IdentityRange,
    ) -> Result<BuiltInstance> {
        template.ensure_fits(range.stride())?;
        let (nodes, root) = self.materialize(template.root(), name)?;
        let (mut nodes, root) = remap_identities(nodes, &root, range.offset())?;
        self.bind_methods(template.name(), &mut nodes, Binding::Required)?;
        debug!(
            template = template.name(),
            instance = name,
            root = %root,
            nodes = nodes.len(),
            "instance materialized"
        );
        Ok(BuiltInstance { nodes, root })
    }

    /// Build a static subtree with the identities it declares, binding
    /// whatever method handlers are known.
    pub fn import(&mut self, root: &TemplateNode) -> Result<BuiltInstance> {
        let (mut nodes, root_id) = self.materialize(root, &root.name)?;
        self.bind_methods(&root.name, &mut nodes, Binding::Optional)?;
        Ok(BuiltInstance {
            nodes,
            root: root_id,
        })
    }

    /// Structural clone of `root` with template-relative identities. The root
    /// takes `name` as its browse and display name.
    fn materialize(&mut self, root: &TemplateNode, name: &str) -> Result<(NodeSet, NodeId)> {
        let mut nodes = NodeSet::new();
        let mut stack: Vec<(&TemplateNode, Option<NodeId>)> = vec![(root, None)];
        let mut root_id = None;
        while let Some((shape, parent)) = stack.pop() {
            let node_name = if parent.is_none() { name } else { shape.name.as_str() };
            let id = self.build_node(&mut nodes, shape, parent.as_ref(), node_name)?;
            for child in shape.children.iter().rev() {
                stack.push((child, Some(id.clone())));
            }
            root_id.get_or_insert(id);
        }
        let root_id = root_id.ok_or_else(|| SpaceError::MalformedTemplate {
            template: name.to_owned(),
            reason: "template has no root".to_owned(),
        })?;
        Ok((nodes, root_id))
    }

    fn build_node(
        &mut self,
        nodes: &mut NodeSet,
        shape: &TemplateNode,
        parent: Option<&NodeId>,
        name: &str,
    ) -> Result<NodeId> {
        let id = match shape.class {
            NodeClass::Folder => self.builder.folder(nodes, parent, shape.id, name)?,
            NodeClass::Object => self.builder.object(nodes, parent, shape.id, name)?,
            NodeClass::Variable => {
                let data_type = shape.data_type.ok_or_else(|| SpaceError::MalformedTemplate {
                    template: name.to_owned(),
                    reason: "variable without data type".to_owned(),
                })?;
                let id = self
                    .builder
                    .variable(nodes, parent, shape.id, name, data_type, shape.value_rank)?;
                if let Some(initial) = &shape.initial {
                    nodes.set_value(&id, initial.clone(), Utc::now())?;
                }
                if shape.access == Access::ReadOnly {
                    if let Some(variable) = nodes.get_mut(&id).and_then(|node| node.variable_mut()) {
                        variable.access_level = AccessLevel::CURRENT_READ;
                        variable.user_access_level = AccessLevel::CURRENT_READ;
                    }
                }
                id
            }
            NodeClass::Method => {
                let id = self.builder.method(nodes, parent, shape.id, name)?;
                if let Some(method) = nodes.get_mut(&id).and_then(|node| node.method_mut()) {
                    method.input_arguments = shape.arguments.clone();
                }
                id
            }
        };
        Ok(id)
    }

    fn bind_methods(&self, template: &str, nodes: &mut NodeSet, binding: Binding) -> Result<()> {
        let method_ids: Vec<NodeId> = nodes
            .iter()
            .filter(|node| node.class() == NodeClass::Method)
            .map(|node| node.id.clone())
            .collect();
        for id in method_ids {
            let Some(node) = nodes.get_mut(&id) else {
                continue;
            };
            let method_name = node.browse_name.name.clone();
            let handler = self.methods.get(&method_name).cloned();
            let Some(method) = node.method_mut() else {
                continue;
            };
            match (handler, binding) {
                (Some(handler), _) => method.handler = Some(handler),
                (None, Binding::Required) => {
                    return Err(SpaceError::MissingMethodHandler {
                        template: template.to_owned(),
                        method: method_name,
                    })
                }
                (None, Binding::Optional) => {
                    warn!(template, method = %method_name, "no handler registered; method is not executable");
                    method.executable = false;
                    method.user_executable = false;
                }
            }
        }
        Ok(())
    }
}

/// Shift every numeric identity of the subtree under `root` by `offset`.
///
/// Walks the subtree with an explicit stack and visits each node once. The
/// subtree must be detached and contain nothing but `root` and its
/// descendants.
pub fn remap_identities(nodes: NodeSet, root: &NodeId, offset: u32) -> Result<(NodeSet, NodeId)> {
    let mut mapping = HashMap::with_capacity(nodes.len());
    let mut stack = vec![root.clone()];
    while let Some(id) = stack.pop() {
        if mapping.contains_key(&id) {
            continue;
        }
        let node = nodes
            .get(&id)
            .ok_or_else(|| devsim_nodes::NodeError::UnknownNode(id.clone()))?;
        let relative = id
            .as_numeric()
            .ok_or_else(|| SpaceError::NonNumericIdentity(id.clone()))?;
        let shifted = relative
            .checked_add(offset)
            .ok_or(SpaceError::RemapOverflow { offset, relative })?;
        stack.extend(node.children().iter().cloned());
        mapping.insert(id.clone(), NodeId::numeric(id.namespace, shifted));
    }
    if mapping.len() != nodes.len() {
        return Err(SpaceError::MalformedTemplate {
            template: root.to_string(),
            reason: format!(
                "{} nodes are not reachable from the root",
                nodes.len() - mapping.len()
            ),
        });
    }
    let new_root = mapping
        .get(root)
        .cloned()
        .ok_or_else(|| devsim_nodes::NodeError::UnknownNode(root.clone()))?;
    Ok((nodes.rekey(&mapping)?, new_root))
}
