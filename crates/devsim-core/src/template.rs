//! ---
//! devsim_section: "03-device-simulation"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Device factory, registry, simulation scheduler and coordinator."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
//! Device templates and the static template file format.
//!
//! A template is a tree of [`TemplateNode`]s with template-relative numeric
//! identities. The root object always has identity 0, so an instance created
//! at offset `n` owns identities `n .. n + span`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use devsim_nodes::{Argument, DataType, NodeClass, ValueRank, Variant};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{Result, SpaceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    #[default]
    ReadWrite,
    ReadOnly,
}

/// One node of a device template or static import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateNode {
    pub id: u32,
    pub name: String,
    pub class: NodeClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    #[serde(default)]
    pub value_rank: ValueRank,
    #[serde(default)]
    pub access: Access,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<Variant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Argument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TemplateNode>,
}

impl TemplateNode {
    fn new(id: u32, name: &str, class: NodeClass) -> Self {
        Self {
            id,
            name: name.to_owned(),
            class,
            data_type: None,
            value_rank: ValueRank::Scalar,
            access: Access::ReadWrite,
            initial: None,
            arguments: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn folder(id: u32, name: &str) -> Self {
        Self::new(id, name, NodeClass::Folder)
    }

    pub fn object(id: u32, name: &str) -> Self {
        Self::new(id, name, NodeClass::Object)
    }

    pub fn variable(id: u32, name: &str, data_type: DataType) -> Self {
        Self {
            data_type: Some(data_type),
            ..Self::new(id, name, NodeClass::Variable)
        }
    }

    pub fn method(id: u32, name: &str) -> Self {
        Self::new(id, name, NodeClass::Method)
    }

    pub fn with_child(mut self, child: TemplateNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_rank(mut self, value_rank: ValueRank) -> Self {
        self.value_rank = value_rank;
        self
    }

    pub fn with_initial(mut self, value: Variant) -> Self {
        self.initial = Some(value);
        self
    }

    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.access = Access::ReadOnly;
        self
    }

    /// Pre-order walk of this node and its descendants.
    pub fn walk(&self) -> Vec<&TemplateNode> {
        let mut order = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            stack.extend(node.children.iter().rev());
            order.push(node);
        }
        order
    }

    fn check(&self, template: &str) -> Result<()> {
        let malformed = |reason: String| SpaceError::MalformedTemplate {
            template: template.to_owned(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(malformed(format!("node {} has an empty name", self.id)));
        }
        match self.class {
            NodeClass::Variable => {
                let data_type = self
                    .data_type
                    .ok_or_else(|| malformed(format!("variable {} has no data type", self.name)))?;
                if let Some(initial) = &self.initial {
                    if !initial.conforms_to(data_type, self.value_rank) {
                        return Err(malformed(format!(
                            "initial value of {} does not match {}",
                            self.name, data_type
                        )));
                    }
                }
            }
            NodeClass::Method if !self.children.is_empty() => {
                return Err(malformed(format!("method {} cannot have children", self.name)));
            }
            _ => {}
        }
        if self.class != NodeClass::Variable && (self.data_type.is_some() || self.initial.is_some()) {
            return Err(malformed(format!("{} {} cannot carry a value", self.class, self.name)));
        }
        if self.class != NodeClass::Method && !self.arguments.is_empty() {
            return Err(malformed(format!("{} {} cannot declare arguments", self.class, self.name)));
        }
        Ok(())
    }
}

/// Immutable blueprint of one device kind.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTemplate {
    name: String,
    root: TemplateNode,
    span: u32,
    node_count: usize,
}

impl DeviceTemplate {
    pub fn new(name: impl Into<String>, root: TemplateNode) -> Result<Self> {
        let name = name.into();
        if root.class != NodeClass::Object {
            return Err(SpaceError::MalformedTemplate {
                template: name,
                reason: "template root must be an object".to_owned(),
            });
        }
        if root.id != 0 {
            return Err(SpaceError::MalformedTemplate {
                template: name,
                reason: format!("template root must have identity 0, found {}", root.id),
            });
        }

        let nodes = root.walk();
        let mut seen = HashSet::with_capacity(nodes.len());
        let mut highest = 0u32;
        for node in &nodes {
            node.check(&name)?;
            if !seen.insert(node.id) {
                return Err(SpaceError::MalformedTemplate {
                    template: name,
                    reason: format!("identity {} is used twice", node.id),
                });
            }
            highest = highest.max(node.id);
        }
        let node_count = nodes.len();
        let span = highest.checked_add(1).ok_or_else(|| SpaceError::MalformedTemplate {
            template: name.clone(),
            reason: "identity range does not fit in 32 bits".to_owned(),
        })?;
        debug!(template = %name, node_count, span, "device template validated");
        Ok(Self {
            name,
            root,
            span,
            node_count,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &TemplateNode {
        &self.root
    }

    /// Number of identities an instance occupies: highest relative id + 1.
    pub fn span(&self) -> u32 {
        self.span
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn method_names(&self) -> Vec<&str> {
        self.root
            .walk()
            .into_iter()
            .filter(|node| node.class == NodeClass::Method)
            .map(|node| node.name.as_str())
            .collect()
    }

    /// Fail unless `stride` leaves room for every identity of one instance.
    pub fn ensure_fits(&self, stride: u32) -> Result<()> {
        if stride < self.span {
            return Err(SpaceError::StrideTooSmall {
                template: self.name.clone(),
                stride,
                span: self.span,
            });
        }
        Ok(())
    }
}

/// Parsed static template file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateDocument {
    #[serde(default)]
    pub namespace_uris: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<TemplateNode>,
}

impl TemplateDocument {
    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Device template rooted at the top-level node called `root`.
    pub fn template(&self, root: &str) -> Result<DeviceTemplate> {
        let node = self
            .nodes
            .iter()
            .find(|node| node.name == root)
            .ok_or_else(|| SpaceError::UnknownTemplate(root.to_owned()))?;
        DeviceTemplate::new(root, node.clone())
    }
}

/// Loads static template files provided by the server deployment.
pub trait StaticTemplateLoader: Send + Sync {
    fn load_static_template(&self, path: &Path) -> Result<TemplateDocument>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTemplateLoader;

impl StaticTemplateLoader for JsonTemplateLoader {
    fn load_static_template(&self, path: &Path) -> Result<TemplateDocument> {
        debug!(path = %path.display(), "loading static template");
        let contents = fs::read_to_string(path).map_err(|source| SpaceError::TemplateFile {
            path: path.to_path_buf(),
            source,
        })?;
        TemplateDocument::from_json(&contents)
    }
}
