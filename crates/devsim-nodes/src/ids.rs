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

use serde::{Deserialize, Serialize};

/// Well-known numeric identity of the server's `Objects` folder in namespace 0.
pub const OBJECTS_FOLDER: u32 = 85;

/// Discriminator part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Numeric(u32),
    String(String),
}

impl From<u32> for Identifier {
    fn from(value: u32) -> Self {
        Identifier::Numeric(value)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Identifier::String(value.to_owned())
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Identifier::String(value)
    }
}

/// Identity of a node: namespace index plus numeric or string discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: Identifier,
}

impl NodeId {
    pub fn new(namespace: u16, identifier: impl Into<Identifier>) -> Self {
        Self {
            namespace,
            identifier: identifier.into(),
        }
    }

    pub fn numeric(namespace: u16, value: u32) -> Self {
        Self::new(namespace, value)
    }

    pub fn objects_folder() -> Self {
        Self::numeric(0, OBJECTS_FOLDER)
    }

    pub fn as_numeric(&self) -> Option<u32> {
        match self.identifier {
            Identifier::Numeric(value) => Some(value),
            Identifier::String(_) => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Identifier::Numeric(value) => write!(f, "ns={};i={}", self.namespace, value),
            Identifier::String(value) => write!(f, "ns={};s={}", self.namespace, value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub namespace: u16,
    pub name: String,
}

impl QualifiedName {
    pub fn new(namespace: u16, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}
