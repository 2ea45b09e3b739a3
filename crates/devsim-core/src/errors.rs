//! ---
//! devsim_section: "03-device-simulation"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Device factory, registry, simulation scheduler and coordinator."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
use std::path::PathBuf;

use devsim_nodes::{DataType, NodeError, NodeId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SpaceError>;

#[derive(Debug, Error)]
pub enum SpaceError {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error("template {template} is malformed: {reason}")]
    MalformedTemplate { template: String, reason: String },
    #[error("unable to read template file {}", .path.display())]
    TemplateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("template file could not be parsed: {0}")]
    TemplateParse(#[from] serde_json::Error),
    #[error("unknown device template {0}")]
    UnknownTemplate(String),
    #[error("device instance {0} is already registered")]
    DuplicateInstance(String),
    #[error("instance {0} is not registered")]
    UnknownInstance(String),
    #[error("instance {instance} collides with existing node {node}")]
    IdentityCollision { instance: String, node: NodeId },
    #[error("stride {stride} cannot hold template {template} spanning {span} identities")]
    StrideTooSmall {
        template: String,
        stride: u32,
        span: u32,
    },
    #[error("offset {offset} with stride {stride} overlaps an issued identity range")]
    OffsetCollision { offset: u32, stride: u32 },
    #[error("offset {offset} lies inside the reserved range below {base}")]
    ReservedRange { offset: u32, base: u32 },
    #[error("identity space exhausted at offset {offset} with stride {stride}")]
    IdentityOverflow { offset: u32, stride: u32 },
    #[error("template identity {relative} shifted by offset {offset} leaves the identity space")]
    RemapOverflow { offset: u32, relative: u32 },
    #[error("node {0} has a non-numeric identity and cannot be remapped")]
    NonNumericIdentity(NodeId),
    #[error("template {template} declares method {method} without a registered handler")]
    MissingMethodHandler { template: String, method: String },
    #[error("instance {instance} has no variable at {path}")]
    UnknownTarget { instance: String, path: String },
    #[error("rule for {target} cannot drive a {data_type} variable")]
    RuleTypeMismatch { target: NodeId, data_type: DataType },
    #[error("rule for {target} is invalid: {reason}")]
    InvalidRule { target: String, reason: String },
    #[error("instance {0} already has a simulation binding")]
    AlreadySimulated(String),
    #[error("simulation period for {0} must be non-zero")]
    InvalidPeriod(String),
    #[error("server runtime rejected the request: {0}")]
    Runtime(String),
    #[error("{0} is not a well-known root the runtime can reference")]
    UnknownRootReference(NodeId),
}

impl SpaceError {
    /// Programming or deployment errors that must stop start-up rather than
    /// be absorbed as a partial build.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            SpaceError::StrideTooSmall { .. }
                | SpaceError::OffsetCollision { .. }
                | SpaceError::ReservedRange { .. }
                | SpaceError::IdentityOverflow { .. }
                | SpaceError::RemapOverflow { .. }
                | SpaceError::MissingMethodHandler { .. }
                | SpaceError::Runtime(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_contract_violations() {
        assert!(SpaceError::OffsetCollision {
            offset: 10,
            stride: 10
        }
        .is_contract_violation());
        assert!(SpaceError::MissingMethodHandler {
            template: "refrigerator".into(),
            method: "OpenCloseDoor".into()
        }
        .is_contract_violation());
        assert!(SpaceError::RemapOverflow {
            offset: u32::MAX,
            relative: 5
        }
        .is_contract_violation());
        assert!(!SpaceError::IdentityCollision {
            instance: "Refrigerator3".into(),
            node: NodeId::numeric(2, 10025)
        }
        .is_contract_violation());
        assert!(!SpaceError::UnknownTemplate("chiller".into()).is_contract_violation());
    }
}
