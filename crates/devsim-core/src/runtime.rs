//! ---
//! devsim_section: "03-device-simulation"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Device factory, registry, simulation scheduler and coordinator."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
//! Boundary to the protocol server that hosts the address space.

use devsim_nodes::NodeId;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::errors::{Result, SpaceError};

/// URI of namespace 0, owned by the server itself.
pub const BASE_NAMESPACE_URI: &str = "http://opcfoundation.org/UA/";

/// Capabilities the hosting server runtime provides to this crate.
pub trait ServerRuntime: Send + Sync {
    /// Reserve a namespace for `uris` and return the index of the first one.
    fn register_namespace(&self, uris: &[String]) -> Result<u16>;

    /// Link `node` under a well-known node owned by the runtime.
    fn attach_root_reference(&self, node: &NodeId, well_known_parent: &NodeId) -> Result<()>;

    /// Make nodes of `namespace` visible to the runtime's services. Called
    /// again after nodes were imported into an already registered namespace.
    fn register_node_manager(&self, namespace: u16) -> Result<()>;
}

#[derive(Debug, Default)]
struct LocalRuntimeState {
    namespaces: Vec<String>,
    root_references: IndexMap<NodeId, Vec<NodeId>>,
    node_managers: Vec<u16>,
}

/// In-process runtime with the server's namespace table and the `Objects`
/// folder as its only well-known root.
#[derive(Debug)]
pub struct LocalRuntime {
    state: Mutex<LocalRuntimeState>,
}

impl LocalRuntime {
    pub fn new(server_uri: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(LocalRuntimeState {
                namespaces: vec![BASE_NAMESPACE_URI.to_owned(), server_uri.into()],
                ..LocalRuntimeState::default()
            }),
        }
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.state.lock().namespaces.clone()
    }

    pub fn root_references(&self, parent: &NodeId) -> Vec<NodeId> {
        self.state
            .lock()
            .root_references
            .get(parent)
            .cloned()
            .unwrap_or_default()
    }

    pub fn node_managers(&self) -> Vec<u16> {
        self.state.lock().node_managers.clone()
    }
}

impl Default for LocalRuntime {
    fn default() -> Self {
        Self::new("urn:devsim:server")
    }
}

impl ServerRuntime for LocalRuntime {
    fn register_namespace(&self, uris: &[String]) -> Result<u16> {
        let mut state = self.state.lock();
        let mut first = None;
        for uri in uris {
            let index = match state.namespaces.iter().position(|known| known == uri) {
                Some(index) => index,
                None => {
                    state.namespaces.push(uri.clone());
                    state.namespaces.len() - 1
                }
            };
            first.get_or_insert(index);
        }
        let index = first.ok_or_else(|| SpaceError::Runtime("no namespace uri given".to_owned()))?;
        let index = u16::try_from(index)
            .map_err(|_| SpaceError::Runtime("namespace table is full".to_owned()))?;
        info!(namespace = index, uri = %uris[0], "namespace registered");
        Ok(index)
    }

    fn attach_root_reference(&self, node: &NodeId, well_known_parent: &NodeId) -> Result<()> {
        if well_known_parent != &NodeId::objects_folder() {
            return Err(SpaceError::UnknownRootReference(well_known_parent.clone()));
        }
        let mut state = self.state.lock();
        let children = state
            .root_references
            .entry(well_known_parent.clone())
            .or_default();
        if !children.contains(node) {
            children.push(node.clone());
            debug!(node = %node, parent = %well_known_parent, "root reference attached");
        }
        Ok(())
    }

    fn register_node_manager(&self, namespace: u16) -> Result<()> {
        let mut state = self.state.lock();
        if usize::from(namespace) >= state.namespaces.len() {
            return Err(SpaceError::Runtime(format!(
                "namespace {} is not registered",
                namespace
            )));
        }
        if !state.node_managers.contains(&namespace) {
            state.node_managers.push(namespace);
        }
        debug!(namespace, "node manager registered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_follow_the_server_table() {
        let runtime = LocalRuntime::new("urn:test:server");
        let index = runtime
            .register_namespace(&["urn:test:devices".to_owned()])
            .unwrap();
        assert_eq!(index, 2);
        let again = runtime
            .register_namespace(&["urn:test:devices".to_owned()])
            .unwrap();
        assert_eq!(again, 2);
        assert_eq!(runtime.namespaces().len(), 3);
        assert!(runtime.register_namespace(&[]).is_err());
    }

    #[test]
    fn only_the_objects_folder_accepts_root_references() {
        let runtime = LocalRuntime::default();
        let folder = NodeId::new(2, "Boilers");
        runtime
            .attach_root_reference(&folder, &NodeId::objects_folder())
            .unwrap();
        runtime
            .attach_root_reference(&folder, &NodeId::objects_folder())
            .unwrap();
        assert_eq!(runtime.root_references(&NodeId::objects_folder()), vec![folder.clone()]);
        assert!(matches!(
            runtime.attach_root_reference(&folder, &NodeId::numeric(0, 84)),
            Err(SpaceError::UnknownRootReference(_))
        ));
    }

    #[test]
    fn node_managers_need_a_known_namespace() {
        let runtime = LocalRuntime::default();
        assert!(runtime.register_node_manager(1).is_ok());
        let err = runtime.register_node_manager(7).unwrap_err();
        assert!(err.is_contract_violation());
        assert_eq!(runtime.node_managers(), vec![1]);
    }
}
