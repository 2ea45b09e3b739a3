//! ---
//! devsim_section: "03-device-simulation"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Device factory, registry, simulation scheduler and coordinator."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use devsim_nodes::{NodeId, NodeSet};
use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;

use crate::registry::{InstanceHandle, OffsetAllocator};

/// Simulation attached to a live instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingInfo {
    pub period: Duration,
    pub targets: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceRecord {
    pub handle: InstanceHandle,
    pub binding: Option<BindingInfo>,
}

/// Everything guarded by the address-space lock: the node tree, the identity
/// counter and the table of live instances.
#[derive(Debug)]
pub struct SpaceState {
    pub nodes: NodeSet,
    pub allocator: OffsetAllocator,
    pub devices: IndexMap<String, DeviceRecord>,
}

impl SpaceState {
    pub fn device(&self, name: &str) -> Option<&DeviceRecord> {
        self.devices.get(name)
    }
}

/// Shared handle to the single process-wide address space.
///
/// Structural changes, simulation firings and service reads all go through
/// [`AddressSpace::lock`]. The guard must never be held across an `.await`.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    inner: Arc<Mutex<SpaceState>>,
}

impl AddressSpace {
    pub fn new(base_offset: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SpaceState {
                nodes: NodeSet::new(),
                allocator: OffsetAllocator::new(base_offset),
                devices: IndexMap::new(),
            })),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SpaceState> {
        self.inner.lock()
    }

    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn instances(&self) -> Vec<InstanceHandle> {
        self.lock()
            .devices
            .values()
            .map(|record| record.handle.clone())
            .collect()
    }

    /// Serialize the whole tree while holding the lock once.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.lock().nodes)
    }
}
