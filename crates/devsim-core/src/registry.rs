//! ---
//! devsim_section: "03-device-simulation"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Device factory, registry, simulation scheduler and coordinator."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
//! Device registry and identity allocation.
//!
//! All operations take the locked [`SpaceState`], so allocation, commit and
//! binding happen in one critical section with the tree they modify.

use std::time::Duration;

use devsim_nodes::{NodeError, NodeId, NodeSet};
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::{Result, SpaceError};
use crate::factory::InstanceFactory;
use crate::simulation::{SimulationBinding, SimulationRule, SimulationScheduler};
use crate::space::{BindingInfo, DeviceRecord, SpaceState};
use crate::template::{DeviceTemplate, TemplateDocument};

/// Half-open block of identities `offset .. offset + stride` owned by one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct IdentityRange {
    offset: u32,
    stride: u32,
}

impl IdentityRange {
    pub(crate) fn new(offset: u32, stride: u32) -> Self {
        Self { offset, stride }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// One past the last identity; allocation guarantees this fits in `u32`.
    pub fn end(&self) -> u32 {
        self.offset + self.stride
    }

    pub fn contains(&self, identity: u32) -> bool {
        (self.offset..self.end()).contains(&identity)
    }

    pub fn overlaps(&self, other: &IdentityRange) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Monotonic identity-offset counter. Issued ranges are never reused, even
/// when the instance they were issued for fails to build.
#[derive(Debug, Clone)]
pub struct OffsetAllocator {
    base: u32,
    next: u32,
    issued: Vec<IdentityRange>,
}

impl OffsetAllocator {
    pub fn new(base: u32) -> Self {
        Self {
            base,
            next: base,
            issued: Vec::new(),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Offset the next call to [`OffsetAllocator::next_range`] will hand out.
    pub fn peek(&self) -> u32 {
        self.next
    }

    pub fn issued(&self) -> &[IdentityRange] {
        &self.issued
    }

    pub fn next_range(&mut self, stride: u32) -> Result<IdentityRange> {
        self.issue(self.next, stride)
    }

    /// Issue a caller-chosen range. Overlapping any issued range, or the
    /// reserved block below the base, violates the allocation contract.
    pub fn reserve(&mut self, offset: u32, stride: u32) -> Result<IdentityRange> {
        if offset < self.base {
            return Err(SpaceError::ReservedRange {
                offset,
                base: self.base,
            });
        }
        self.issue(offset, stride)
    }

    fn issue(&mut self, offset: u32, stride: u32) -> Result<IdentityRange> {
        if stride == 0 {
            return Err(SpaceError::StrideTooSmall {
                template: "<any>".to_owned(),
                stride,
                span: 1,
            });
        }
        offset
            .checked_add(stride)
            .ok_or(SpaceError::IdentityOverflow { offset, stride })?;
        let range = IdentityRange::new(offset, stride);
        if self.issued.iter().any(|issued| issued.overlaps(&range)) {
            return Err(SpaceError::OffsetCollision { offset, stride });
        }
        self.issued.push(range);
        self.next = self.next.max(range.end());
        Ok(range)
    }
}

/// Public description of a live device instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceHandle {
    pub name: String,
    pub template: String,
    pub root: NodeId,
    pub range: IdentityRange,
}

pub struct DeviceRegistry {
    factory: InstanceFactory,
}

impl DeviceRegistry {
    pub fn new(factory: InstanceFactory) -> Self {
        Self { factory }
    }

    pub fn namespace(&self) -> u16 {
        self.factory.namespace()
    }

    /// Organizer folder identified by its name; reused when it already exists.
    pub fn create_organizer(&mut self, space: &mut SpaceState, name: &str) -> Result<NodeId> {
        let id = self.factory.builder_mut().node_id(name);
        if space.nodes.contains(&id) {
            return Ok(id);
        }
        let id = self
            .factory
            .builder_mut()
            .folder(&mut space.nodes, None, name, name)?;
        debug!(folder = %id, "organizer folder created");
        Ok(id)
    }

    /// Allocate the next identity range, build the instance and attach it
    /// under `parent`.
    pub fn register_instance(
        &mut self,
        space: &mut SpaceState,
        template: &DeviceTemplate,
        parent: &NodeId,
        name: &str,
        stride: u32,
    ) -> Result<InstanceHandle> {
        self.precheck(space, template, parent, name, stride)?;
        let range = space.allocator.next_range(stride)?;
        self.commit(space, template, parent, name, range)
    }

    /// Same as [`DeviceRegistry::register_instance`] at a caller-chosen offset.
    pub fn register_instance_at(
        &mut self,
        space: &mut SpaceState,
        template: &DeviceTemplate,
        parent: &NodeId,
        name: &str,
        offset: u32,
        stride: u32,
    ) -> Result<InstanceHandle> {
        self.precheck(space, template, parent, name, stride)?;
        let range = space.allocator.reserve(offset, stride)?;
        self.commit(space, template, parent, name, range)
    }

    fn precheck(
        &self,
        space: &SpaceState,
        template: &DeviceTemplate,
        parent: &NodeId,
        name: &str,
        stride: u32,
    ) -> Result<()> {
        if space.devices.contains_key(name) {
            return Err(SpaceError::DuplicateInstance(name.to_owned()));
        }
        if !space.nodes.contains(parent) {
            return Err(NodeError::UnknownParent(parent.clone()).into());
        }
        template.ensure_fits(stride)
    }

    fn commit(
        &mut self,
        space: &mut SpaceState,
        template: &DeviceTemplate,
        parent: &NodeId,
        name: &str,
        range: IdentityRange,
    ) -> Result<InstanceHandle> {
        let built = self.factory.instantiate(template, name, range)?;
        let root = built.root.clone();
        graft(&mut space.nodes, built.nodes, &root, Some(parent), name)?;

        let handle = InstanceHandle {
            name: name.to_owned(),
            template: template.name().to_owned(),
            root,
            range,
        };
        space.devices.insert(
            name.to_owned(),
            DeviceRecord {
                handle: handle.clone(),
                binding: None,
            },
        );
        info!(
            instance = name,
            template = template.name(),
            root = %handle.root,
            offset = range.offset(),
            "device instance registered"
        );
        Ok(handle)
    }

    /// Resolve `rules` against the instance and start its recurring task.
    pub fn attach_simulation(
        &self,
        space: &mut SpaceState,
        scheduler: &mut SimulationScheduler,
        instance: &InstanceHandle,
        period: Duration,
        rules: &[SimulationRule],
    ) -> Result<()> {
        if period.is_zero() {
            return Err(SpaceError::InvalidPeriod(instance.name.clone()));
        }
        let record = space
            .devices
            .get(&instance.name)
            .ok_or_else(|| SpaceError::UnknownInstance(instance.name.clone()))?;
        if record.binding.is_some() {
            return Err(SpaceError::AlreadySimulated(instance.name.clone()));
        }

        let binding = SimulationBinding::resolve(&space.nodes, instance, period, rules)?;
        let info = BindingInfo {
            period,
            targets: binding.targets().cloned().collect(),
        };
        if let Some(record) = space.devices.get_mut(&instance.name) {
            record.binding = Some(info);
        }
        scheduler.spawn(binding);
        Ok(())
    }

    /// Attach predefined nodes from a static template document as roots of
    /// the address space. Their numeric identities must lie below the base
    /// offset.
    pub fn import_predefined(
        &mut self,
        space: &mut SpaceState,
        document: &TemplateDocument,
    ) -> Result<Vec<NodeId>> {
        let base = space.allocator.base();
        let mut roots = Vec::with_capacity(document.nodes.len());
        for shape in &document.nodes {
            if let Some(outside) = shape.walk().into_iter().find(|node| node.id >= base) {
                return Err(SpaceError::ReservedRange {
                    offset: outside.id,
                    base,
                });
            }
            let built = self.factory.import(shape)?;
            let root = built.root.clone();
            graft(&mut space.nodes, built.nodes, &root, None, &shape.name)?;
            info!(root = %root, name = %shape.name, "predefined nodes imported");
            roots.push(root);
        }
        Ok(roots)
    }
}

fn graft(
    target: &mut NodeSet,
    subtree: NodeSet,
    root: &NodeId,
    parent: Option<&NodeId>,
    instance: &str,
) -> Result<()> {
    target.graft(subtree, root, parent).map_err(|err| match err {
        NodeError::DuplicateIdentity(node) => SpaceError::IdentityCollision {
            instance: instance.to_owned(),
            node,
        },
        other => other.into(),
    })
}
