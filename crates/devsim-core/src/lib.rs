//! ---
//! devsim_section: "03-device-simulation"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Device factory, registry, simulation scheduler and coordinator."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
//! Simulated device address space.
//!
//! Device templates are stamped into the shared [`AddressSpace`] by the
//! [`DeviceRegistry`], each instance owning a disjoint identity range.
//! Simulated variables are driven by the [`SimulationScheduler`], and the
//! [`AddressSpaceCoordinator`] wires everything together at startup.

pub mod coordinator;
pub mod devices;
pub mod errors;
pub mod factory;
pub mod registry;
pub mod runtime;
pub mod service;
pub mod simulation;
pub mod space;
pub mod template;

pub use coordinator::{
    AddressSpaceCoordinator, BuildFailure, BuildReport, CoordinatorState, DeviceKindPlan,
    SpacePlan, TemplateSource,
};
pub use errors::{Result, SpaceError};
pub use factory::{remap_identities, BuiltInstance, InstanceFactory, MethodTable};
pub use registry::{DeviceRegistry, IdentityRange, InstanceHandle, OffsetAllocator};
pub use runtime::{LocalRuntime, ServerRuntime};
pub use service::{AttributeId, AttributeService, BrowseEntry};
pub use simulation::{
    FiringStats, SimulationBinding, SimulationRule, SimulationScheduler, ValueRule,
};
pub use space::{AddressSpace, BindingInfo, DeviceRecord, SpaceState};
pub use template::{
    Access, DeviceTemplate, JsonTemplateLoader, StaticTemplateLoader, TemplateDocument,
    TemplateNode,
};
