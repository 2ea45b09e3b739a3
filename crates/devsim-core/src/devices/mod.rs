//! ---
//! devsim_section: "03-device-simulation"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Device factory, registry, simulation scheduler and coordinator."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
//! Built-in device kinds.

pub mod boiler;
pub mod refrigerator;

use std::sync::Arc;

use crate::errors::{Result, SpaceError};
use crate::factory::MethodTable;
use crate::template::DeviceTemplate;

pub fn builtin_template(name: &str) -> Result<DeviceTemplate> {
    match name {
        refrigerator::TEMPLATE => refrigerator::template(),
        boiler::TEMPLATE => boiler::template(),
        other => Err(SpaceError::UnknownTemplate(other.to_owned())),
    }
}

/// Handlers for every method declared by a built-in template.
pub fn builtin_methods() -> MethodTable {
    let mut table = MethodTable::new();
    table.register(refrigerator::OPEN_CLOSE_DOOR, Arc::new(refrigerator::open_close_door));
    table
}
