//! ---
//! devsim_section: "03-device-simulation"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Device factory, registry, simulation scheduler and coordinator."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
use crate::errors::Result;
use crate::template::{DeviceTemplate, TemplateDocument};

pub const TEMPLATE: &str = "boiler";

/// Root node name of the boiler inside the static shape.
pub const ROOT: &str = "Boiler";

/// Static boiler shape shipped with the crate.
pub const SHAPE: &str = include_str!("../../templates/boiler.json");

pub fn template() -> Result<DeviceTemplate> {
    TemplateDocument::from_json(SHAPE)?.template(ROOT)
}
