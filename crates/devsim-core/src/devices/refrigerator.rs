//! ---
//! devsim_section: "03-device-simulation"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Device factory, registry, simulation scheduler and coordinator."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
use devsim_nodes::{Argument, DataType, MethodContext, StatusCode, Variant};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::template::{DeviceTemplate, TemplateNode};

pub const TEMPLATE: &str = "refrigerator";

pub const ACTUAL_TEMPERATURE: &str = "ActualTemperature";
pub const MOTOR_TEMPERATURE: &str = "MotorTemperature";
pub const COOLING_MOTOR_RUNNING: &str = "CoolingMotorRunning";
pub const DOOR_STATE: &str = "DoorState";
pub const SET_POINT_TEMPERATURE: &str = "SetPointTemperature";
pub const LIGHT_STATUS: &str = "LightStatus";
pub const STATE: &str = "State";
pub const OPEN_CLOSE_DOOR: &str = "OpenCloseDoor";

/// Template-relative identity of `ActualTemperature`.
pub const ACTUAL_TEMPERATURE_ID: u32 = 1;

const DOOR_ARGUMENT_DESCRIPTION: &str =
    "When Set False Door Shall Be Closed, When Set To True Shall Be Open.";

/// Seven variables and the door method under one object. `SetPointTemperature`
/// and `LightStatus` are Boolean attributes; the deployed namespace exposes
/// them that way.
pub fn template() -> Result<DeviceTemplate> {
    let root = TemplateNode::object(0, "Refrigerator")
        .with_child(TemplateNode::variable(ACTUAL_TEMPERATURE_ID, ACTUAL_TEMPERATURE, DataType::Double))
        .with_child(TemplateNode::variable(2, MOTOR_TEMPERATURE, DataType::Double))
        .with_child(TemplateNode::variable(3, COOLING_MOTOR_RUNNING, DataType::Boolean))
        .with_child(TemplateNode::variable(4, DOOR_STATE, DataType::Boolean))
        .with_child(TemplateNode::variable(5, SET_POINT_TEMPERATURE, DataType::Boolean))
        .with_child(TemplateNode::variable(6, LIGHT_STATUS, DataType::Boolean))
        .with_child(TemplateNode::variable(7, STATE, DataType::Boolean).with_initial(Variant::Boolean(true)))
        .with_child(
            TemplateNode::method(8, OPEN_CLOSE_DOOR).with_argument(Argument::new(
                DOOR_STATE,
                DOOR_ARGUMENT_DESCRIPTION,
                DataType::Boolean,
            )),
        );
    DeviceTemplate::new(TEMPLATE, root)
}

/// `OpenCloseDoor(open: Boolean)`: `true` opens the door, `false` closes it.
pub fn open_close_door(context: &mut MethodContext<'_>, arguments: &[Variant]) -> StatusCode {
    let open = match arguments {
        [] => return StatusCode::BadArgumentsMissing,
        [Variant::Boolean(open)] => *open,
        [_] => return StatusCode::BadInvalidArgument,
        _ => return StatusCode::BadTooManyArguments,
    };
    match context.set_child_value(DOOR_STATE, Variant::Boolean(open)) {
        Ok(()) => {
            debug!(device = %context.object, open, "door state changed");
            StatusCode::Good
        }
        Err(err) => {
            warn!(device = %context.object, error = %err, "failed to update door state");
            StatusCode::Bad
        }
    }
}
