//! ---
//! devsim_section: "01-core-functionality"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Shared configuration and logging primitives."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
//! Shared primitives for the devsim workspace: configuration loading and
//! tracing initialisation.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, DeviceKindConfig, IdentityConfig, LoadedAppConfig, LoggingConfig, RuleConfig,
    RuleKind, ServerConfig, SimulationConfig,
};
pub use logging::{init_tracing, LogFormat};
