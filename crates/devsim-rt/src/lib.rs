//! ---
//! devsim_section: "01-core-functionality"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Runtime helpers supporting the simulation scheduler."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
//! Periodic scheduling helpers for the devsim runtime.

pub mod scheduling;

pub use scheduling::{RateLimiter, TaskSet};
