//! Tool infrastructure: the registry and the built-in catalog.
//!
//! The registry is static data: created once at startup and read by the
//! configuration store and the execution coordinator.

pub mod builtin;
pub mod catalog;

pub use builtin::{builtin_registry, builtin_tools};
pub use catalog::{ParamDef, ParamType, ToolDescriptor, ToolRegistry};
