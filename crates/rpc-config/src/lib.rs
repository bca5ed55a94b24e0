//! Typed configuration surface (§3.1, §6.1, C13): the `ServiceDescriptor`/
//! `ReferenceDescriptor` document consumed by the orchestrator, the CLI
//! argument struct shared by the demo binaries, and the environment
//! variable / bind-address resolution chain of §4.9 and §6.

pub mod arguments;
pub mod descriptor;
pub mod env;

pub use arguments::Arguments;
pub use descriptor::{
    ConfigError, MethodConfig, ProtocolConfig, ReferenceDescriptor, Scope, ServiceDescriptor,
};
