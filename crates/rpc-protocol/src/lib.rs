//! Protocol (§4.5, C6): the seam between the invocation pipeline and the
//! network. A base transport-backed [`exporter::RpcProtocol`] does the
//! actual binding/connecting; [`wrapper::ProtocolFilterWrapper`] and
//! [`wrapper::ProtocolListenerWrapper`] decorate it with the filter chain
//! and export/unexport notifications; [`registry_protocol::RegistryProtocol`]
//! decorates it again with registry discovery. Callers compose these in
//! whatever order the deployment needs — the orchestrator (C11) is the
//! only crate that wires a concrete stack together.

pub mod error;
pub mod exporter;
pub mod registry_protocol;
pub mod remote_invoker;
pub mod service_registry;
pub mod wrapper;

pub use {
    error::ProtocolError,
    exporter::{RpcExporter, RpcProtocol},
    registry_protocol::RegistryProtocol,
    remote_invoker::RemoteInvoker,
    service_registry::ServiceRequestHandler,
    wrapper::{ExporterListener, ProtocolFilterWrapper, ProtocolListenerWrapper},
};
