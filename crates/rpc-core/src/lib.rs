//! Shared primitives used across the invocation pipeline: the stable error
//! taxonomy, the `Invocation`/`Result` data model, and the `Invoker`
//! capability trait that every layer (protocol, cluster, filter, proxy)
//! wraps.

pub mod error;
pub mod invocation;
pub mod invoker;
pub mod protocol;
pub mod result;
pub mod status;

pub use error::{ErrorKind, HasKind, RpcError};
pub use invocation::Invocation;
pub use invoker::{BoxInvoker, Invoker};
pub use protocol::{BoxExporter, BoxProtocol, Exporter, Protocol};
pub use result::RpcResult;
pub use status::{InvokeGuard, RpcStatusRegistry, StatusSnapshot};
