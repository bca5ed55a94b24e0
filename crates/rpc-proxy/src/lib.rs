//! Interface-to-invoker and invoker-to-interface adaptation (§4.8, C10).
//! No bytecode generation or reflection (§4.8.1 redesign): a generic
//! untyped path plus a typed stub/dispatcher pair instead.

pub mod dispatcher;
pub mod generic;
pub mod stub;

pub use {dispatcher::{Dispatcher, Handler}, generic::GenericInvoker, stub::ServiceStub};
