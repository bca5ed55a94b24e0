//! Directory + router + load balancer + failure policy (§4.6, C8): turns
//! the set of provider URLs a reference sees at the registry into a
//! single [`rpc_core::Invoker`] a proxy can call through.

pub mod configurator;
pub mod directory;
pub mod error;
pub mod load_balance;
pub mod policy;
pub mod router;

pub use {
    configurator::Configurator,
    directory::{Directory, RegistryDirectory},
    error::ClusterError,
    load_balance::{ConsistentHash, LeastActive, LoadBalance, Random, RoundRobin},
    policy::{ClusterInvoker, FailurePolicy},
    router::{ConditionRouter, Router, ScriptRouter, TagRouter},
};
