//! Process-wide observability plumbing (§1.1, §2 C12): a tracing subscriber
//! initializer mirroring the `log_filter`/`log_stderr_threshold` binary
//! convention, plus the shared Prometheus metric registries handed to the
//! exchange and registry layers.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::Metrics;
pub use tracing_setup::init;
