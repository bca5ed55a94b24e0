//! The CLI surface shared by the provider/consumer demo binaries (§6.1),
//! following the `#[clap(long, env)]` convention used throughout this
//! workspace's service binaries.

use std::{net::SocketAddr, path::PathBuf};

#[derive(Debug, clap::Parser)]
pub struct Arguments {
    /// Path to a TOML config document with `[service]`/`[reference]`
    /// tables (§6.1). CLI flags below override values loaded from it.
    #[clap(long, env)]
    pub config: Option<PathBuf>,

    #[clap(long, env, default_value = "0.0.0.0:20880")]
    pub bind_addr: SocketAddr,

    #[clap(long, env)]
    pub registry_url: Option<String>,

    #[clap(long, env, default_value = "info")]
    pub log_filter: String,

    #[clap(long, env, default_value = "error")]
    pub log_stderr_threshold: tracing::Level,
}
