//! Subscriber initialization. Binaries call [`init`] once, at the top of
//! `main`, with the two flags every service binary in this workspace takes:
//! a `tracing_subscriber::EnvFilter` directive string and the level above
//! which spans also get mirrored to stderr.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes the global tracing subscriber. Safe to call more than once
/// per process in tests; later calls are no-ops (`try_init` swallows the
/// "already set" error).
pub fn init(log_filter: &str, log_stderr_threshold: tracing::Level) {
    let env_filter = EnvFilter::try_new(log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::filter::LevelFilter::from_level(
            log_stderr_threshold,
        ));
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(stderr_layer)
        .try_init();
}
