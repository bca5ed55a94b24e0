//! Pre/post invocation interceptors composed by extension order (§4.7,
//! C9): a static chain built per invoker from `ExtensionLoader<dyn
//! Filter>` activation matching.

pub mod builtins;
pub mod filter;

pub use {
    builtins::{
        AccessLogFilter, ContextFilter, ExceptionFilter, ExecutionLimitFilter, GenericFilter, MonitorFilter,
        TimeoutFilter, TokenValidationFilter, TpsLimitFilter,
    },
    filter::{build_chain, Filter},
};

use rpc_extension::{ActivateSpec, ExtensionLoader};

/// One process-wide loader with every built-in registered under its
/// canonical name and `@Activate` spec (§4.7); both sides — provider and
/// consumer — pull filters from this loader, distinguished by the `group`
/// passed to [`build_chain`].
pub fn default_loader() -> ExtensionLoader<dyn Filter> {
    let loader = ExtensionLoader::<dyn Filter>::new("Filter");

    loader.register_activate(
        "context",
        || std::sync::Arc::new(ContextFilter),
        ActivateSpec {
            groups: vec!["consumer"],
            url_keys: vec![],
            order: -300,
        },
    );
    loader.register_activate(
        "generic",
        || std::sync::Arc::new(GenericFilter),
        ActivateSpec {
            groups: vec!["provider", "consumer"],
            url_keys: vec![],
            order: -200,
        },
    );
    loader.register_activate(
        "token",
        || std::sync::Arc::new(TokenValidationFilter),
        ActivateSpec {
            groups: vec!["provider"],
            url_keys: vec!["token"],
            order: -100,
        },
    );
    loader.register_activate(
        "timeout",
        || std::sync::Arc::new(TimeoutFilter),
        ActivateSpec {
            groups: vec!["consumer"],
            url_keys: vec![],
            order: 0,
        },
    );
    loader.register_activate(
        "execution-limit",
        || std::sync::Arc::new(ExecutionLimitFilter::default()),
        ActivateSpec {
            groups: vec!["provider"],
            url_keys: vec!["executes"],
            order: 100,
        },
    );
    loader.register_activate(
        "tps-limit",
        || std::sync::Arc::new(TpsLimitFilter::default()),
        ActivateSpec {
            groups: vec!["provider"],
            url_keys: vec!["tps"],
            order: 100,
        },
    );
    loader.register_activate(
        "monitor",
        || std::sync::Arc::new(MonitorFilter::default()),
        ActivateSpec {
            groups: vec!["provider", "consumer"],
            url_keys: vec![],
            order: 200,
        },
    );
    loader.register_activate(
        "access-log",
        || std::sync::Arc::new(AccessLogFilter),
        ActivateSpec {
            groups: vec!["provider", "consumer"],
            url_keys: vec!["accesslog"],
            order: 300,
        },
    );
    loader.register_activate(
        "exception",
        || std::sync::Arc::new(ExceptionFilter),
        ActivateSpec {
            groups: vec!["provider"],
            url_keys: vec![],
            order: 400,
        },
    );

    loader
}
