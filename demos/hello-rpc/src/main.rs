//! A self-contained walkthrough of the export → refer → invoke path (§8
//! scenario 1): exports `com.example.Hello#greet` on the transport
//! protocol, registers it at a registry, refers it back through that same
//! registry, and calls `greet` through the generic invocation path.
//!
//! Defaults to an in-process `memory://` registry, so a single run of this
//! binary is a complete demo with nothing else to start. Pass
//! `--registry-url coordinator://host:port` to point both the export and
//! the (separately run) consumer half of a real deployment at a shared
//! coordination service instead — this binary always does both halves in
//! one process, since the in-process registry only makes sense that way.

use {
    anyhow::Context,
    clap::Parser,
    rpc_config::{Arguments, ProtocolConfig, ReferenceDescriptor, ServiceDescriptor},
    rpc_core::{Invocation, RpcResult},
    rpc_orchestrator::Orchestrator,
    rpc_proxy::{Dispatcher, GenericInvoker},
    rpc_url::Url,
    std::{net::IpAddr, sync::Arc},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Arguments::parse();
    rpc_observe::init(&args.log_filter, args.log_stderr_threshold);

    let registry_url = match args.registry_url.as_deref() {
        Some(raw) => Url::parse(raw).context("parsing --registry-url")?,
        None => Url::new("memory", "hello-rpc-demo", 1),
    };

    // `0.0.0.0` is fine to bind on but not to dial back out to; advertise
    // the loopback address instead when the bind host is unspecified.
    let advertise_host = match args.bind_addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => "127.0.0.1".to_string(),
        ip => ip.to_string(),
    };

    let orchestrator = Orchestrator::new();

    let dispatcher = Arc::new(Dispatcher::new(
        "com.example.Hello",
        Url::new("rpc", advertise_host.clone(), args.bind_addr.port()).with_path("com.example.Hello"),
    ));
    dispatcher.register(
        "greet",
        Box::new(|invocation: Invocation| {
            Box::pin(async move {
                let name = invocation.arguments().first().and_then(|v| v.as_str()).unwrap_or("").to_string();
                RpcResult::value(serde_json::json!(format!("hello {name}")))
            })
        }),
    );

    let service = ServiceDescriptor::new("com.example.Hello")
        .with_method("greet")
        .with_protocol(ProtocolConfig {
            name: "rpc".into(),
            host: Some(advertise_host),
            port: Some(args.bind_addr.port()),
            ..ProtocolConfig::default()
        })
        .with_registry(registry_url.clone());

    let export = orchestrator.export(&service, dispatcher).await.context("exporting com.example.Hello")?;
    tracing::info!(addr = %args.bind_addr, "exported com.example.Hello");

    let reference = ReferenceDescriptor::new("com.example.Hello").with_registry(registry_url);
    let invoker = orchestrator.refer(&reference).await.context("referring com.example.Hello")?;
    let generic = GenericInvoker::new(invoker);

    let reply = generic
        .invoke("greet", vec!["String".into()], vec![serde_json::json!("world")])
        .await
        .context("invoking greet")?;
    println!("{reply}");

    generic.invoker().destroy();
    export.unexport_all();
    Ok(())
}
