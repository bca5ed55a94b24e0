//! Environment-variable overrides (§6) and the bind host/port resolution
//! chain (§4.9): `env var > config host > provider host > detected local
//! address > first loopback-free address`. There is no Rust analogue of a
//! JVM system property, so that step of the original priority list is
//! folded into "config host".

use std::net::{IpAddr, SocketAddr, UdpSocket};

const GLOBAL_IP_TO_BIND: &str = "RPC_IP_TO_BIND";
const GLOBAL_PORT_TO_BIND: &str = "RPC_PORT_TO_BIND";
const GLOBAL_IP_TO_REGISTRY: &str = "RPC_IP_TO_REGISTRY";
const GLOBAL_PORT_TO_REGISTRY: &str = "RPC_PORT_TO_REGISTRY";

fn protocol_env(protocol: &str, suffix: &str) -> Option<String> {
    std::env::var(format!("{}_{suffix}", protocol.to_uppercase())).ok()
}

/// Host to bind a protocol's transport server on, per the priority chain
/// in §4.9: per-protocol env var, global env var, the config-supplied
/// host, the locally detected outbound address, then the first
/// loopback-free address this process can see.
pub fn resolve_bind_host(protocol: &str, configured_host: Option<&str>) -> String {
    if let Some(v) = protocol_env(protocol, "IP_TO_BIND") {
        return v;
    }
    if let Ok(v) = std::env::var(GLOBAL_IP_TO_BIND) {
        return v;
    }
    if let Some(host) = configured_host {
        return host.to_string();
    }
    detect_local_address().unwrap_or_else(|| "0.0.0.0".to_string())
}

/// Port to bind a protocol's transport server on, per the same chain with
/// `default_port` (the protocol's conventional default) as the final
/// fallback before giving up and letting the OS assign an ephemeral one.
pub fn resolve_bind_port(protocol: &str, configured_port: Option<u16>, default_port: u16) -> u16 {
    if let Some(v) = protocol_env(protocol, "PORT_TO_BIND").and_then(|v| v.parse().ok()) {
        return v;
    }
    if let Some(v) = std::env::var(GLOBAL_PORT_TO_BIND)
        .ok()
        .and_then(|v| v.parse().ok())
    {
        return v;
    }
    configured_port.unwrap_or(default_port)
}

/// Host a provider advertises at the registry, independent of the host it
/// physically binds on (useful behind NAT/port-forwarding).
pub fn resolve_registry_host(protocol: &str, bind_host: &str) -> String {
    protocol_env(protocol, "IP_TO_REGISTRY")
        .or_else(|| std::env::var(GLOBAL_IP_TO_REGISTRY).ok())
        .unwrap_or_else(|| bind_host.to_string())
}

pub fn resolve_registry_port(protocol: &str, bind_port: u16) -> u16 {
    protocol_env(protocol, "PORT_TO_REGISTRY")
        .and_then(|v| v.parse().ok())
        .or_else(|| {
            std::env::var(GLOBAL_PORT_TO_REGISTRY)
                .ok()
                .and_then(|v| v.parse().ok())
        })
        .unwrap_or(bind_port)
}

/// Finds the outbound address the OS routing table would pick for a
/// public destination, without sending any packet: UDP `connect` only
/// consults the routing table. Falls back to `None` (caller uses
/// `0.0.0.0`) if no route exists, e.g. in a fully offline sandbox.
fn detect_local_address() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let addr: SocketAddr = socket.local_addr().ok()?;
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => None,
        ip => Some(ip.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_host_wins_over_detection() {
        assert_eq!(resolve_bind_host("rpc", Some("10.0.0.5")), "10.0.0.5");
    }

    #[test]
    fn registry_host_defaults_to_bind_host() {
        assert_eq!(resolve_registry_host("rpc", "10.0.0.5"), "10.0.0.5");
    }

    #[test]
    fn configured_port_wins_over_default() {
        assert_eq!(resolve_bind_port("rpc", Some(9999), 20880), 9999);
        assert_eq!(resolve_bind_port("rpc", None, 20880), 20880);
    }
}
