//! The export/refer input documents (§3, §3.1, §6): constructed
//! programmatically via the builder methods below, or deserialized
//! one-to-one from a TOML document's `[service]` / `[reference]` /
//! `[[protocols]]` / `[[registries]]` tables (§6.1).

use {
    rpc_url::Url,
    std::{collections::HashMap, time::Duration},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("method override for {method:?} refers to a method not in the service's method list")]
    UnknownMethodOverride { method: String },
}

/// Export scope (§3): where an exported service is reachable from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    None,
    Local,
    #[default]
    Remote,
    Both,
}

/// Per-method policy override (§3.1). Absent fields fall back to the
/// service-level default at the point the orchestrator builds method
/// invokers, never silently dropped.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct MethodConfig {
    pub retries: Option<u32>,
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub oneway: bool,
}

/// One `[[protocols]]` entry (§6): `{name, host, port, threadpool, threads,
/// payload, serialization, codec}`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProtocolConfig {
    pub name: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(default = "default_threadpool")]
    pub threadpool: String,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_payload")]
    pub payload: usize,
    #[serde(default = "default_serialization")]
    pub serialization: String,
    #[serde(default = "default_codec")]
    pub codec: String,
}

fn default_threadpool() -> String {
    "fixed".into()
}
fn default_threads() -> usize {
    200
}
fn default_payload() -> usize {
    8 * 1024 * 1024
}
fn default_serialization() -> String {
    "json".into()
}
fn default_codec() -> String {
    "rpc".into()
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            name: default_codec(),
            host: None,
            port: None,
            threadpool: default_threadpool(),
            threads: default_threads(),
            payload: default_payload(),
            serialization: default_serialization(),
            codec: default_codec(),
        }
    }
}

/// Export input (§3): everything the orchestrator needs to turn a local
/// implementation into one or more registered, bound endpoints.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServiceDescriptor {
    pub interface: String,
    pub group: Option<String>,
    pub version: Option<String>,
    #[serde(default = "default_timeout")]
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_load_balance")]
    pub load_balance: String,
    #[serde(default = "default_cluster")]
    pub cluster: String,
    pub methods: Vec<String>,
    #[serde(default)]
    pub method_overrides: HashMap<String, MethodConfig>,
    #[serde(default)]
    pub registries: Vec<Url>,
    pub protocols: Vec<ProtocolConfig>,
    #[serde(default)]
    pub scope: Scope,
}

fn default_timeout() -> Duration {
    Duration::from_millis(1000)
}
fn default_retries() -> u32 {
    2
}
fn default_load_balance() -> String {
    "random".into()
}
fn default_cluster() -> String {
    "failover".into()
}

impl ServiceDescriptor {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            group: None,
            version: None,
            timeout: default_timeout(),
            retries: default_retries(),
            load_balance: default_load_balance(),
            cluster: default_cluster(),
            methods: Vec::new(),
            method_overrides: HashMap::new(),
            registries: Vec::new(),
            protocols: Vec::new(),
            scope: Scope::default(),
        }
    }

    #[must_use]
    pub fn with_method(mut self, name: impl Into<String>) -> Self {
        self.methods.push(name.into());
        self
    }

    #[must_use]
    pub fn with_registry(mut self, url: Url) -> Self {
        self.registries.push(url);
        self
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.protocols.push(protocol);
        self
    }

    /// Rejects overrides naming a method not in the declared method list
    /// (§3.1: "surfaced at load time, not at invoke time").
    pub fn validate(&self) -> Result<(), ConfigError> {
        for method in self.method_overrides.keys() {
            if !self.methods.iter().any(|m| m == method) {
                return Err(ConfigError::UnknownMethodOverride {
                    method: method.clone(),
                });
            }
        }
        Ok(())
    }

    /// Resolved retry count for `method`, falling back to the service
    /// default when no override (or an override without this field) is
    /// present.
    pub fn retries_for(&self, method: &str) -> u32 {
        self.method_overrides
            .get(method)
            .and_then(|m| m.retries)
            .unwrap_or(self.retries)
    }

    pub fn timeout_for(&self, method: &str) -> Duration {
        self.method_overrides
            .get(method)
            .and_then(|m| m.timeout)
            .unwrap_or(self.timeout)
    }
}

/// Reference input (§3): everything the orchestrator needs to build a
/// consumer-side directory/cluster/proxy for a remote interface.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReferenceDescriptor {
    pub interface: String,
    pub group: Option<String>,
    pub version: Option<String>,
    #[serde(default = "default_cluster")]
    pub cluster: String,
    #[serde(default = "default_load_balance")]
    pub load_balance: String,
    #[serde(default = "default_timeout")]
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_true")]
    pub check: bool,
    #[serde(default)]
    pub generic: bool,
    #[serde(default)]
    pub registries: Vec<Url>,
}

fn default_true() -> bool {
    true
}

impl ReferenceDescriptor {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            group: None,
            version: None,
            cluster: default_cluster(),
            load_balance: default_load_balance(),
            timeout: default_timeout(),
            retries: default_retries(),
            check: true,
            generic: false,
            registries: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, url: Url) -> Self {
        self.registries.push(url);
        self
    }
}

/// A whole config document's `[service]` / `[reference]` top-level tables
/// (§6.1); either may be absent, a provider-only or consumer-only process
/// sets just the one it needs.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ConfigDocument {
    pub service: Option<ServiceDescriptor>,
    pub reference: Option<ReferenceDescriptor>,
}

impl ConfigDocument {
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_override_falls_back_to_service_default() {
        let descriptor = ServiceDescriptor::new("Hello").with_method("greet");
        assert_eq!(descriptor.retries_for("greet"), default_retries());
    }

    #[test]
    fn validate_rejects_override_for_undeclared_method() {
        let mut descriptor = ServiceDescriptor::new("Hello").with_method("greet");
        descriptor
            .method_overrides
            .insert("vanish".into(), MethodConfig::default());
        assert!(matches!(
            descriptor.validate(),
            Err(ConfigError::UnknownMethodOverride { .. })
        ));
    }

    #[test]
    fn toml_document_round_trips() {
        let toml_src = r#"
            [service]
            interface = "Hello"
            methods = ["greet"]
            [[service.protocols]]
            name = "rpc"
            port = 20880
        "#;
        let doc: ConfigDocument = toml::from_str(toml_src).unwrap();
        let service = doc.service.unwrap();
        assert_eq!(service.interface, "Hello");
        assert_eq!(service.protocols[0].port, Some(20880));
    }
}
