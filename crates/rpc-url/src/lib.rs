//! The universal structured address (§3, C2): scheme, optional
//! credentials, host, port, path, and a parameter map. Immutable — every
//! mutating-looking method returns a new `Url`. Full-string and
//! service-key are derived fields, cached lazily on first access.

use {
    percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS},
    std::{collections::BTreeMap, sync::OnceLock},
    thiserror::Error,
};

/// Everything but alphanumerics and a small unreserved set gets escaped,
/// mirroring the permissive set commonly used for URL parameter values.
const PARAM_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlParseError {
    #[error("missing \"://\" in url {0:?}")]
    MissingScheme(String),
    #[error("invalid port in url {0:?}: {1}")]
    InvalidPort(String, String),
    #[error("duplicate parameter {0:?} in url {1:?}")]
    DuplicateParameter(String, String),
    #[error("malformed query parameter {0:?} in url {1:?}")]
    MalformedParameter(String, String),
}

#[derive(Clone, Default)]
struct Cache {
    full_string: String,
    service_key: String,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct Url {
    protocol: String,
    username: Option<String>,
    password: Option<String>,
    host: String,
    port: Option<u16>,
    path: Option<String>,
    params: BTreeMap<String, String>,
    cache: OnceLock<Cache>,
}

impl PartialEq for Url {
    fn eq(&self, other: &Self) -> bool {
        self.protocol == other.protocol
            && self.username == other.username
            && self.password == other.password
            && self.host == other.host
            && self.port == other.port
            && self.path == other.path
            && self.params == other.params
    }
}
impl Eq for Url {}

impl std::fmt::Display for Url {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_full_string())
    }
}

impl std::hash::Hash for Url {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.protocol.hash(state);
        self.username.hash(state);
        self.password.hash(state);
        self.host.hash(state);
        self.port.hash(state);
        self.path.hash(state);
        self.params.hash(state);
    }
}

impl Url {
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: protocol.into(),
            username: None,
            password: None,
            host: host.into(),
            port: Some(port),
            path: None,
            params: BTreeMap::new(),
            cache: OnceLock::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self.cache = OnceLock::new();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self.cache = OnceLock::new();
        self
    }

    /// Replaces the host, leaving everything else (including `port`)
    /// untouched. Used by the orchestrator (C11) to derive a
    /// registry-advertised URL from a bind URL when the two differ (NAT,
    /// binding on every interface but advertising one in particular).
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self.cache = OnceLock::new();
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self.cache = OnceLock::new();
        self
    }

    /// Returns a new `Url` with `key=value` set (overwriting any existing
    /// value for `key`). The receiver is left untouched.
    #[must_use]
    pub fn add_parameter(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut params = self.params.clone();
        params.insert(key.into(), value.into());
        Self {
            params,
            cache: OnceLock::new(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn add_parameters<I, K, V>(&self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = self.params.clone();
        for (k, v) in pairs {
            params.insert(k.into(), v.into());
        }
        Self {
            params,
            cache: OnceLock::new(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn remove_parameter(&self, key: &str) -> Self {
        let mut params = self.params.clone();
        params.remove(key);
        Self {
            params,
            cache: OnceLock::new(),
            ..self.clone()
        }
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn address(&self) -> String {
        match self.port {
            Some(p) => format!("{}:{p}", self.host),
            None => self.host.clone(),
        }
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn parameter_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.parameter(key).unwrap_or(default)
    }

    pub fn parameter_bool(&self, key: &str, default: bool) -> bool {
        self.parameter(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn parameter_u64(&self, key: &str, default: u64) -> u64 {
        self.parameter(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// `category` partitions the registry key space (§4.2 point 3).
    /// Absent `category` means `providers`.
    pub fn category(&self) -> &str {
        self.parameter_or("category", "providers")
    }

    /// `dynamic=false` URLs are persistent across backend session loss
    /// (§4.2 point 2); default is ephemeral (`true`).
    pub fn dynamic(&self) -> bool {
        self.parameter_bool("dynamic", true)
    }

    /// `check=false` swallows and retries registration failures instead
    /// of surfacing them (§4.2 point 1).
    pub fn check(&self) -> bool {
        self.parameter_bool("check", true)
    }

    pub fn interface(&self) -> Option<&str> {
        self.parameter("interface").or(self.path())
    }

    pub fn group(&self) -> Option<&str> {
        self.parameter("group")
    }

    pub fn version(&self) -> Option<&str> {
        self.parameter("version")
    }

    /// `[group/]interface[:version]`, the addressing unit at the registry.
    pub fn service_key(&self) -> &str {
        &self.cache().service_key
    }

    fn compute_service_key(&self) -> String {
        let mut key = String::new();
        if let Some(group) = self.group() {
            key.push_str(group);
            key.push('/');
        }
        key.push_str(self.interface().unwrap_or(""));
        if let Some(version) = self.version() {
            key.push(':');
            key.push_str(version);
        }
        key
    }

    fn cache(&self) -> &Cache {
        self.cache.get_or_init(|| Cache {
            full_string: self.compute_full_string(),
            service_key: self.compute_service_key(),
        })
    }

    pub fn to_full_string(&self) -> String {
        self.cache().full_string.clone()
    }

    fn compute_full_string(&self) -> String {
        let mut s = String::new();
        s.push_str(&self.protocol);
        s.push_str("://");
        if let Some(user) = &self.username {
            s.push_str(user);
            if let Some(pass) = &self.password {
                s.push(':');
                s.push_str(pass);
            }
            s.push('@');
        }
        s.push_str(&self.host);
        if let Some(port) = self.port {
            s.push(':');
            s.push_str(&port.to_string());
        }
        if let Some(path) = &self.path {
            s.push('/');
            s.push_str(path);
        }
        if !self.params.is_empty() {
            s.push('?');
            let mut first = true;
            for (k, v) in &self.params {
                if !first {
                    s.push('&');
                }
                first = false;
                s.push_str(&utf8_percent_encode(k, PARAM_ENCODE_SET).to_string());
                s.push('=');
                s.push_str(&utf8_percent_encode(v, PARAM_ENCODE_SET).to_string());
            }
        }
        s
    }

    /// Parses the textual form documented in §6. Duplicate parameter keys
    /// are rejected rather than silently overwritten, matching the data
    /// model's "duplicates disallowed" invariant.
    pub fn parse(raw: &str) -> Result<Self, UrlParseError> {
        let (protocol, rest) = raw
            .split_once("://")
            .ok_or_else(|| UrlParseError::MissingScheme(raw.to_string()))?;

        let (authority_and_path, query) = match rest.split_once('?') {
            Some((a, q)) => (a, Some(q)),
            None => (rest, None),
        };
        let (authority, path) = match authority_and_path.split_once('/') {
            Some((a, p)) => (a, Some(p.to_string())),
            None => (authority_and_path, None),
        };

        let (userinfo, host_port) = match authority.rsplit_once('@') {
            Some((u, h)) => (Some(u), h),
            None => (None, authority),
        };
        let (username, password) = match userinfo {
            Some(u) => match u.split_once(':') {
                Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
                None => (Some(u.to_string()), None),
            },
            None => (None, None),
        };

        let (host, port) = match host_port.rsplit_once(':') {
            Some((h, p)) => {
                let port = p
                    .parse::<u16>()
                    .map_err(|e| UrlParseError::InvalidPort(raw.to_string(), e.to_string()))?;
                (h.to_string(), Some(port))
            }
            None => (host_port.to_string(), None),
        };

        let mut params = BTreeMap::new();
        if let Some(query) = query {
            if !query.is_empty() {
                for pair in query.split('&') {
                    let (k, v) = pair.split_once('=').ok_or_else(|| {
                        UrlParseError::MalformedParameter(pair.to_string(), raw.to_string())
                    })?;
                    let k = percent_decode_str(k).decode_utf8_lossy().into_owned();
                    let v = percent_decode_str(v).decode_utf8_lossy().into_owned();
                    if params.insert(k.clone(), v).is_some() {
                        return Err(UrlParseError::DuplicateParameter(k, raw.to_string()));
                    }
                }
            }
        }

        Ok(Self {
            protocol: protocol.to_string(),
            username,
            password,
            host,
            port,
            path,
            params,
            cache: OnceLock::new(),
        })
    }

    /// `empty://` sentinel used to encode "category has no providers yet"
    /// (§4.2 point 4) — a category-present-but-empty notification is one
    /// URL with this protocol rather than zero URLs, so listeners can tell
    /// "not yet notified" from "notified, nothing there".
    pub fn empty(category: &str) -> Self {
        Self::new("empty", "0.0.0.0", 0).add_parameter("category", category)
    }

    pub fn is_empty_sentinel(&self) -> bool {
        self.protocol == "empty"
    }
}

impl serde::Serialize for Url {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_full_string())
    }
}

impl<'de> serde::Deserialize<'de> for Url {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Url::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_full_string() {
        let u = Url::new("rpc", "127.0.0.1", 20880)
            .with_path("com.example.Hello")
            .add_parameter("group", "g")
            .add_parameter("version", "1.0")
            .add_parameter("timeout", "3000");
        let s = u.to_full_string();
        let parsed = Url::parse(&s).unwrap();
        assert_eq!(u, parsed);
    }

    #[test]
    fn roundtrips_with_credentials_and_special_chars() {
        let u = Url::new("rpc", "host.example", 1)
            .with_credentials("alice", "p@ss")
            .add_parameter("note", "a b&c=d");
        let parsed = Url::parse(&u.to_full_string()).unwrap();
        assert_eq!(u, parsed);
    }

    #[test]
    fn service_key_combines_group_interface_version() {
        let u = Url::new("rpc", "h", 1)
            .with_path("com.example.Hello")
            .add_parameter("group", "g")
            .add_parameter("version", "1.0");
        assert_eq!(u.service_key(), "g/com.example.Hello:1.0");
    }

    #[test]
    fn service_key_without_group_or_version() {
        let u = Url::new("rpc", "h", 1).with_path("com.example.Hello");
        assert_eq!(u.service_key(), "com.example.Hello");
    }

    #[test]
    fn add_parameter_does_not_mutate_original() {
        let base = Url::new("rpc", "h", 1);
        let derived = base.add_parameter("k", "v");
        assert_eq!(base.parameter("k"), None);
        assert_eq!(derived.parameter("k"), Some("v"));
    }

    #[test]
    fn duplicate_parameter_is_rejected() {
        let err = Url::parse("rpc://h:1?k=1&k=2").unwrap_err();
        assert!(matches!(err, UrlParseError::DuplicateParameter(_, _)));
    }

    #[test]
    fn category_defaults_to_providers() {
        assert_eq!(Url::new("rpc", "h", 1).category(), "providers");
        assert_eq!(
            Url::new("rpc", "h", 1).add_parameter("category", "routers").category(),
            "routers"
        );
    }

    #[test]
    fn empty_sentinel_roundtrips() {
        let u = Url::empty("routers");
        assert!(u.is_empty_sentinel());
        assert_eq!(u.category(), "routers");
    }

    #[test]
    fn with_host_and_port_replace_only_those_fields() {
        let bind = Url::new("rpc", "0.0.0.0", 20880).with_path("com.example.Hello");
        let advertise = bind.clone().with_host("10.0.0.5").with_port(30000);
        assert_eq!(advertise.host(), "10.0.0.5");
        assert_eq!(advertise.port(), Some(30000));
        assert_eq!(advertise.path(), bind.path());
    }
}
