//! Process-wide registry of named plug-ins for an SPI interface (§4.1, C3).
//!
//! Reflection- and annotation-driven wiring from the source system is
//! replaced per §4.1.1/§9 with explicit registration: a factory function is
//! registered under a name, decorators are registered as wrapper factories
//! applied in registration order, and adaptive dispatch is a small
//! tagged-variant lookup over URL parameters rather than a synthesized
//! class.

use {
    dashmap::DashMap,
    rpc_url::Url,
    std::{
        collections::HashSet,
        sync::{Arc, Mutex},
    },
    thiserror::Error,
};

pub type Factory<T> = fn() -> Arc<T>;
pub type WrapperFactory<T> = fn(Arc<T>) -> Arc<T>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtensionError {
    #[error("no extension named {0:?} for {1}")]
    NoExtension(String, &'static str),
    #[error("cycle in wrappers for {0}")]
    Cycle(&'static str),
    #[error("adaptive extension for {0} could not resolve a name from the url and has no default")]
    Unresolved(&'static str),
}

/// Criteria under which an extension participates in
/// [`ExtensionLoader::get_activate_extension`] even when the caller did not
/// name it explicitly (the redesign's stand-in for `@Activate`).
#[derive(Debug, Clone, Default)]
pub struct ActivateSpec {
    /// Empty means "any group" (e.g. "provider"/"consumer" side).
    pub groups: Vec<&'static str>,
    /// Empty means "always"; otherwise activates when any of these URL
    /// parameter keys is present.
    pub url_keys: Vec<&'static str>,
    /// Lower runs first; ties broken by name.
    pub order: i32,
}

impl ActivateSpec {
    fn matches(&self, url: &Url, group: &str) -> bool {
        let group_ok = self.groups.is_empty() || self.groups.contains(&group);
        let key_ok = self.url_keys.is_empty()
            || self.url_keys.iter().any(|k| url.parameter(k).is_some());
        group_ok && key_ok
    }
}

/// A cached, named-plug-in registry for SPI interface `T`. One instance per
/// interface; at most one constructed instance per (interface, name) pair.
pub struct ExtensionLoader<T: ?Sized + 'static> {
    interface_name: &'static str,
    default_name: Option<&'static str>,
    factories: DashMap<&'static str, Factory<T>>,
    wrappers: Mutex<Vec<WrapperFactory<T>>>,
    activates: DashMap<&'static str, ActivateSpec>,
    instances: DashMap<&'static str, Arc<T>>,
    resolving: Mutex<HashSet<&'static str>>,
}

impl<T: ?Sized + 'static> ExtensionLoader<T> {
    pub fn new(interface_name: &'static str) -> Self {
        Self {
            interface_name,
            default_name: None,
            factories: DashMap::new(),
            wrappers: Mutex::new(Vec::new()),
            activates: DashMap::new(),
            instances: DashMap::new(),
            resolving: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_default(mut self, name: &'static str) -> Self {
        self.default_name = Some(name);
        self
    }

    pub fn register(&self, name: &'static str, factory: Factory<T>) {
        self.factories.insert(name, factory);
    }

    pub fn register_activate(&self, name: &'static str, factory: Factory<T>, spec: ActivateSpec) {
        self.factories.insert(name, factory);
        self.activates.insert(name, spec);
    }

    /// Registers a decorator, applied to every extension built by this
    /// loader, in the order decorators were registered. This is the
    /// explicit stand-in for "class has a constructor taking the
    /// interface" (§4.1.1).
    pub fn register_wrapper(&self, wrapper: WrapperFactory<T>) {
        self.wrappers.lock().unwrap().push(wrapper);
    }

    pub fn default_name(&self) -> Option<&'static str> {
        self.default_name
    }

    /// Cached singleton, constructed then wrapped with every registered
    /// decorator in registration order (§4.1).
    pub fn get_extension(&self, name: &str) -> Result<Arc<T>, ExtensionError> {
        if let Some(existing) = self.instances.get(name) {
            return Ok(existing.clone());
        }

        let name: &'static str = *self
            .factories
            .get(name)
            .ok_or_else(|| ExtensionError::NoExtension(name.to_string(), self.interface_name))?
            .key();

        {
            let mut resolving = self.resolving.lock().unwrap();
            if !resolving.insert(name) {
                return Err(ExtensionError::Cycle(self.interface_name));
            }
        }
        let built = self.build(name);
        self.resolving.lock().unwrap().remove(name);
        let built = built?;

        // Another thread may have raced us; last-writer-wins, both are
        // equivalent instances so this is harmless to overwrite.
        self.instances.insert(name, built.clone());
        Ok(built)
    }

    fn build(&self, name: &'static str) -> Result<Arc<T>, ExtensionError> {
        let factory = *self
            .factories
            .get(name)
            .ok_or_else(|| ExtensionError::NoExtension(name.to_string(), self.interface_name))?;
        let mut instance = factory();
        for wrapper in self.wrappers.lock().unwrap().iter() {
            instance = wrapper(instance);
        }
        Ok(instance)
    }

    /// The ordered subset of extensions matching the comma-separated
    /// value list at `url[key]` (`-name` suppresses), unioned with any
    /// registered [`ActivateSpec`] that matches `group`/the URL (§4.1).
    pub fn get_activate_extension(
        &self,
        url: &Url,
        key: &str,
        group: &str,
    ) -> Result<Vec<Arc<T>>, ExtensionError> {
        let raw = url.parameter(key).unwrap_or("");
        let mut explicit = Vec::new();
        let mut suppressed = HashSet::new();
        for tok in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if let Some(suppressed_name) = tok.strip_prefix('-') {
                suppressed.insert(suppressed_name.to_string());
            } else {
                explicit.push(tok.to_string());
            }
        }
        let wildcard = explicit.iter().any(|n| n == "*");

        let mut seen = HashSet::new();
        let mut result = Vec::new();

        if !wildcard {
            for name in &explicit {
                if suppressed.contains(name) {
                    continue;
                }
                if seen.insert(name.clone()) {
                    result.push(self.get_extension(name)?);
                }
            }
        }

        let mut matched: Vec<(&'static str, i32)> = self
            .activates
            .iter()
            .filter(|entry| {
                let name = *entry.key();
                if suppressed.contains(name) || seen.contains(name) {
                    return false;
                }
                entry.value().matches(url, group)
            })
            .map(|entry| (*entry.key(), entry.value().order))
            .collect();
        matched.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));

        for (name, _) in matched {
            if seen.insert(name.to_string()) {
                result.push(self.get_extension(name)?);
            }
        }

        Ok(result)
    }
}

/// An extension whose concrete implementation is chosen at call time from
/// URL parameters (§4.1, "adaptive extension"). `url_keys` are tried in
/// order; the interface's default name is the fallback.
pub struct Adaptive<T: ?Sized + 'static> {
    loader: Arc<ExtensionLoader<T>>,
    url_keys: Vec<&'static str>,
}

impl<T: ?Sized + 'static> Adaptive<T> {
    pub fn new(loader: Arc<ExtensionLoader<T>>, url_keys: Vec<&'static str>) -> Self {
        Self { loader, url_keys }
    }

    pub fn resolve(&self, url: &Url) -> Result<Arc<T>, ExtensionError> {
        for key in &self.url_keys {
            if let Some(name) = url.parameter(key) {
                return self.loader.get_extension(name);
            }
        }
        let default_name = self
            .loader
            .default_name()
            .ok_or(ExtensionError::Unresolved(self.loader.interface_name))?;
        self.loader.get_extension(default_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct Polite;
    impl Greeter for Polite {
        fn greet(&self) -> String {
            "good day".into()
        }
    }

    struct Blunt;
    impl Greeter for Blunt {
        fn greet(&self) -> String {
            "hey".into()
        }
    }

    struct Shouting(Arc<dyn Greeter>);
    impl Greeter for Shouting {
        fn greet(&self) -> String {
            format!("{}!!!", self.0.greet())
        }
    }

    #[test]
    fn extension_is_a_cached_singleton() {
        let loader = ExtensionLoader::<dyn Greeter>::new("Greeter");
        loader.register("polite", || Arc::new(Polite));
        let a = loader.get_extension("polite").unwrap();
        let b = loader.get_extension("polite").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unknown_name_errors() {
        let loader = ExtensionLoader::<dyn Greeter>::new("Greeter");
        let err = loader.get_extension("nope").unwrap_err();
        assert!(matches!(err, ExtensionError::NoExtension(_, _)));
    }

    #[test]
    fn wrappers_apply_in_registration_order() {
        let loader = ExtensionLoader::<dyn Greeter>::new("Greeter");
        loader.register("blunt", || Arc::new(Blunt));
        loader.register_wrapper(|inner| Arc::new(Shouting(inner)));
        let ext = loader.get_extension("blunt").unwrap();
        assert_eq!(ext.greet(), "hey!!!");
    }

    #[test]
    fn adaptive_falls_back_to_default() {
        let loader = Arc::new(ExtensionLoader::<dyn Greeter>::new("Greeter").with_default("polite"));
        loader.register("polite", || Arc::new(Polite));
        loader.register("blunt", || Arc::new(Blunt));
        let adaptive = Adaptive::new(loader, vec!["greeter"]);

        let url_no_param = rpc_url::Url::new("rpc", "h", 1);
        assert_eq!(adaptive.resolve(&url_no_param).unwrap().greet(), "good day");

        let url_with_param = url_no_param.add_parameter("greeter", "blunt");
        assert_eq!(adaptive.resolve(&url_with_param).unwrap().greet(), "hey");
    }

    #[test]
    fn adaptive_without_default_or_param_is_unresolved() {
        let loader = Arc::new(ExtensionLoader::<dyn Greeter>::new("Greeter"));
        loader.register("polite", || Arc::new(Polite));
        let adaptive = Adaptive::new(loader, vec!["greeter"]);
        let err = adaptive
            .resolve(&rpc_url::Url::new("rpc", "h", 1))
            .unwrap_err();
        assert!(matches!(err, ExtensionError::Unresolved(_)));
    }

    #[test]
    fn get_activate_extension_combines_explicit_and_matched() {
        let loader = ExtensionLoader::<dyn Greeter>::new("Greeter");
        loader.register("blunt", || Arc::new(Blunt));
        loader.register_activate(
            "polite",
            || Arc::new(Polite),
            ActivateSpec {
                groups: vec!["provider"],
                url_keys: vec![],
                order: 0,
            },
        );
        let url = rpc_url::Url::new("rpc", "h", 1).add_parameter("filters", "blunt");
        let names: Vec<_> = loader
            .get_activate_extension(&url, "filters", "provider")
            .unwrap()
            .iter()
            .map(|g| g.greet())
            .collect();
        assert_eq!(names, vec!["hey".to_string(), "good day".to_string()]);
    }

    #[test]
    fn get_activate_extension_honors_suppression() {
        let loader = ExtensionLoader::<dyn Greeter>::new("Greeter");
        loader.register_activate(
            "polite",
            || Arc::new(Polite),
            ActivateSpec::default(),
        );
        let url = rpc_url::Url::new("rpc", "h", 1).add_parameter("filters", "-polite");
        let result = loader.get_activate_extension(&url, "filters", "provider").unwrap();
        assert!(result.is_empty());
    }
}
