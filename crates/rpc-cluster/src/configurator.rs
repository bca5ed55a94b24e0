//! Dynamic overrides (§4.6, registry `category=configurators`): a
//! configurator URL carries parameters to merge onto matching provider
//! URLs, applied last-wins in the order they were registered.

use rpc_url::Url;

/// One override entry. `host`/`application` narrow which provider URLs it
/// applies to; absent means "matches all".
#[derive(Debug, Clone)]
pub struct Configurator {
    host: Option<String>,
    application: Option<String>,
    overrides: Vec<(String, String)>,
}

impl Configurator {
    /// Parses a `category=configurators` registry URL: `host` and
    /// `application` parameters scope the match, every other parameter is
    /// an override to merge onto matching provider URLs.
    pub fn from_url(url: &Url) -> Self {
        let overrides = url
            .parameters()
            .iter()
            .filter(|(k, _)| k.as_str() != "host" && k.as_str() != "application" && k.as_str() != "category")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            host: url.parameter("host").map(str::to_string),
            application: url.parameter("application").map(str::to_string),
            overrides,
        }
    }

    fn applies_to(&self, provider: &Url) -> bool {
        if let Some(host) = &self.host {
            if host != provider.host() {
                return false;
            }
        }
        if let Some(application) = &self.application {
            if provider.parameter("application") != Some(application.as_str()) {
                return false;
            }
        }
        true
    }

    fn apply(&self, provider: Url) -> Url {
        if !self.applies_to(&provider) {
            return provider;
        }
        provider.add_parameters(self.overrides.iter().cloned())
    }
}

/// Applies every configurator in order, last-registered wins on any
/// parameter more than one configurator touches (§4.6).
pub fn apply_all(provider: Url, configurators: &[Configurator]) -> Url {
    configurators.iter().fold(provider, |url, cfg| cfg.apply(url))
}
