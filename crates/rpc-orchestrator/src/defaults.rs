//! Provider/application/module default layering (§3, §4.9 step (a)): a
//! `ServiceDescriptor`/`ReferenceDescriptor` loaded from a `[service]` or
//! `[reference]` table only carries what that one table set explicitly
//! (plus `rpc-config`'s own field-level defaults); an application or module
//! can additionally supply registries and a default protocol that apply to
//! every descriptor that doesn't already name its own.

use rpc_config::{ProtocolConfig, ReferenceDescriptor, ServiceDescriptor};

#[derive(Debug, Clone, Default)]
pub struct OrchestratorDefaults {
    pub registries: Vec<rpc_url::Url>,
    pub protocols: Vec<ProtocolConfig>,
}

impl OrchestratorDefaults {
    /// Merges `module` over `application` (closer scope wins), then fills
    /// any gap `descriptor` itself left: registries/protocols are only
    /// filled in when the descriptor declared none of its own, matching
    /// the "explicit beats inherited" rule the rest of the config surface
    /// already follows (e.g. per-method overrides in
    /// [`rpc_config::ServiceDescriptor::timeout_for`]).
    pub fn merge(application: &OrchestratorDefaults, module: &OrchestratorDefaults) -> OrchestratorDefaults {
        OrchestratorDefaults {
            registries: if module.registries.is_empty() {
                application.registries.clone()
            } else {
                module.registries.clone()
            },
            protocols: if module.protocols.is_empty() {
                application.protocols.clone()
            } else {
                module.protocols.clone()
            },
        }
    }

    pub fn apply_to_service(&self, mut descriptor: ServiceDescriptor) -> ServiceDescriptor {
        if descriptor.registries.is_empty() {
            descriptor.registries = self.registries.clone();
        }
        if descriptor.protocols.is_empty() {
            descriptor.protocols = self.protocols.clone();
        }
        descriptor
    }

    pub fn apply_to_reference(&self, mut descriptor: ReferenceDescriptor) -> ReferenceDescriptor {
        if descriptor.registries.is_empty() {
            descriptor.registries = self.registries.clone();
        }
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_registries_win_over_application_ones() {
        let application = OrchestratorDefaults {
            registries: vec![rpc_url::Url::new("memory", "app-registry", 1)],
            protocols: vec![],
        };
        let module = OrchestratorDefaults {
            registries: vec![rpc_url::Url::new("memory", "module-registry", 2)],
            protocols: vec![],
        };
        let merged = OrchestratorDefaults::merge(&application, &module);
        assert_eq!(merged.registries[0].host(), "module-registry");
    }

    #[test]
    fn service_with_explicit_registries_is_left_untouched() {
        let defaults = OrchestratorDefaults {
            registries: vec![rpc_url::Url::new("memory", "default-registry", 1)],
            protocols: vec![],
        };
        let mut descriptor = ServiceDescriptor::new("Hello").with_method("greet");
        descriptor = descriptor.with_registry(rpc_url::Url::new("memory", "explicit-registry", 2));

        let resolved = defaults.apply_to_service(descriptor);
        assert_eq!(resolved.registries.len(), 1);
        assert_eq!(resolved.registries[0].host(), "explicit-registry");
    }

    #[test]
    fn service_without_registries_inherits_defaults() {
        let defaults = OrchestratorDefaults {
            registries: vec![rpc_url::Url::new("memory", "default-registry", 1)],
            protocols: vec![],
        };
        let descriptor = ServiceDescriptor::new("Hello").with_method("greet");
        let resolved = defaults.apply_to_service(descriptor);
        assert_eq!(resolved.registries[0].host(), "default-registry");
    }
}
