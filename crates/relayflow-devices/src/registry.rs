/*!
 * Registry of active modules.
 *
 * A module is active while its link is open. The bridge registers a module
 * when its link reports `Opened` and holds the returned [`Registration`]
 * until the link closes; dropping the registration removes the entry.
 */
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use tracing::debug;

use relayflow_core::logging::COMMS;

use crate::error::{DeviceError, Result};
use crate::module::ValidatedModule;
use crate::transport::ModuleLink;

/// A module with an open link
#[derive(Debug, Clone)]
pub struct ActiveModule {
    /// The validated module
    pub module: Arc<ValidatedModule>,
    /// Its link
    pub link: Arc<ModuleLink>,
}

/// Active modules by id
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, ActiveModule>>,
}

impl ModuleRegistry {
    /// Create a new, shareable module registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a module as active.
    ///
    /// The entry lives as long as the returned [`Registration`].
    pub fn register(
        self: &Arc<Self>,
        module: Arc<ValidatedModule>,
        link: Arc<ModuleLink>,
    ) -> Result<Registration> {
        let id = module.id().to_string();
        let mut modules = self.modules.write().map_err(|_| {
            DeviceError::Other("Failed to acquire write lock on module registry".to_string())
        })?;

        if modules.contains_key(&id) {
            return Err(DeviceError::Other(format!(
                "Module with ID {} already registered",
                id
            )));
        }

        modules.insert(id.clone(), ActiveModule { module, link });
        debug!(target: COMMS, "Registered module with ID {}", id);

        Ok(Registration {
            registry: Arc::downgrade(self),
            id,
        })
    }

    /// Get an active module by id
    pub fn get(&self, id: &str) -> Result<Option<ActiveModule>> {
        let modules = self.modules.read().map_err(|_| {
            DeviceError::Other("Failed to acquire read lock on module registry".to_string())
        })?;

        Ok(modules.get(id).cloned())
    }

    /// Get the ids of all active modules
    pub fn ids(&self) -> Result<Vec<String>> {
        let modules = self.modules.read().map_err(|_| {
            DeviceError::Other("Failed to acquire read lock on module registry".to_string())
        })?;

        let mut ids: Vec<String> = modules.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Count active modules
    pub fn count(&self) -> Result<usize> {
        let modules = self.modules.read().map_err(|_| {
            DeviceError::Other("Failed to acquire read lock on module registry".to_string())
        })?;

        Ok(modules.len())
    }

    fn unregister(&self, id: &str) {
        // A poisoned lock still holds a usable map.
        let mut modules = match self.modules.write() {
            Ok(modules) => modules,
            Err(poisoned) => poisoned.into_inner(),
        };
        if modules.remove(id).is_some() {
            debug!(target: COMMS, "Unregistered module with ID {}", id);
        }
    }
}

/// Keeps a module registered; the entry is removed on drop
#[derive(Debug)]
pub struct Registration {
    registry: Weak<ModuleRegistry>,
    id: String,
}

impl Registration {
    /// The registered module id
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Device};
    use crate::module::ModuleConfig;
    use crate::transport;
    use serde_json::json;

    fn module(id: &str) -> Arc<ValidatedModule> {
        let device: Device = serde_json::from_value(json!({
            "id": "R2", "size": 2,
            "protocols": [
                { "id": "usb", "channels": [ { "address": 0, "oncommand": "o{c}", "offcommand": "f{c}" } ] }
            ]
        }))
        .unwrap();
        let config = ModuleConfig {
            id: id.to_string(),
            device_id: "R2".to_string(),
            cstring: "usb:/dev/null".to_string(),
            channels: Vec::new(),
        };
        Arc::new(ValidatedModule::validate(&config, &Catalog::new(vec![device])).unwrap())
    }

    #[tokio::test]
    async fn test_registration_lifecycle() {
        let registry = ModuleRegistry::new();
        let m1 = module("m1");
        let (link, _events) = transport::connect(&m1);

        let registration = registry.register(m1.clone(), Arc::new(link)).unwrap();
        assert_eq!(registration.id(), "m1");
        assert_eq!(registry.count().unwrap(), 1);
        assert!(registry.get("m1").unwrap().is_some());
        assert!(registry.get("m2").unwrap().is_none());

        drop(registration);
        assert_eq!(registry.count().unwrap(), 0);
        assert!(registry.get("m1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let registry = ModuleRegistry::new();
        let m1 = module("m1");
        let (a, _ea) = transport::connect(&m1);
        let (b, _eb) = transport::connect(&m1);

        let _registration = registry.register(m1.clone(), Arc::new(a)).unwrap();
        assert!(registry.register(m1, Arc::new(b)).is_err());
        assert_eq!(registry.ids().unwrap(), vec!["m1".to_string()]);
    }

    #[tokio::test]
    async fn test_registration_outlives_registry() {
        let registry = ModuleRegistry::new();
        let m1 = module("m1");
        let (link, _events) = transport::connect(&m1);
        let registration = registry.register(m1, Arc::new(link)).unwrap();
        drop(registry);
        drop(registration);
    }
}
