use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;

/// Shared handle to a loaded detector.
pub type SharedBackend = Arc<Mutex<dyn DetectorBackend>>;

/// Registry of detector backends, keyed by backend name.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes `&mut self`.
pub struct BackendRegistry {
    backends: HashMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a backend by name (or the default) and run its warm-up hook.
    ///
    /// This is the model-load step: a failure here means the model is unavailable.
    pub fn load(&self, name: Option<&str>) -> Result<SharedBackend> {
        let backend = match name {
            Some(name) => self.get(name).ok_or_else(|| {
                anyhow!(
                    "backend '{}' not registered (available: {})",
                    name,
                    self.list().join(", ")
                )
            })?,
            None => self
                .default_backend()
                .ok_or_else(|| anyhow!("no detector backend registered"))?,
        };
        {
            let mut guard = backend
                .lock()
                .map_err(|_| anyhow!("backend lock poisoned"))?;
            guard.warm_up()?;
            log::info!("detector backend '{}' loaded", guard.name());
        }
        Ok(backend)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::Detection;

    struct Named(&'static str, bool);

    impl DetectorBackend for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn detect(&mut self, _pixels: &[u8], _w: u32, _h: u32) -> Result<Vec<Detection>> {
            Ok(Vec::new())
        }

        fn warm_up(&mut self) -> Result<()> {
            if self.1 {
                Ok(())
            } else {
                Err(anyhow!("weights missing"))
            }
        }
    }

    #[test]
    fn first_registered_is_default() -> Result<()> {
        let mut registry = BackendRegistry::new();
        registry.register(Named("a", true));
        registry.register(Named("b", true));
        assert_eq!(registry.list(), vec!["a", "b"]);

        let loaded = registry.load(None)?;
        assert_eq!(loaded.lock().unwrap().name(), "a");

        registry.set_default("b")?;
        assert_eq!(registry.load(None)?.lock().unwrap().name(), "b");
        assert!(registry.set_default("c").is_err());
        Ok(())
    }

    #[test]
    fn load_surfaces_warm_up_failure() {
        let mut registry = BackendRegistry::new();
        registry.register(Named("broken", false));
        assert!(registry.load(Some("broken")).is_err());
        assert!(registry.load(Some("missing")).is_err());
    }
}
