use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::config::DetectionSettings;

use super::backend::DetectorBackend;
use super::backends::StubBackend;

/// Thread-safe registry of detector backends.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes `&mut self`.
/// Streams that share a backend (pooled detection) are serialized on that mutex; each
/// stream still keeps its own track store.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<Mutex<dyn DetectorBackend>>>,
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

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.backends.get(name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// List registered backends, sorted by name.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run `warm_up` on the default backend.
    pub fn warm_up_default(&self) -> Result<()> {
        let backend = self
            .default_backend()
            .ok_or_else(|| anyhow!("no detector backend registered"))?;
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("default backend lock poisoned"))?;
        guard.warm_up()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a registry from operator settings.
///
/// The stub backend is always registered; `settings.backend` selects the default.
pub fn registry_from_settings(settings: &DetectionSettings) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());

    match settings.backend.as_str() {
        "stub" => {}
        #[cfg(feature = "backend-tract")]
        "tract" => {
            let model_path = settings
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("tract backend requires a model path"))?;
            registry.register(super::backends::TractBackend::new(
                model_path,
                settings.model_input_size,
            )?);
        }
        #[cfg(not(feature = "backend-tract"))]
        "tract" => {
            return Err(anyhow!("tract backend requires the backend-tract feature"));
        }
        other => return Err(anyhow!("unknown detector backend '{}'", other)),
    }

    registry.set_default(&settings.backend)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::RawDetection;

    struct NamedBackend(&'static str);

    impl DetectorBackend for NamedBackend {
        fn name(&self) -> &'static str {
            self.0
        }

        fn detect(&mut self, _: &[u8], _: u32, _: u32) -> Result<Vec<RawDetection>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn first_registered_backend_is_default() {
        let mut registry = BackendRegistry::new();
        registry.register(NamedBackend("alpha"));
        registry.register(NamedBackend("beta"));

        assert_eq!(registry.default_name(), Some("alpha"));
        assert_eq!(registry.list(), vec!["alpha", "beta"]);

        registry.set_default("beta").unwrap();
        let backend = registry.default_backend().unwrap();
        assert_eq!(backend.lock().unwrap().name(), "beta");
    }

    #[test]
    fn set_default_rejects_unknown_backend() {
        let mut registry = BackendRegistry::new();
        registry.register(NamedBackend("alpha"));
        assert!(registry.set_default("missing").is_err());
    }

    #[test]
    fn settings_select_stub_backend() {
        let settings = DetectionSettings::default();
        let registry = registry_from_settings(&settings).unwrap();
        assert_eq!(registry.default_name(), Some("stub"));
        registry.warm_up_default().unwrap();
    }

    #[test]
    fn settings_reject_unknown_backend() {
        let settings = DetectionSettings {
            backend: "opencv".to_string(),
            ..DetectionSettings::default()
        };
        assert!(registry_from_settings(&settings).is_err());
    }
}
