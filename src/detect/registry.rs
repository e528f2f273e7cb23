use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::oracle::{BlockingOracle, OracleLimits};

/// Named detector backends, selectable from configuration.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes `&mut self`.
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

    pub fn get(&self, name: &str) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.backends.get(name).cloned()
    }

    pub fn default_backend(&self) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<_> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build an oracle around the named backend, or the default when `name` is `None`.
    pub fn oracle(&self, name: Option<&str>, limits: OracleLimits) -> Result<BlockingOracle> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self
                .default_name
                .clone()
                .ok_or_else(|| anyhow!("no detector backends registered"))?,
        };
        let backend = self.get(&name).ok_or_else(|| {
            anyhow!(
                "backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            )
        })?;
        Ok(BlockingOracle::from_shared(backend, name).with_limits(limits))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
