use std::collections::HashMap;
use std::sync::Arc;

use crate::driver::DriverBundle;
use crate::error::DriverError;
use crate::fake::fake_driver;

/// Process-wide map from driver name to its singleton capability bundle.
///
/// Built once at startup; every task on every node using the same driver
/// shares the same `Arc<DriverBundle>`, so bundles must be reentrant.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<DriverBundle>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the baseline `fake` driver.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(fake_driver());
        registry
    }

    /// Register a bundle under its own name. Returns `&mut self` for chaining.
    pub fn register(&mut self, bundle: DriverBundle) -> &mut Self {
        self.drivers
            .insert(bundle.name().to_string(), Arc::new(bundle));
        self
    }

    /// Resolve a driver by name.
    pub fn get(&self, name: &str) -> Result<Arc<DriverBundle>, DriverError> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::DriverNotFound(name.to_string()))
    }

    /// All registered driver names, sorted. This list is what a conductor
    /// advertises in its fleet membership row.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.keys().cloned().collect();
        names.sort();
        names
    }
}
