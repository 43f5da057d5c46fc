use crate::collectors::{
    AlivenessCollector,
    Collector,
    CollectorDeps,
    LocalMemoryCollector,
    MemoryCollector,
    OverviewCollector,
};
use std::{
    collections::BTreeMap,
    sync::Arc,
};

/// Builds a collector. Constructors only set up descriptor tables and apply
/// the configured exclusions.
pub type Constructor = fn(&CollectorDeps) -> eyre::Result<Arc<dyn Collector>>;

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("A collector named {0:?} is already registered")]
    Duplicate(String),
    #[error("No collector named {name:?} is registered (available: {available})")]
    Unknown { name: String, available: String },
    #[error("Failed to construct collector {name:?}: {reason}")]
    Construct { name: String, reason: eyre::Report },
}

/// Name to constructor map, filled once at startup.
#[derive(Default)]
pub struct CollectorRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every collector shipped with the exporter.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(AlivenessCollector::NAME, AlivenessCollector::construct)?;
        registry.register(MemoryCollector::NAME, MemoryCollector::construct)?;
        registry.register(LocalMemoryCollector::NAME, LocalMemoryCollector::construct)?;
        registry.register(OverviewCollector::NAME, OverviewCollector::construct)?;
        Ok(registry)
    }

    /// Registering a name twice is a configuration error.
    pub fn register(&mut self, name: &str, constructor: Constructor) -> Result<(), RegistryError> {
        if self.constructors.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        debug!(collector = name, "Registered collector");
        self.constructors.insert(name.to_string(), constructor);
        Ok(())
    }

    /// Registered names in sorted order.
    pub fn list_registered(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn instantiate(&self, name: &str, deps: &CollectorDeps) -> Result<Arc<dyn Collector>, RegistryError> {
        let constructor = self.constructors.get(name).ok_or_else(|| RegistryError::Unknown {
            name: name.to_string(),
            available: self.list_registered().join(", "),
        })?;
        let collector = constructor(deps).map_err(|reason| RegistryError::Construct {
            name: name.to_string(),
            reason,
        })?;
        info!(collector = name, metrics = collector.describe().len(), "Instantiated collector");
        Ok(collector)
    }

    /// Instantiates every collector in `names`, keeping their order.
    pub fn instantiate_all<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
        deps: &CollectorDeps,
    ) -> Result<Vec<Arc<dyn Collector>>, RegistryError> {
        names.into_iter().map(|name| self.instantiate(name, deps)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticStatsClient;
    use pretty_assertions::assert_eq;

    fn deps() -> CollectorDeps {
        CollectorDeps::new(Arc::new(StaticStatsClient::new()))
    }

    #[test]
    fn builtin_registers_every_collector() {
        let registry = CollectorRegistry::builtin().unwrap();
        assert_eq!(
            registry.list_registered(),
            vec!["aliveness", "memory", "memory_local", "overview"]
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = CollectorRegistry::builtin().unwrap();
        let err = registry
            .register(MemoryCollector::NAME, LocalMemoryCollector::construct)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(name) if name == "memory"));
        // The first constructor stays registered.
        let collector = registry.instantiate("memory", &deps()).unwrap();
        assert_eq!(collector.name(), "memory");
    }

    #[test]
    fn unknown_collector_lists_alternatives() {
        let registry = CollectorRegistry::builtin().unwrap();
        let err = registry.instantiate("queue", &deps()).err().unwrap();
        assert_eq!(
            err.to_string(),
            "No collector named \"queue\" is registered (available: aliveness, memory, memory_local, overview)"
        );
    }

    #[test]
    fn instantiate_applies_exclusions() {
        let registry = CollectorRegistry::builtin().unwrap();
        let full = registry.instantiate("memory", &deps()).unwrap();
        let reduced = registry
            .instantiate("memory", &deps().with_exclusions(["memory.code", "memory.atom"]))
            .unwrap();
        assert_eq!(reduced.describe().len(), full.describe().len() - 2);
        assert!(reduced.describe().iter().all(|d| d.key() != "memory.code"));
    }

    #[test]
    fn instantiate_all_keeps_order() {
        let registry = CollectorRegistry::builtin().unwrap();
        let collectors = registry.instantiate_all(["overview", "aliveness"], &deps()).unwrap();
        let names = collectors.iter().map(|c| c.name()).collect::<Vec<_>>();
        assert_eq!(names, vec!["overview", "aliveness"]);
    }
}
