//! Name to factory registries for pluggable strategies.

use std::collections::BTreeMap;

/// Builds a fresh plugin instance.
pub type Factory<T> = fn() -> Box<T>;

/// A typed map from plugin name to factory.
///
/// Registries are filled once at startup and only read afterwards.
pub struct PluginRegistry<T: ?Sized> {
    kind: &'static str,
    factories: BTreeMap<String, Factory<T>>,
}

impl<T: ?Sized> PluginRegistry<T> {
    /// Create an empty registry. `kind` names the plugin category in log output.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: BTreeMap::new(),
        }
    }

    /// Register a factory. Returns false (and keeps the old one) if the name is taken.
    pub fn register(&mut self, name: &str, factory: Factory<T>) -> bool {
        if self.factories.contains_key(name) {
            log::warn!("{} plugin \"{}\" is already registered", self.kind, name);
            return false;
        }
        log::debug!("Registered {} plugin \"{}\"", self.kind, name);
        self.factories.insert(name.to_string(), factory);
        true
    }

    pub fn has(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Look up the factory for `name`.
    pub fn factory(&self, name: &str) -> Option<Factory<T>> {
        self.factories.get(name).copied()
    }

    /// Instantiate the plugin registered as `name`.
    pub fn create(&self, name: &str) -> Option<Box<T>> {
        match self.factories.get(name) {
            Some(factory) => Some(factory()),
            None => {
                log::warn!("Unknown {} type: \"{}\"", self.kind, name);
                None
            }
        }
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
