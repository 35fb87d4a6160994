//! Plugin registry - maps step types to their descriptors

use crate::error::{Error, Result};
use crate::plugin::PluginDescriptor;
use std::collections::BTreeMap;

/// Registry of known step types
///
/// Entries are unique by step type; registering a second plugin for the
/// same type is a configuration error.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    plugins: BTreeMap<String, PluginDescriptor>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from a set of descriptors
    pub fn with_plugins(descriptors: impl IntoIterator<Item = PluginDescriptor>) -> Result<Self> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Register a plugin
    pub fn register(&mut self, descriptor: PluginDescriptor) -> Result<()> {
        if self.plugins.contains_key(&descriptor.step_type) {
            return Err(Error::DuplicatePlugin(descriptor.step_type));
        }
        log::debug!(
            "Registered step type '{}' ({})",
            descriptor.step_type,
            descriptor.source
        );
        self.plugins.insert(descriptor.step_type.clone(), descriptor);
        Ok(())
    }

    /// Look up a step type
    pub fn get(&self, step_type: &str) -> Option<&PluginDescriptor> {
        self.plugins.get(step_type)
    }

    /// Look up a step type, failing with an error naming it
    pub fn resolve(&self, step_type: &str) -> Result<&PluginDescriptor> {
        self.get(step_type)
            .ok_or_else(|| Error::UnknownStepType(step_type.to_string()))
    }

    /// All descriptors, sorted by step type
    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.plugins.values()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StepContext;
    use crate::plugin::{Plugin, PluginSource};
    use crate::shape::Shape;

    #[derive(Debug)]
    struct Noop;

    impl Plugin for Noop {
        fn description(&self) -> String {
            "noop".into()
        }

        fn perform(&self, _ctx: &StepContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn noop(step_type: &str) -> PluginDescriptor {
        PluginDescriptor::builtin(step_type, Shape::Any, |_| Ok(Box::new(Noop)))
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = Registry::with_plugins([noop("folders"), noop("copy")]).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("copy").unwrap().source, PluginSource::Builtin);

        let types: Vec<_> = registry.iter().map(|d| d.step_type.as_str()).collect();
        assert_eq!(types, vec!["copy", "folders"]);
    }

    #[test]
    fn test_duplicate_is_rejected() {
        let mut registry = Registry::new();
        registry.register(noop("scripts")).unwrap();
        let err = registry.register(noop("scripts")).unwrap_err();
        assert!(matches!(err, Error::DuplicatePlugin(ref t) if t == "scripts"));
    }

    #[test]
    fn test_unknown_names_the_type() {
        let registry = Registry::new();
        let err = registry.resolve("apt-pakages").unwrap_err();
        assert_eq!(err.to_string(), "unknown step type 'apt-pakages'");
    }
}
