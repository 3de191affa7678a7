//! Service registry
//!
//! Insertion-ordered catalog of [`ServiceDescriptor`] values. Built once at
//! startup from configuration, then only read. Insertion order matters: it
//! is the deterministic tie-break when two eviction candidates share a
//! priority.

use crate::config::ServiceEntry;
use crate::error::{Error, Result};
use crate::service::ServiceDescriptor;
use std::collections::HashMap;

/// Immutable, insertion-ordered catalog of managed services
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    order: Vec<String>,
    by_name: HashMap<String, ServiceDescriptor>,
}

impl ServiceRegistry {
    /// Build a registry from configuration entries, validating each one.
    pub fn from_entries(entries: Vec<ServiceEntry>) -> Result<Self> {
        let mut order = Vec::with_capacity(entries.len());
        let mut by_name = HashMap::with_capacity(entries.len());

        for entry in entries {
            let descriptor = entry.into_descriptor()?;
            if by_name.contains_key(&descriptor.name) {
                return Err(Error::config(format!(
                    "duplicate service name: {}",
                    descriptor.name
                )));
            }
            order.push(descriptor.name.clone());
            by_name.insert(descriptor.name.clone(), descriptor);
        }

        Ok(Self { order, by_name })
    }

    /// Look up a descriptor by name
    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.by_name.get(name)
    }

    /// Whether a service name is known
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All descriptors required by a pipeline phase, in insertion order
    pub fn for_phase(&self, phase: u32) -> Vec<&ServiceDescriptor> {
        self.all().filter(|d| d.in_phase(phase)).collect()
    }

    /// All descriptors in insertion order
    pub fn all(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.order.iter().map(|name| &self.by_name[name])
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_catalog;

    fn registry() -> ServiceRegistry {
        ServiceRegistry::from_entries(default_catalog()).unwrap()
    }

    #[test]
    fn test_lookup_by_name() {
        let registry = registry();
        assert_eq!(registry.len(), 4);
        assert!(registry.contains("comfyui"));
        assert_eq!(registry.get("ollama").unwrap().priority, 10);
        assert!(registry.get("whisper").is_none());
    }

    #[test]
    fn test_phase_lookup() {
        let registry = registry();

        let phase4: Vec<_> = registry.for_phase(4).iter().map(|d| d.name.as_str()).collect();
        assert_eq!(phase4, vec!["comfyui"]);

        let phase3: Vec<_> = registry.for_phase(3).iter().map(|d| d.name.as_str()).collect();
        assert_eq!(phase3, vec!["cosyvoice"]);

        // Phases with no GPU service are legal
        assert!(registry.for_phase(1).is_empty());
        assert!(registry.for_phase(5).is_empty());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let registry = registry();
        let names: Vec<_> = registry.all().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["comfyui", "cosyvoice", "vidi", "ollama"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut entries = default_catalog();
        let mut dup = entries[0].clone();
        dup.priority = 1;
        entries.push(dup);

        let err = ServiceRegistry::from_entries(entries).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
