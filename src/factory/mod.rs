//! Element factories: type name → instantiable stage.

pub mod metadata;

pub use metadata::{
    ElementConstructor, ElementMetadata, ElementMetadataFactory, ElementRegistration,
    ElementType, PropertyKind, PropertySchema,
};

#[doc(hidden)]
pub use inventory;

use std::collections::BTreeMap;

/// Registry of available element types
pub struct ElementFactoryRegistry {
    types: BTreeMap<String, ElementMetadata>,
}

impl ElementFactoryRegistry {
    pub fn new() -> Self {
        Self {
            types: BTreeMap::new(),
        }
    }

    /// Built-in elements plus every type submitted through
    /// `#[derive(StreamElement)]` anywhere in the final binary
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::elements::register_builtins(&mut registry);

        for registration in inventory::iter::<ElementRegistration> {
            let metadata = (registration.0)();
            if !registry.types.contains_key(&metadata.type_name) {
                registry.register_metadata(metadata);
            }
        }

        registry
    }

    pub fn register<T: ElementType>(&mut self) {
        self.register_metadata(T::metadata());
    }

    /// Registering a type name twice replaces the earlier entry
    pub fn register_metadata(&mut self, metadata: ElementMetadata) {
        log::trace!("Registering element type '{}'", metadata.type_name);
        self.types.insert(metadata.type_name.clone(), metadata);
    }

    pub fn lookup(&self, type_name: &str) -> Option<&ElementMetadata> {
        self.types.get(type_name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ElementMetadata> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for ElementFactoryRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
