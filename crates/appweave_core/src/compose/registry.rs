//! Ordered registry of composed apps.
//!
//! # Invariants
//! - Names are unique; a re-registered name replaces the earlier descriptor
//!   in place and keeps its original position.
//! - Iteration order is first-registration order.

use std::collections::BTreeMap;

use super::resolver::AppDescriptor;

/// Registration-ordered collection of app descriptors, unique by name.
#[derive(Debug)]
pub struct AppRegistry {
    order: Vec<AppDescriptor>,
    index: BTreeMap<String, usize>,
}

impl AppRegistry {
    pub(crate) fn from_descriptors(descriptors: Vec<AppDescriptor>) -> Self {
        let mut registry = Self {
            order: Vec::new(),
            index: BTreeMap::new(),
        };
        for descriptor in descriptors {
            registry.insert(descriptor);
        }
        registry
    }

    fn insert(&mut self, descriptor: AppDescriptor) {
        match self.index.get(&descriptor.name) {
            Some(&position) => self.order[position] = descriptor,
            None => {
                self.index
                    .insert(descriptor.name.clone(), self.order.len());
                self.order.push(descriptor);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&AppDescriptor> {
        self.index.get(name).map(|&position| &self.order[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &AppDescriptor> {
        self.order.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut AppDescriptor> {
        self.order.iter_mut()
    }

    /// App names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
