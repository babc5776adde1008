use crate::error::{GatewayError, GatewayResult};
use crate::tags::structures::TagDefinition;
use dashmap::DashMap; // Using DashMap for concurrent R/W access
use std::sync::Arc;

/// Name → definition map owned by a channel.
/// Addresses are not validated here; bad ones fail when the tag is read or written.
#[derive(Debug, Clone)] // Clone provides cheap Arc clones
pub struct TagRegistry {
    tags: Arc<DashMap<String, TagDefinition>>,
}

impl TagRegistry {
    pub fn new() -> Self {
        TagRegistry {
            tags: Arc::new(DashMap::new()),
        }
    }

    /// Add or replace a tag definition by name.
    pub fn add(&self, tag: TagDefinition) {
        self.tags.insert(tag.name.clone(), tag);
    }

    /// Returns whether a definition was removed.
    pub fn remove(&self, name: &str) -> bool {
        self.tags.remove(name).is_some()
    }

    pub fn resolve(&self, name: &str) -> GatewayResult<TagDefinition> {
        self.tags
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GatewayError::TagNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// Registered tag names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tags.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}
