//! Slug → backend operation mapping.

use std::collections::HashMap;

use crate::config::{EndpointConfig, EndpointScope};

/// Immutable lookup of configured endpoints.
#[derive(Debug, Default)]
pub struct EndpointCatalog {
    endpoints: HashMap<String, EndpointConfig>,
}

impl EndpointCatalog {
    pub fn new(endpoints: &[EndpointConfig]) -> Self {
        Self {
            endpoints: endpoints
                .iter()
                .map(|e| (e.slug.clone(), e.clone()))
                .collect(),
        }
    }

    /// The endpoint for `slug`, only if it has the expected scope.
    pub fn resolve(&self, slug: &str, scope: EndpointScope) -> Option<&EndpointConfig> {
        self.endpoints.get(slug).filter(|e| e.scope == scope)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
