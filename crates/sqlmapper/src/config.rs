//! Registry configuration.

use sqlmapper_core::PlaceholderStyle;
use sqlmapper_parse::{DynamicParserFactory, TemplateParserFactory};

/// Settings shared by the standard parser factories of a
/// [`SqlRegistry`](crate::SqlRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Placeholder style written into rendered SQL
    pub placeholder: PlaceholderStyle,
    /// Register mapper statements as `namespace.id` rather than bare `id`
    pub namespaced_ids: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            placeholder: PlaceholderStyle::Question,
            namespaced_ids: true,
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the placeholder style.
    pub fn placeholder(mut self, placeholder: PlaceholderStyle) -> Self {
        self.placeholder = placeholder;
        self
    }

    /// Enable/disable namespaced mapper ids.
    pub fn namespaced_ids(mut self, enabled: bool) -> Self {
        self.namespaced_ids = enabled;
        self
    }

    pub(crate) fn dynamic_factory(&self) -> DynamicParserFactory {
        DynamicParserFactory::new()
            .placeholder(self.placeholder)
            .namespaced_ids(self.namespaced_ids)
    }

    pub(crate) fn template_factory(&self) -> TemplateParserFactory {
        TemplateParserFactory::new().placeholder(self.placeholder)
    }
}
