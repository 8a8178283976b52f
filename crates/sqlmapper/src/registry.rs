//! The two side-by-side SQL registries.

use crate::config::RegistryConfig;
use sqlmapper_core::Result;
use sqlmapper_parse::{ParserFactory, SqlManager, SqlParser};
use std::path::Path;
use std::sync::Arc;

/// Named SQL for one application.
///
/// Holds two isolated [`SqlManager`]s: one for raw dynamic SQL and mapper
/// documents, one for templates. An id registered in one is invisible to the
/// other.
///
/// Construct one registry during start-up, load it, and pass it to the code
/// that executes statements.
///
/// # Example
///
/// ```
/// use sqlmapper::{Params, SqlRegistry};
///
/// let registry = SqlRegistry::new();
/// registry.register_mapper_data(br#"
///     <mapper namespace="user">
///         <select id="find">SELECT * FROM users WHERE id = #{id}</select>
///     </mapper>"#)?;
///
/// let parser = registry.find_dynamic_sql_parser("user.find").expect("registered");
/// let rendered = parser.render(&Params::new().with("id", 1))?;
/// assert_eq!(rendered.sql, "SELECT * FROM users WHERE id = ?");
/// assert!(registry.find_template_sql_parser("user.find").is_none());
/// # Ok::<(), sqlmapper::Error>(())
/// ```
#[derive(Debug)]
pub struct SqlRegistry {
    dynamic: SqlManager,
    template: SqlManager,
}

impl Default for SqlRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlRegistry {
    /// Create an empty registry with the standard factories.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create an empty registry with the standard factories configured by
    /// `config`.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> SqlRegistryBuilder {
        SqlRegistryBuilder::new()
    }

    /// The raw dynamic SQL / mapper registry.
    pub fn dynamic(&self) -> &SqlManager {
        &self.dynamic
    }

    /// The template registry.
    pub fn template(&self) -> &SqlManager {
        &self.template
    }

    /// Register raw dynamic SQL under `id`, replacing any previous unit.
    pub fn register_sql(&self, id: &str, sql: &str) -> Result<()> {
        self.dynamic.register_sql(id, sql)
    }

    /// Remove dynamic SQL `id`; absent ids are ignored.
    pub fn unregister_sql(&self, id: &str) {
        self.dynamic.unregister_sql(id);
    }

    /// Register every statement of a mapper document.
    pub fn register_mapper_data(&self, data: &[u8]) -> Result<()> {
        self.dynamic.register_data(data)
    }

    /// Register every statement of a mapper file.
    pub fn register_mapper_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.dynamic.register_file(path)
    }

    pub fn find_dynamic_sql_parser(&self, id: &str) -> Option<Arc<dyn SqlParser>> {
        self.dynamic.find_sql_parser(id)
    }

    /// Register one template under `id`, replacing any previous unit.
    pub fn register_template_sql(&self, id: &str, sql: &str) -> Result<()> {
        self.template.register_sql(id, sql)
    }

    /// Remove template `id`; absent ids are ignored.
    pub fn unregister_template_sql(&self, id: &str) {
        self.template.unregister_sql(id);
    }

    /// Register every `{{define}}` of a template document.
    pub fn register_template_data(&self, data: &[u8]) -> Result<()> {
        self.template.register_data(data)
    }

    /// Register every `{{define}}` of a template file.
    pub fn register_template_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.template.register_file(path)
    }

    pub fn find_template_sql_parser(&self, id: &str) -> Option<Arc<dyn SqlParser>> {
        self.template.find_sql_parser(id)
    }
}

/// Builder for [`SqlRegistry`], with optional custom parser factories.
#[derive(Debug, Default)]
pub struct SqlRegistryBuilder {
    config: RegistryConfig,
    dynamic_factory: Option<Arc<dyn ParserFactory>>,
    template_factory: Option<Arc<dyn ParserFactory>>,
}

impl SqlRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the standard factories.
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `factory` for dynamic SQL and mapper documents.
    pub fn dynamic_factory(mut self, factory: Arc<dyn ParserFactory>) -> Self {
        self.dynamic_factory = Some(factory);
        self
    }

    /// Use `factory` for templates.
    pub fn template_factory(mut self, factory: Arc<dyn ParserFactory>) -> Self {
        self.template_factory = Some(factory);
        self
    }

    pub fn build(self) -> SqlRegistry {
        let dynamic = self
            .dynamic_factory
            .unwrap_or_else(|| Arc::new(self.config.dynamic_factory()));
        let template = self
            .template_factory
            .unwrap_or_else(|| Arc::new(self.config.template_factory()));
        tracing::debug!(
            dynamic = dynamic.dialect(),
            template = template.dialect(),
            "sql registry created"
        );
        SqlRegistry {
            dynamic: SqlManager::new(dynamic),
            template: SqlManager::new(template),
        }
    }
}
