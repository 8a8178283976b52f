//! Parser and factory contracts.

use crate::node::Node;
use crate::render::{self, RenderedSql};
use sqlmapper_core::{Params, PlaceholderStyle, Result};
use std::fmt;
use std::sync::Arc;

/// A parsed SQL template that can be rendered any number of times.
///
/// Implementations are immutable once built, so one instance may be
/// rendered from many threads at once.
pub trait SqlParser: Send + Sync + fmt::Debug {
    /// Render with the given parameters.
    fn render(&self, params: &Params) -> Result<RenderedSql>;

    /// The SQL source this parser was built from.
    fn source(&self) -> &str;

    /// Name of the dialect that produced this parser.
    fn dialect(&self) -> &str;
}

/// Builds parsers for one SQL dialect.
///
/// A registry owns one factory per dialect; custom factories can be
/// injected in place of the standard ones.
pub trait ParserFactory: Send + Sync + fmt::Debug {
    /// Dialect name, used in logs and reported by the parsers it creates.
    fn dialect(&self) -> &str;

    /// Parse a single SQL source.
    fn create(&self, sql: &str) -> Result<Arc<dyn SqlParser>>;

    /// Parse a document holding zero or more named definitions.
    ///
    /// Either every definition is returned or an error is; ids are unique
    /// within the result.
    fn parse_document(&self, data: &str) -> Result<Vec<(String, Arc<dyn SqlParser>)>>;
}

/// The standard [`SqlParser`]: a compiled node tree.
#[derive(Debug, Clone)]
pub struct CompiledSql {
    source: String,
    nodes: Vec<Node>,
    placeholder: PlaceholderStyle,
    dialect: &'static str,
}

impl CompiledSql {
    pub(crate) fn new(
        source: impl Into<String>,
        nodes: Vec<Node>,
        placeholder: PlaceholderStyle,
        dialect: &'static str,
    ) -> Self {
        Self {
            source: source.into(),
            nodes,
            placeholder,
            dialect,
        }
    }

    /// The compiled tree.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn placeholder(&self) -> PlaceholderStyle {
        self.placeholder
    }
}

impl SqlParser for CompiledSql {
    fn render(&self, params: &Params) -> Result<RenderedSql> {
        let rendered = render::render(&self.nodes, params, self.placeholder)?;
        tracing::trace!(
            dialect = self.dialect,
            sql = %rendered.sql,
            binds = rendered.params.len(),
            "rendered sql"
        );
        Ok(rendered)
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn dialect(&self) -> &str {
        self.dialect
    }
}
