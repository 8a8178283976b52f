//! Registry of named SQL for one dialect.
//!
//! Lookups read an immutable snapshot of the id map. Writers are serialised
//! on a separate mutex, build a complete replacement map and swap it in, so a
//! reader sees either the old or the new set of units, never a mix. Batch
//! loads are parsed completely before the swap, which makes them
//! all-or-nothing.

use crate::markup::attach_sql_id;
use crate::parser::{ParserFactory, SqlParser};
use sqlmapper_core::{Error, MapperError, MapperErrorKind, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

/// One registered SQL definition.
#[derive(Debug, Clone)]
pub struct SqlUnit {
    id: String,
    parser: Arc<dyn SqlParser>,
}

impl SqlUnit {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The parsed form, shared with every caller that looked it up.
    pub fn parser(&self) -> &Arc<dyn SqlParser> {
        &self.parser
    }

    pub fn source(&self) -> &str {
        self.parser.source()
    }
}

type Units = HashMap<String, SqlUnit>;

/// Maps SQL ids to parsed templates of one dialect.
///
/// # Example
///
/// ```
/// use sqlmapper_core::Params;
/// use sqlmapper_parse::{DynamicParserFactory, SqlManager};
/// use std::sync::Arc;
///
/// let manager = SqlManager::new(Arc::new(DynamicParserFactory::new()));
/// manager.register_sql("user.find", "SELECT * FROM users WHERE id = #{id}")?;
///
/// let parser = manager.find_sql_parser("user.find").expect("registered");
/// let rendered = parser.render(&Params::new().with("id", 7))?;
/// assert_eq!(rendered.sql, "SELECT * FROM users WHERE id = ?");
/// # Ok::<(), sqlmapper_core::Error>(())
/// ```
#[derive(Debug)]
pub struct SqlManager {
    factory: Arc<dyn ParserFactory>,
    units: RwLock<Arc<Units>>,
    writer: Mutex<()>,
}

impl SqlManager {
    /// Create an empty registry that parses with `factory`.
    pub fn new(factory: Arc<dyn ParserFactory>) -> Self {
        Self {
            factory,
            units: RwLock::new(Arc::new(HashMap::new())),
            writer: Mutex::new(()),
        }
    }

    /// The factory used for every registration.
    pub fn factory(&self) -> &Arc<dyn ParserFactory> {
        &self.factory
    }

    /// Parse `sql` and register it under `id`, replacing any previous unit.
    pub fn register_sql(&self, id: &str, sql: &str) -> Result<()> {
        let parser = self
            .factory
            .create(sql)
            .map_err(|err| attach_sql_id(err, id))?;
        tracing::debug!(dialect = self.factory.dialect(), sql_id = id, "registered sql");
        self.update(|units| {
            insert_unit(units, self.factory.dialect(), id.to_string(), parser);
        });
        Ok(())
    }

    /// Remove `id`; absent ids are ignored.
    pub fn unregister_sql(&self, id: &str) {
        if !self.snapshot().contains_key(id) {
            return;
        }
        self.update(|units| {
            if units.remove(id).is_some() {
                tracing::debug!(dialect = self.factory.dialect(), sql_id = id, "unregistered sql");
            }
        });
    }

    /// Register every definition in a document.
    ///
    /// Nothing is registered when the document or any definition in it is
    /// malformed.
    pub fn register_data(&self, data: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(data).map_err(|err| {
            Error::Mapper(MapperError {
                source: Some(Box::new(err)),
                ..MapperError::new(MapperErrorKind::Document, "document is not valid UTF-8")
            })
        })?;
        let definitions = self.factory.parse_document(text)?;
        let count = definitions.len();
        self.update(|units| {
            for (id, parser) in definitions {
                insert_unit(units, self.factory.dialect(), id, parser);
            }
        });
        tracing::info!(dialect = self.factory.dialect(), count, "registered sql document");
        Ok(())
    }

    /// Read `path` and register every definition in it, as
    /// [`register_data`](Self::register_data).
    pub fn register_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|err| {
            Error::Mapper(MapperError {
                source: Some(Box::new(err)),
                ..MapperError::new(
                    MapperErrorKind::File,
                    format!("cannot read {}", path.display()),
                )
            })
        })?;
        tracing::debug!(dialect = self.factory.dialect(), path = %path.display(), "loading sql file");
        self.register_data(&data)
    }

    /// Look up the parsed form registered under `id`.
    pub fn find_sql_parser(&self, id: &str) -> Option<Arc<dyn SqlParser>> {
        self.snapshot().get(id).map(|unit| Arc::clone(&unit.parser))
    }

    /// Look up the whole unit registered under `id`.
    pub fn find_unit(&self, id: &str) -> Option<SqlUnit> {
        self.snapshot().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.snapshot().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.snapshot().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Source text registered under `id`.
    pub fn source(&self, id: &str) -> Option<String> {
        self.snapshot().get(id).map(|unit| unit.source().to_string())
    }

    fn snapshot(&self) -> Arc<Units> {
        Arc::clone(&self.units.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Apply `change` to a copy of the current map and publish the copy.
    fn update(&self, change: impl FnOnce(&mut Units)) {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = Units::clone(&self.snapshot());
        change(&mut next);
        *self.units.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
    }
}

fn insert_unit(units: &mut Units, dialect: &str, id: String, parser: Arc<dyn SqlParser>) {
    let unit = SqlUnit {
        id: id.clone(),
        parser,
    };
    if let Some(previous) = units.insert(id, unit) {
        tracing::warn!(dialect, sql_id = previous.id(), "replaced registered sql");
    }
}
