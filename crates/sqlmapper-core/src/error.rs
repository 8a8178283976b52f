//! Error types for SQLMapper operations.

use std::fmt;

/// The primary error type for all SQLMapper operations.
#[derive(Debug)]
pub enum Error {
    /// Query execution errors
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Transaction lifecycle errors
    Transaction(TransactionError),
    /// Registration and parse errors for mapped SQL
    Mapper(MapperError),
    /// Errors raised while rendering a parsed template
    Render(RenderError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// The driver rejected a query issued through a connection or statement
    Statement,
    /// Any other failure reported by the driver
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// Commit or rollback requested before `begin`
    WithoutBegin,
    /// The driver failed to commit
    CommitFailed,
    /// The driver failed to roll back
    RollbackFailed,
    /// Already committed
    AlreadyCommitted,
    /// Already rolled back
    AlreadyRolledBack,
    /// Nested transaction not supported
    NestedNotSupported,
}

/// Line and column (both 1-based) inside a SQL source or mapper document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    /// Compute the location of a byte offset inside `source`.
    pub fn from_offset(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = &source.as_bytes()[..offset];
        let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = before
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i + 1);
        let column = String::from_utf8_lossy(&before[line_start..]).chars().count() + 1;
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug)]
pub struct MapperError {
    pub kind: MapperErrorKind,
    pub message: String,
    /// The SQL id being registered, when known
    pub sql_id: Option<String>,
    pub location: Option<SourceLocation>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperErrorKind {
    /// Malformed directive, block or expression
    Syntax,
    /// Malformed mapper or template document
    Document,
    /// The same id is defined twice in one batch
    DuplicateId,
    /// `<include refid>` names an unknown fragment
    UnknownInclude,
    /// Mapper file missing or unreadable
    File,
    /// No SQL registered under the requested id
    NotFound,
}

impl MapperError {
    /// Create a mapper error of the given kind.
    pub fn new(kind: MapperErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sql_id: None,
            location: None,
            source: None,
        }
    }

    /// Create a syntax error at `location`.
    pub fn syntax(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            location: Some(location),
            ..Self::new(MapperErrorKind::Syntax, message)
        }
    }

    /// Attach the SQL id this error belongs to, unless one is already set.
    pub fn with_sql_id(mut self, sql_id: impl Into<String>) -> Self {
        if self.sql_id.is_none() {
            self.sql_id = Some(sql_id.into());
        }
        self
    }
}

#[derive(Debug)]
pub struct RenderError {
    pub kind: RenderErrorKind,
    /// The parameter path involved, when applicable
    pub parameter: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderErrorKind {
    /// A bound or inlined reference names a parameter that was not supplied
    MissingParameter,
    /// `foreach` / `range` over a value that is not a sequence
    InvalidCollection,
    /// A value that has no safe inline SQL literal form
    InvalidValue,
}

impl RenderError {
    /// Error for a reference to a parameter that was not supplied.
    pub fn missing_parameter(path: &str) -> Self {
        Self {
            kind: RenderErrorKind::MissingParameter,
            parameter: Some(path.to_string()),
            message: format!("missing parameter '{path}'"),
        }
    }

    /// Error for a value that cannot be inlined as a literal.
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self {
            kind: RenderErrorKind::InvalidValue,
            parameter: None,
            message: message.into(),
        }
    }

    /// Attach the parameter path that produced the value.
    #[must_use]
    pub fn with_parameter(mut self, path: &str) -> Self {
        self.parameter.get_or_insert_with(|| path.to_string());
        self
    }
}

impl Error {
    /// SQLSTATE reported by the driver, if any.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// The SQL being executed when a query failed.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// Get the query error kind, if this is a query error.
    pub fn query_kind(&self) -> Option<QueryErrorKind> {
        match self {
            Error::Query(q) => Some(q.kind),
            _ => None,
        }
    }

    /// Get the transaction error kind, if this is a transaction error.
    pub fn transaction_kind(&self) -> Option<TransactionErrorKind> {
        match self {
            Error::Transaction(t) => Some(t.kind),
            _ => None,
        }
    }

    /// Get the mapper error kind, if this is a registration or lookup error.
    pub fn mapper_kind(&self) -> Option<MapperErrorKind> {
        match self {
            Error::Mapper(m) => Some(m.kind),
            _ => None,
        }
    }

    /// Get the render error kind, if this error was raised while rendering.
    pub fn render_kind(&self) -> Option<RenderErrorKind> {
        match self {
            Error::Render(r) => Some(r.kind),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Mapper(e) => write!(f, "Mapper error: {}", e),
            Error::Render(e) => write!(f, "Render error: {}", e.message),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Transaction(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Mapper(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for MapperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = &self.sql_id {
            write!(f, "[{}] ", id)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(location) = &self.location {
            write!(f, " at {}", location)?;
        }
        Ok(())
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<MapperError> for Error {
    fn from(err: MapperError) -> Self {
        Error::Mapper(err)
    }
}

impl From<RenderError> for Error {
    fn from(err: RenderError) -> Self {
        Error::Render(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for SQLMapper operations.
pub type Result<T> = std::result::Result<T, Error>;
