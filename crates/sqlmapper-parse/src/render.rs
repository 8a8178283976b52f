//! Rendering compiled nodes into SQL text plus ordered bind values.

use crate::node::{Foreach, Node, Segment};
use crate::scan::{block_comment_end, quoted_end};
use sqlmapper_core::params::descend;
use sqlmapper_core::{Params, PlaceholderStyle, RenderError, RenderErrorKind, Result, Value};

/// Final SQL and the values to bind to its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSql {
    pub sql: String,
    pub params: Vec<Value>,
}

impl RenderedSql {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Split into the SQL text and its bind values.
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }
}

/// Name resolution during a render: locals from `foreach` / `bind` shadow
/// caller parameters.
pub(crate) struct Scope<'p> {
    params: &'p Params,
    locals: Vec<(String, Value)>,
}

impl<'p> Scope<'p> {
    pub(crate) fn new(params: &'p Params) -> Self {
        Self {
            params,
            locals: Vec::new(),
        }
    }

    /// Resolve a dotted path; `None` when any step is missing.
    pub(crate) fn lookup(&self, path: &str) -> Option<Value> {
        let path = path.trim_start_matches('.');
        let mut segments = path.split('.');
        let head = segments.next()?;
        match self.locals.iter().rev().find(|(name, _)| name == head) {
            Some((_, local)) => descend(local, segments),
            None => descend(self.params.get(head)?, segments),
        }
    }

    fn push(&mut self, name: &str, value: Value) {
        self.locals.push((name.to_string(), value));
    }
}

/// Render `nodes` with `params`.
pub(crate) fn render(
    nodes: &[Node],
    params: &Params,
    placeholder: PlaceholderStyle,
) -> Result<RenderedSql> {
    let mut renderer = Renderer {
        scope: Scope::new(params),
        placeholder,
        binds: Vec::new(),
    };
    let raw = renderer.render_nodes(nodes)?;
    Ok(RenderedSql {
        sql: collapse_whitespace(&raw),
        params: renderer.binds,
    })
}

struct Renderer<'p> {
    scope: Scope<'p>,
    placeholder: PlaceholderStyle,
    binds: Vec<Value>,
}

impl Renderer<'_> {
    /// Render a node list; non-empty fragments are joined by one space.
    fn render_nodes(&mut self, nodes: &[Node]) -> Result<String> {
        let mut out = String::new();
        for node in nodes {
            let fragment = self.render_node(node)?;
            let fragment = fragment.trim();
            if fragment.is_empty() {
                continue;
            }
            if needs_space(&out, fragment) {
                out.push(' ');
            }
            out.push_str(fragment);
        }
        Ok(out)
    }

    fn render_node(&mut self, node: &Node) -> Result<String> {
        match node {
            Node::Text(segments) => self.render_text(segments),
            Node::If { test, body } => {
                if test.is_true(&self.scope) {
                    self.render_nodes(body)
                } else {
                    Ok(String::new())
                }
            }
            Node::Choose { whens, otherwise } => {
                for (test, body) in whens {
                    if test.is_true(&self.scope) {
                        return self.render_nodes(body);
                    }
                }
                match otherwise {
                    Some(body) => self.render_nodes(body),
                    None => Ok(String::new()),
                }
            }
            Node::Foreach(foreach) => self.render_foreach(foreach),
            Node::Trim(trim) => {
                let body = self.render_nodes(&trim.body)?;
                Ok(trim.apply(&body))
            }
            Node::Bind { name, expr } => {
                let value = expr.evaluate(&self.scope);
                self.scope.push(name, value);
                Ok(String::new())
            }
        }
    }

    fn render_text(&mut self, segments: &[Segment]) -> Result<String> {
        let mut out = String::new();
        for segment in segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Bind(path) => {
                    let value = self.resolve(path)?;
                    self.binds.push(value);
                    self.placeholder.write(&mut out, self.binds.len());
                }
                Segment::Literal(path) => {
                    let value = self.resolve(path)?;
                    let literal = value
                        .to_sql_literal()
                        .map_err(|err| err.with_parameter(path))?;
                    out.push_str(&literal);
                }
            }
        }
        Ok(out)
    }

    fn render_foreach(&mut self, foreach: &Foreach) -> Result<String> {
        let collection = self.resolve(&foreach.collection)?;
        let items = collection.elements().ok_or_else(|| RenderError {
            kind: RenderErrorKind::InvalidCollection,
            parameter: Some(foreach.collection.clone()),
            message: format!(
                "foreach collection '{}' is {}, not a sequence",
                foreach.collection,
                collection.type_name()
            ),
        })?;

        let mut parts = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let mark = self.scope.locals.len();
            self.scope.push(&foreach.item, item);
            if let Some(index_name) = &foreach.index {
                self.scope
                    .push(index_name, Value::BigInt(i64::try_from(index).unwrap_or(i64::MAX)));
            }
            let part = self.render_nodes(&foreach.body);
            self.scope.locals.truncate(mark);
            let part = part?;
            if !part.is_empty() {
                parts.push(part);
            }
        }
        if parts.is_empty() {
            return Ok(String::new());
        }

        let separator = pad_word_separator(&foreach.separator);
        let mut out = String::new();
        out.push_str(&foreach.open);
        out.push_str(&parts.join(&separator));
        out.push_str(&foreach.close);
        Ok(out)
    }

    fn resolve(&self, path: &str) -> Result<Value> {
        self.scope
            .lookup(path)
            .ok_or_else(|| RenderError::missing_parameter(path).into())
    }
}

/// No space after `(` or before `)` and `,`.
fn needs_space(left: &str, right: &str) -> bool {
    !left.is_empty() && !left.ends_with('(') && !right.starts_with([')', ','])
}

/// Keyword separators such as `OR` need surrounding spaces.
fn pad_word_separator(separator: &str) -> String {
    let trimmed = separator.trim();
    if trimmed.chars().next().is_some_and(char::is_alphanumeric) {
        format!(" {trimmed} ")
    } else {
        separator.to_string()
    }
}

/// Collapse whitespace runs outside quoted literals and block comments to
/// one space and trim.
pub(crate) fn collapse_whitespace(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut pending_space = false;
    let mut i = 0;
    while i < bytes.len() {
        let end = match bytes[i] {
            b'\'' | b'"' | b'`' => quoted_end(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => block_comment_end(sql, i),
            _ => {
                let Some(c) = sql[i..].chars().next() else {
                    break;
                };
                if c.is_whitespace() {
                    pending_space = true;
                    i += c.len_utf8();
                    continue;
                }
                i + c.len_utf8()
            }
        };
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push_str(&sql[i..end]);
        i = end;
    }
    out
}
