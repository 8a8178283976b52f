//! Raw dynamic SQL: SQL text with inline `<if>`, `<foreach>`, ... directives.
//!
//! Only known directive tags are recognised; any other `<` (comparisons,
//! `<>`) is SQL text. Attribute values may use XML entities
//! (`test="a &lt; 5"`) or the raw characters.

use crate::markup::{self, Content, DIRECTIVES, Element};
use crate::node::Node;
use crate::parser::{CompiledSql, ParserFactory, SqlParser};
use crate::scan::{Origin, block_comment_end, quoted_end, scan_text};
use crate::xml;
use sqlmapper_core::{MapperError, PlaceholderStyle, Result, SourceLocation};
use std::sync::Arc;

/// Dialect name reported by dynamic parsers.
pub const DYNAMIC_DIALECT: &str = "dynamic";

/// Factory for raw dynamic SQL and XML mapper documents.
#[derive(Debug, Clone)]
pub struct DynamicParserFactory {
    placeholder: PlaceholderStyle,
    namespaced_ids: bool,
}

impl Default for DynamicParserFactory {
    fn default() -> Self {
        Self {
            placeholder: PlaceholderStyle::default(),
            namespaced_ids: true,
        }
    }
}

impl DynamicParserFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the placeholder style written into rendered SQL.
    pub fn placeholder(mut self, placeholder: PlaceholderStyle) -> Self {
        self.placeholder = placeholder;
        self
    }

    /// Register mapper statements as `namespace.id` (default) or bare `id`.
    pub fn namespaced_ids(mut self, namespaced: bool) -> Self {
        self.namespaced_ids = namespaced;
        self
    }
}

impl ParserFactory for DynamicParserFactory {
    fn dialect(&self) -> &str {
        DYNAMIC_DIALECT
    }

    fn create(&self, sql: &str) -> Result<Arc<dyn SqlParser>> {
        let nodes = parse_dynamic(sql)?;
        Ok(Arc::new(CompiledSql::new(
            sql,
            nodes,
            self.placeholder,
            DYNAMIC_DIALECT,
        )))
    }

    fn parse_document(&self, data: &str) -> Result<Vec<(String, Arc<dyn SqlParser>)>> {
        let statements = xml::parse_mapper(data, self.namespaced_ids)?;
        Ok(statements
            .into_iter()
            .map(|statement| {
                let parser: Arc<dyn SqlParser> = Arc::new(CompiledSql::new(
                    statement.source,
                    statement.nodes,
                    self.placeholder,
                    DYNAMIC_DIALECT,
                ));
                (statement.id, parser)
            })
            .collect())
    }
}

#[derive(Debug, PartialEq)]
enum TagKind {
    Open,
    Close,
    SelfClosing,
}

#[derive(Debug)]
struct Tag {
    name: &'static str,
    kind: TagKind,
    attributes: Vec<(String, String)>,
    end: usize,
}

/// Parse raw dynamic SQL into nodes.
pub(crate) fn parse_dynamic(source: &str) -> Result<Vec<Node>> {
    let bytes = source.as_bytes();
    let mut root: Vec<Content> = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => {
                i = quoted_end(bytes, i);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = block_comment_end(source, i);
                continue;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = source[i..].find('\n').map_or(bytes.len(), |n| i + n);
                continue;
            }
            b'<' => {
                if let Some(tag) = lex_tag(source, i)? {
                    let text = &source[text_start..i];
                    push_text(&mut root, &mut stack, text, Origin::new(source, text_start))?;
                    apply_tag(&mut root, &mut stack, tag.name, tag.kind, tag.attributes, source, i)?;
                    i = tag.end;
                    text_start = i;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    push_text(
        &mut root,
        &mut stack,
        &source[text_start..],
        Origin::new(source, text_start),
    )?;

    if let Some(open) = stack.pop() {
        return Err(open.error(format!("unclosed <{}>", open.name)).into());
    }
    markup::build_nodes(root)
}

fn current<'a>(root: &'a mut Vec<Content>, stack: &'a mut [Element]) -> &'a mut Vec<Content> {
    match stack.last_mut() {
        Some(open) => &mut open.children,
        None => root,
    }
}

fn push_text(
    root: &mut Vec<Content>,
    stack: &mut [Element],
    text: &str,
    origin: Origin<'_>,
) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    let segments = scan_text(text, origin, true)?;
    if !segments.is_empty() {
        current(root, stack).push(Content::Text(segments));
    }
    Ok(())
}

fn apply_tag(
    root: &mut Vec<Content>,
    stack: &mut Vec<Element>,
    name: &'static str,
    kind: TagKind,
    attributes: Vec<(String, String)>,
    source: &str,
    offset: usize,
) -> Result<()> {
    let location = SourceLocation::from_offset(source, offset);
    match kind {
        TagKind::Open | TagKind::SelfClosing => {
            let mut element = Element::new(name, location);
            element.attributes = attributes;
            if kind == TagKind::Open {
                stack.push(element);
            } else {
                current(root, stack).push(Content::Element(element));
            }
        }
        TagKind::Close => {
            let element = stack.pop().ok_or_else(|| {
                MapperError::syntax(format!("unexpected </{name}>"), location)
            })?;
            if element.name != name {
                return Err(MapperError::syntax(
                    format!(
                        "expected </{}> for <{}> at {}, found </{name}>",
                        element.name, element.name, element.location
                    ),
                    location,
                )
                .into());
            }
            current(root, stack).push(Content::Element(element));
        }
    }
    Ok(())
}

/// Try to read a directive tag at `start` (which holds `<`).
///
/// Returns `None` when the `<` does not begin a known directive.
fn lex_tag(source: &str, start: usize) -> Result<Option<Tag>> {
    let bytes = source.as_bytes();
    let closing = bytes.get(start + 1) == Some(&b'/');
    let name_start = start + if closing { 2 } else { 1 };
    let name_end = name_start
        + bytes[name_start..]
            .iter()
            .take_while(|b| b.is_ascii_alphabetic())
            .count();
    let Some(name) = DIRECTIVES
        .iter()
        .copied()
        .find(|d| *d == &source[name_start..name_end])
    else {
        return Ok(None);
    };
    match bytes.get(name_end) {
        Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => {}
        _ => return Ok(None),
    }

    let location = || SourceLocation::from_offset(source, start);
    let malformed = |what: &str| -> sqlmapper_core::Error {
        MapperError::syntax(format!("{what} in <{}{name}> tag", if closing { "/" } else { "" }), location())
            .into()
    };

    let mut i = name_end;
    let mut attributes = Vec::new();
    loop {
        while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
            i += 1;
        }
        match bytes.get(i) {
            None => return Err(malformed("unterminated tag")),
            Some(b'>') => {
                let kind = if closing { TagKind::Close } else { TagKind::Open };
                return Ok(Some(Tag { name, kind, attributes, end: i + 1 }));
            }
            Some(b'/') if !closing && bytes.get(i + 1) == Some(&b'>') => {
                return Ok(Some(Tag {
                    name,
                    kind: TagKind::SelfClosing,
                    attributes,
                    end: i + 2,
                }));
            }
            Some(_) if closing => return Err(malformed("unexpected content")),
            Some(_) => {
                let key_start = i;
                while bytes
                    .get(i)
                    .is_some_and(|b| b.is_ascii_alphanumeric() || matches!(*b, b'_' | b'-' | b':'))
                {
                    i += 1;
                }
                if i == key_start {
                    return Err(malformed("invalid attribute"));
                }
                let key = source[key_start..i].to_string();
                while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
                    i += 1;
                }
                if bytes.get(i) != Some(&b'=') {
                    return Err(malformed(&format!("attribute '{key}' without value")));
                }
                i += 1;
                while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
                    i += 1;
                }
                let quote = match bytes.get(i) {
                    Some(q @ (b'"' | b'\'')) => *q,
                    _ => return Err(malformed(&format!("attribute '{key}' must be quoted"))),
                };
                let value_start = i + 1;
                let value_end = bytes[value_start..]
                    .iter()
                    .position(|b| *b == quote)
                    .map(|n| value_start + n)
                    .ok_or_else(|| malformed(&format!("unterminated value for '{key}'")))?;
                let raw = &source[value_start..value_end];
                let value = quick_xml::escape::unescape(raw)
                    .map_err(|e| malformed(&format!("attribute '{key}': {e}")))?;
                attributes.push((key, value.into_owned()));
                i = value_end + 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlmapper_core::{Error, MapperErrorKind, Params, Value};

    fn render(sql: &str, params: &Params) -> (String, Vec<Value>) {
        DynamicParserFactory::new()
            .create(sql)
            .unwrap()
            .render(params)
            .unwrap()
            .into_parts()
    }

    #[test]
    fn test_if_with_named_bind() {
        let sql = "SELECT * FROM t WHERE 1=1 <if test=\"name != ''\">AND name = :name</if>";
        let (out, binds) = render(sql, &Params::new().with("name", "bob"));
        assert_eq!(out, "SELECT * FROM t WHERE 1=1 AND name = ?");
        assert_eq!(binds, vec![Value::Text("bob".into())]);

        let (out, binds) = render(sql, &Params::new().with("name", ""));
        assert_eq!(out, "SELECT * FROM t WHERE 1=1");
        assert!(binds.is_empty());
    }

    #[test]
    fn test_comparisons_stay_text() {
        let sql = "SELECT * FROM t WHERE a < #{max} AND b <> 0 AND c<d <where> <if test='x &lt; 3'>AND x = 1</if></where>";
        let (out, binds) = render(sql, &Params::new().with("max", 9).with("x", 1));
        assert_eq!(
            out,
            "SELECT * FROM t WHERE a < ? AND b <> 0 AND c<d WHERE x = 1"
        );
        assert_eq!(binds, vec![Value::Int(9)]);
    }

    #[test]
    fn test_foreach_and_choose() {
        let sql = r#"SELECT * FROM users
            <where>
              <choose>
                <when test="ids != null and len(ids) > 0">
                  id IN <foreach collection="ids" item="id" open="(" separator="," close=")">#{id}</foreach>
                </when>
                <otherwise>active = ${active}</otherwise>
              </choose>
            </where>"#;
        let (out, binds) = render(sql, &Params::new().with("ids", vec![1_i64, 2]));
        assert_eq!(out, "SELECT * FROM users WHERE id IN (?,?)");
        assert_eq!(binds, vec![Value::BigInt(1), Value::BigInt(2)]);

        let (out, binds) = render(sql, &Params::new().with("active", true));
        assert_eq!(out, "SELECT * FROM users WHERE active = TRUE");
        assert!(binds.is_empty());
    }

    #[test]
    fn test_set_and_bind() {
        let sql = "UPDATE t <set><if test=\"name != null\">name = #{name},</if><if test=\"age != null\">age = #{age},</if></set> \
                   <bind name=\"pattern\" value=\"name\"/> WHERE id = #{id}";
        let (out, binds) = render(sql, &Params::new().with("name", "amy").with("id", 4));
        assert_eq!(out, "UPDATE t SET name = ? WHERE id = ?");
        assert_eq!(binds, vec![Value::Text("amy".into()), Value::Int(4)]);
    }

    #[test]
    fn test_dollar_placeholders() {
        let factory = DynamicParserFactory::new().placeholder(PlaceholderStyle::Dollar);
        let parser = factory.create("SELECT * FROM t WHERE a = :a AND b = :b").unwrap();
        let out = parser.render(&Params::new().with("a", 1).with("b", 2)).unwrap();
        assert_eq!(out.sql, "SELECT * FROM t WHERE a = $1 AND b = $2");
        assert_eq!(parser.dialect(), DYNAMIC_DIALECT);
    }

    #[test]
    fn test_directives_inside_quotes_are_text() {
        let (out, _) = render("SELECT '<if test=\"x\">' AS s", &Params::new());
        assert_eq!(out, "SELECT '<if test=\"x\">' AS s");
    }

    #[test]
    fn test_comment_apostrophe_does_not_hide_directives() {
        let sql = "SELECT * /* don't scan */ FROM t WHERE 1=1 <if test=\"name != ''\">AND name = #{name}</if>";
        let (out, binds) = render(sql, &Params::new().with("name", "bob"));
        assert_eq!(out, "SELECT * /* don't scan */ FROM t WHERE 1=1 AND name = ?");
        assert_eq!(binds, vec![Value::Text("bob".into())]);

        let sql = "SELECT * FROM t /* <if test=\"x\"> */ WHERE id = :id";
        let (out, binds) = render(sql, &Params::new().with("id", 3));
        assert_eq!(out, "SELECT * FROM t /* <if test=\"x\"> */ WHERE id = ?");
        assert_eq!(binds, vec![Value::Int(3)]);
    }

    #[test]
    fn test_backslash_escaped_quote_keeps_binding() {
        let sql = r"SELECT * FROM t WHERE a = 'it\'s' AND b = #{b} <if test='b > 1'>AND c = :b</if>";
        let (out, binds) = render(sql, &Params::new().with("b", 2));
        assert_eq!(out, r"SELECT * FROM t WHERE a = 'it\'s' AND b = ? AND c = ?");
        assert_eq!(binds, vec![Value::Int(2), Value::Int(2)]);
    }

    #[test]
    fn test_unsafe_inline_values_are_rejected() {
        let parser = DynamicParserFactory::new()
            .create("SELECT * FROM t WHERE name = ${name}")
            .unwrap();
        for value in [Value::Text(r"\' OR 1=1 -- ".into()), Value::Decimal("NaN".into())] {
            match parser.render(&Params::new().with("name", value)) {
                Err(Error::Render(e)) => {
                    assert_eq!(e.kind, sqlmapper_core::RenderErrorKind::InvalidValue);
                    assert_eq!(e.parameter.as_deref(), Some("name"));
                }
                other => panic!("expected render error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_syntax_errors_carry_location() {
        let cases = [
            "SELECT *\nFROM t <if test=\"a\">x",
            "SELECT * FROM t </if>",
            "SELECT * <if test=\"a\"><where>x</if></where>",
            "SELECT * <if test=a>x</if>",
            "SELECT * <if test=\"a ==\">x</if>",
            "SELECT * <foreach item=\"i\">x</foreach>",
        ];
        for sql in cases {
            match DynamicParserFactory::new().create(sql) {
                Err(Error::Mapper(e)) => {
                    assert_eq!(e.kind, MapperErrorKind::Syntax, "{sql}");
                    assert!(e.location.is_some(), "{sql}");
                }
                other => panic!("expected syntax error for {sql:?}, got {other:?}"),
            }
        }

        match DynamicParserFactory::new().create("SELECT *\nFROM t <if test=\"a\">x") {
            Err(Error::Mapper(e)) => {
                assert_eq!(e.location, Some(SourceLocation { line: 2, column: 8 }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_parameter_at_render() {
        let parser = DynamicParserFactory::new()
            .create("SELECT * FROM t WHERE id = #{id}")
            .unwrap();
        let err = parser.render(&Params::new()).unwrap_err();
        assert_eq!(
            err.render_kind(),
            Some(sqlmapper_core::RenderErrorKind::MissingParameter)
        );
    }
}
