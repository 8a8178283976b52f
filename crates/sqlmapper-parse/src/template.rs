//! Text templates with `{{ }}` actions.
//!
//! | action | meaning |
//! |--------|---------|
//! | `{{name}}`, `{{.user.name}}` | bound parameter placeholder |
//! | `{{literal path}}` | escaped inline literal |
//! | `{{if expr}}` .. `{{else if expr}}` .. `{{else}}` .. `{{end}}` | conditional |
//! | `{{range item in path}}` .. `{{end}}` | loop, also `range item, i in path sep ", "` |
//! | `{{where}}` .. `{{end}}`, `{{set}}` .. `{{end}}` | clause trimming |
//! | `{{define "id"}}` .. `{{end}}` | named definition (documents only) |
//! | `{{/* comment */}}` | ignored |
//!
//! `{{-` and `-}}` are accepted; surrounding whitespace is normalised anyway.

use crate::expr::{Expr, ParseResult, identifier, keyword, path, quoted, ws};
use crate::markup::attach_sql_id;
use crate::node::{Foreach, Node, Segment, Trim};
use crate::parser::{CompiledSql, ParserFactory, SqlParser};
use crate::scan::{Origin, is_valid_path, push_text, scan_text};
use nom::{
    Finish,
    character::complete::char,
    combinator::{all_consuming, opt},
    sequence::{preceded, tuple},
};
use sqlmapper_core::{Error, MapperError, MapperErrorKind, PlaceholderStyle, Result, SourceLocation};
use std::collections::HashSet;
use std::sync::Arc;

/// Dialect name reported by template parsers.
pub const TEMPLATE_DIALECT: &str = "template";

/// Factory for `{{ }}` templates and `{{define}}` documents.
#[derive(Debug, Clone, Default)]
pub struct TemplateParserFactory {
    placeholder: PlaceholderStyle,
}

impl TemplateParserFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the placeholder style written into rendered SQL.
    pub fn placeholder(mut self, placeholder: PlaceholderStyle) -> Self {
        self.placeholder = placeholder;
        self
    }
}

impl ParserFactory for TemplateParserFactory {
    fn dialect(&self) -> &str {
        TEMPLATE_DIALECT
    }

    fn create(&self, sql: &str) -> Result<Arc<dyn SqlParser>> {
        let mut parser = TemplateParser::new(sql)?;
        let nodes = parser.parse_body()?;
        Ok(Arc::new(CompiledSql::new(
            sql,
            nodes,
            self.placeholder,
            TEMPLATE_DIALECT,
        )))
    }

    fn parse_document(&self, data: &str) -> Result<Vec<(String, Arc<dyn SqlParser>)>> {
        let mut parser = TemplateParser::new(data)?;
        let definitions = parser.parse_definitions()?;
        tracing::debug!(definitions = definitions.len(), "parsed template document");
        Ok(definitions
            .into_iter()
            .map(|(id, source, nodes)| {
                let parser: Arc<dyn SqlParser> = Arc::new(CompiledSql::new(
                    source,
                    nodes,
                    self.placeholder,
                    TEMPLATE_DIALECT,
                ));
                (id, parser)
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
enum Token<'a> {
    Text { text: &'a str, start: usize },
    Action { body: &'a str, start: usize, end: usize },
}

#[derive(Debug)]
enum Action {
    Define(String),
    If(Expr),
    ElseIf(Expr),
    Else,
    End,
    Range {
        item: String,
        index: Option<String>,
        collection: String,
        separator: String,
    },
    Where,
    Set,
    Literal(String),
    Value(String),
}

/// Split a template into text runs and actions.
fn tokenize(source: &str) -> Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    while let Some(found) = source[pos..].find("{{") {
        let open = pos + found;
        if open > pos {
            tokens.push(Token::Text {
                text: &source[pos..open],
                start: pos,
            });
        }
        let close = source[open + 2..]
            .find("}}")
            .map(|n| open + 2 + n)
            .ok_or_else(|| {
                MapperError::syntax(
                    "unterminated {{ action",
                    SourceLocation::from_offset(source, open),
                )
            })?;
        let mut body = &source[open + 2..close];
        if let Some(rest) = body.strip_prefix('-') {
            body = rest;
        }
        if let Some(rest) = body.strip_suffix('-') {
            body = rest;
        }
        let body = body.trim();
        let is_comment = body.starts_with("/*");
        if is_comment && !body.ends_with("*/") {
            return Err(MapperError::syntax(
                "unterminated comment action",
                SourceLocation::from_offset(source, open),
            )
            .into());
        }
        if !is_comment {
            tokens.push(Token::Action {
                body,
                start: open,
                end: close + 2,
            });
        }
        pos = close + 2;
    }
    if pos < source.len() {
        tokens.push(Token::Text {
            text: &source[pos..],
            start: pos,
        });
    }
    Ok(tokens)
}

fn range_header(input: &str) -> ParseResult<'_, (&str, Option<&str>, String, Option<String>)> {
    tuple((
        ws(identifier),
        opt(preceded(ws(char(',')), ws(identifier))),
        preceded(ws(keyword("in")), ws(path)),
        opt(preceded(ws(keyword("sep")), ws(quoted))),
    ))(input)
}

fn classify(body: &str, location: SourceLocation) -> Result<Action> {
    let syntax = |message: String| -> Error { MapperError::syntax(message, location).into() };
    let expression = |src: &str, what: &str| -> Result<Expr> {
        Expr::parse(src).map_err(|message| syntax(format!("{{{{{what}}}}}: {message}")))
    };

    let (word, rest) = match body.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (body, ""),
    };
    match word {
        "define" => {
            let name = all_consuming(ws(quoted))(rest)
                .finish()
                .map(|(_, name)| name)
                .map_err(|_| syntax(format!("{{{{define}}}} expects a quoted name, found '{rest}'")))?;
            Ok(Action::Define(name))
        }
        "if" => Ok(Action::If(expression(rest, "if")?)),
        "else" if rest.is_empty() => Ok(Action::Else),
        "else" => match rest.split_once(char::is_whitespace) {
            Some(("if", cond)) => Ok(Action::ElseIf(expression(cond.trim(), "else if")?)),
            _ => Err(syntax(format!("unexpected '{{{{else {rest}}}}}'"))),
        },
        "end" if rest.is_empty() => Ok(Action::End),
        "where" if rest.is_empty() => Ok(Action::Where),
        "set" if rest.is_empty() => Ok(Action::Set),
        "range" => {
            let (item, index, collection, separator) = all_consuming(range_header)(rest)
                .finish()
                .map(|(_, header)| header)
                .map_err(|_| {
                    syntax(format!(
                        "{{{{range}}}} expects 'item[, index] in path [sep \"..\"]', found '{rest}'"
                    ))
                })?;
            Ok(Action::Range {
                item: item.to_string(),
                index: index.map(str::to_string),
                collection,
                separator: separator.unwrap_or_default(),
            })
        }
        "literal" if is_valid_path(rest.trim_start_matches('.')) => {
            Ok(Action::Literal(rest.trim_start_matches('.').to_string()))
        }
        _ if rest.is_empty() && is_valid_path(body.trim_start_matches('.')) => {
            Ok(Action::Value(body.trim_start_matches('.').to_string()))
        }
        _ => Err(syntax(format!("unknown action '{{{{{body}}}}}'"))),
    }
}

struct TemplateParser<'a> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
}

/// How a block ended.
enum Terminator {
    Eof,
    End { start: usize, end: usize },
    Else { location: SourceLocation },
    ElseIf { test: Expr, location: SourceLocation },
}

impl<'a> TemplateParser<'a> {
    fn new(source: &'a str) -> Result<Self> {
        Ok(Self {
            source,
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    fn location(&self, offset: usize) -> SourceLocation {
        SourceLocation::from_offset(self.source, offset)
    }

    /// A whole template body; `define` is not allowed here.
    fn parse_body(&mut self) -> Result<Vec<Node>> {
        let (nodes, terminator) = self.parse_block()?;
        match terminator {
            Terminator::Eof => Ok(nodes),
            Terminator::End { start, .. } => {
                Err(MapperError::syntax("unexpected {{end}}", self.location(start)).into())
            }
            Terminator::Else { location } | Terminator::ElseIf { location, .. } => {
                Err(MapperError::syntax("{{else}} outside {{if}}", location).into())
            }
        }
    }

    /// A document of `{{define "id"}}..{{end}}` blocks.
    fn parse_definitions(&mut self) -> Result<Vec<(String, String, Vec<Node>)>> {
        let mut definitions = Vec::new();
        let mut seen = HashSet::new();
        while let Some(token) = self.tokens.get(self.pos).copied() {
            self.pos += 1;
            match token {
                Token::Text { text, start } => {
                    if !text.trim().is_empty() {
                        return Err(document_error(
                            "text outside {{define}}",
                            self.location(start),
                        ));
                    }
                }
                Token::Action { body, start, .. } => {
                    let location = self.location(start);
                    let Action::Define(id) = classify(body, location)? else {
                        return Err(document_error(
                            format!("expected {{{{define}}}}, found '{{{{{body}}}}}'"),
                            location,
                        ));
                    };
                    if !seen.insert(id.clone()) {
                        return Err(MapperError {
                            location: Some(location),
                            ..MapperError::new(
                                MapperErrorKind::DuplicateId,
                                format!("duplicate id '{id}'"),
                            )
                        }
                        .with_sql_id(id.as_str())
                        .into());
                    }
                    let (nodes, terminator) =
                        self.parse_block().map_err(|e| attach_sql_id(e, &id))?;
                    let end = match terminator {
                        Terminator::End { end, .. } => end,
                        Terminator::Eof => {
                            return Err(MapperError::syntax("unclosed {{define}}", location)
                                .with_sql_id(id.as_str())
                                .into());
                        }
                        Terminator::Else { location } | Terminator::ElseIf { location, .. } => {
                            return Err(MapperError::syntax("{{else}} outside {{if}}", location)
                                .with_sql_id(id.as_str())
                                .into());
                        }
                    };
                    let source = self.source[start..end].to_string();
                    definitions.push((id, source, nodes));
                }
            }
        }
        Ok(definitions)
    }

    /// Parse nodes until `{{end}}`, `{{else}}`, `{{else if}}` or end of input.
    fn parse_block(&mut self) -> Result<(Vec<Node>, Terminator)> {
        let mut nodes: Vec<Node> = Vec::new();
        while let Some(token) = self.tokens.get(self.pos).copied() {
            self.pos += 1;
            match token {
                Token::Text { text, start } => {
                    let segments = scan_text(text, Origin::new(self.source, start), false)?;
                    extend_text(&mut nodes, segments);
                }
                Token::Action { body, start, end } => {
                    let location = self.location(start);
                    match classify(body, location)? {
                        Action::Value(path) => extend_text(&mut nodes, vec![Segment::Bind(path)]),
                        Action::Literal(path) => {
                            extend_text(&mut nodes, vec![Segment::Literal(path)]);
                        }
                        Action::If(test) => nodes.push(self.parse_if(test, location)?),
                        Action::Range {
                            item,
                            index,
                            collection,
                            separator,
                        } => {
                            let body = self.parse_until_end("range", location)?;
                            nodes.push(Node::Foreach(Foreach {
                                collection,
                                item,
                                index,
                                open: String::new(),
                                close: String::new(),
                                separator,
                                body,
                            }));
                        }
                        Action::Where => {
                            let body = self.parse_until_end("where", location)?;
                            nodes.push(Node::Trim(Trim::where_clause(body)));
                        }
                        Action::Set => {
                            let body = self.parse_until_end("set", location)?;
                            nodes.push(Node::Trim(Trim::set_clause(body)));
                        }
                        Action::End => return Ok((nodes, Terminator::End { start, end })),
                        Action::Else => return Ok((nodes, Terminator::Else { location })),
                        Action::ElseIf(test) => {
                            return Ok((nodes, Terminator::ElseIf { test, location }));
                        }
                        Action::Define(_) => {
                            return Err(MapperError::syntax(
                                "{{define}} is only allowed at the top level of a document",
                                location,
                            )
                            .into());
                        }
                    }
                }
            }
        }
        Ok((nodes, Terminator::Eof))
    }

    fn parse_until_end(&mut self, what: &str, location: SourceLocation) -> Result<Vec<Node>> {
        let (body, terminator) = self.parse_block()?;
        match terminator {
            Terminator::End { .. } => Ok(body),
            Terminator::Eof => {
                Err(MapperError::syntax(format!("unclosed {{{{{what}}}}}"), location).into())
            }
            Terminator::Else { location } | Terminator::ElseIf { location, .. } => Err(
                MapperError::syntax(format!("{{{{else}}}} inside {{{{{what}}}}}"), location).into(),
            ),
        }
    }

    fn parse_if(&mut self, mut test: Expr, location: SourceLocation) -> Result<Node> {
        let mut whens = Vec::new();
        loop {
            let (body, terminator) = self.parse_block()?;
            whens.push((test, body));
            match terminator {
                Terminator::End { .. } => break,
                Terminator::ElseIf { test: next, .. } => test = next,
                Terminator::Else { location: else_at } => {
                    let otherwise = self.parse_until_end("else", else_at)?;
                    return Ok(Node::Choose {
                        whens,
                        otherwise: Some(otherwise),
                    });
                }
                Terminator::Eof => {
                    return Err(MapperError::syntax("unclosed {{if}}", location).into());
                }
            }
        }
        if whens.len() == 1 {
            let (test, body) = whens.remove(0);
            return Ok(Node::If { test, body });
        }
        Ok(Node::Choose {
            whens,
            otherwise: None,
        })
    }
}

/// Append segments, merging into a preceding text node.
fn extend_text(nodes: &mut Vec<Node>, segments: Vec<Segment>) {
    if segments.is_empty() {
        return;
    }
    if let Some(Node::Text(last)) = nodes.last_mut() {
        for segment in segments {
            match segment {
                Segment::Text(text) => push_text(last, &text),
                other => last.push(other),
            }
        }
    } else {
        nodes.push(Node::Text(segments));
    }
}

fn document_error(message: impl Into<String>, location: SourceLocation) -> Error {
    MapperError {
        location: Some(location),
        ..MapperError::new(MapperErrorKind::Document, message)
    }
    .into()
}
