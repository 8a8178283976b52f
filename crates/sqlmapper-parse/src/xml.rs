//! XML mapper documents.
//!
//! ```xml
//! <mapper namespace="user">
//!   <sql id="columns">id, name, email</sql>
//!   <select id="find">
//!     SELECT <include refid="columns"/> FROM users
//!     <where><if test="name != null">AND name = #{name}</if></where>
//!   </select>
//! </mapper>
//! ```
//!
//! Statements are `<select>`, `<insert>`, `<update>` and `<delete>`;
//! `<sql>` fragments are only reachable through `<include>` and are
//! expanded while the document loads.

use crate::markup::{self, Content, Element};
use crate::node::Node;
use crate::scan::{Origin, scan_text};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use sqlmapper_core::{Error, MapperError, MapperErrorKind, Result, SourceLocation};
use std::collections::{HashMap, HashSet};

const STATEMENTS: &[&str] = &["select", "insert", "update", "delete"];
const CDATA_OPEN: &str = "<![CDATA[";

/// One statement compiled from a mapper document.
#[derive(Debug)]
pub(crate) struct MapperStatement {
    pub id: String,
    pub source: String,
    pub nodes: Vec<Node>,
}

/// Parse a mapper document into its statements.
pub(crate) fn parse_mapper(data: &str, namespaced_ids: bool) -> Result<Vec<MapperStatement>> {
    let (root, children) = read_document(data)?;
    let namespace = root
        .attribute("namespace")
        .map(str::trim)
        .filter(|ns| !ns.is_empty());

    let mut fragments: HashMap<String, Element> = HashMap::new();
    let mut statements: Vec<(Element, String)> = Vec::new();
    for (element, source) in children {
        let id = element.required("id")?.trim().to_string();
        if id.is_empty() {
            return Err(element.error(format!("<{}> has an empty id", element.name)).into());
        }
        if element.name == "sql" {
            if fragments.contains_key(&id) {
                return Err(duplicate(&id, element.location));
            }
            fragments.insert(id, element);
        } else if STATEMENTS.contains(&element.name.as_str()) {
            statements.push((element, source));
        } else {
            return Err(MapperError {
                location: Some(element.location),
                ..MapperError::new(
                    MapperErrorKind::Document,
                    format!("unsupported element <{}> in <mapper>", element.name),
                )
            }
            .into());
        }
    }

    let mut seen = HashSet::new();
    let mut compiled = Vec::with_capacity(statements.len());
    for (element, source) in statements {
        let local_id = element.attribute("id").unwrap_or_default().trim().to_string();
        let id = match namespace {
            Some(ns) if namespaced_ids => format!("{ns}.{local_id}"),
            _ => local_id,
        };
        if !seen.insert(id.clone()) {
            return Err(duplicate(&id, element.location));
        }
        let nodes = expand_includes(element.children, &fragments, namespace, &mut Vec::new())
            .and_then(markup::build_nodes)
            .map_err(|e| markup::attach_sql_id(e, &id))?;
        compiled.push(MapperStatement { id, source, nodes });
    }

    tracing::debug!(
        namespace = namespace.unwrap_or(""),
        statements = compiled.len(),
        fragments = fragments.len(),
        "parsed mapper document"
    );
    Ok(compiled)
}

fn duplicate(id: &str, location: SourceLocation) -> Error {
    MapperError {
        location: Some(location),
        ..MapperError::new(MapperErrorKind::DuplicateId, format!("duplicate id '{id}'"))
    }
    .with_sql_id(id)
    .into()
}

/// Replace `<include refid>` elements with the referenced fragment.
fn expand_includes(
    contents: Vec<Content>,
    fragments: &HashMap<String, Element>,
    namespace: Option<&str>,
    visiting: &mut Vec<String>,
) -> Result<Vec<Content>> {
    let mut out = Vec::with_capacity(contents.len());
    for content in contents {
        match content {
            Content::Element(element) if element.name == "include" => {
                let refid = element.required("refid")?.trim();
                let key = resolve_refid(refid, fragments, namespace).ok_or_else(|| MapperError {
                    location: Some(element.location),
                    ..MapperError::new(
                        MapperErrorKind::UnknownInclude,
                        format!("<include> references unknown fragment '{refid}'"),
                    )
                })?;
                if visiting.iter().any(|v| v == key) {
                    return Err(element
                        .error(format!("circular <include> of fragment '{key}'"))
                        .into());
                }
                visiting.push(key.to_string());
                let fragment = &fragments[key];
                let expanded =
                    expand_includes(fragment.children.clone(), fragments, namespace, visiting)?;
                visiting.pop();
                out.extend(expanded);
            }
            Content::Element(mut element) => {
                element.children = expand_includes(
                    std::mem::take(&mut element.children),
                    fragments,
                    namespace,
                    visiting,
                )?;
                out.push(Content::Element(element));
            }
            text @ Content::Text(_) => out.push(text),
        }
    }
    Ok(out)
}

fn resolve_refid<'f>(
    refid: &str,
    fragments: &'f HashMap<String, Element>,
    namespace: Option<&str>,
) -> Option<&'f str> {
    if let Some((key, _)) = fragments.get_key_value(refid) {
        return Some(key);
    }
    let local = refid.strip_prefix(namespace?)?.strip_prefix('.')?;
    fragments.get_key_value(local).map(|(key, _)| key.as_str())
}

/// Read the `<mapper>` root and its top-level children (with their source text).
fn read_document(data: &str) -> Result<(Element, Vec<(Element, String)>)> {
    let mut reader = Reader::from_str(data);
    reader.config_mut().trim_text(false);

    let mut root: Option<Element> = None;
    let mut children: Vec<(Element, String)> = Vec::new();
    let mut stack: Vec<(Element, usize)> = Vec::new();

    loop {
        let offset = position(&reader);
        let event = reader
            .read_event()
            .map_err(|e| document_error(data, offset, e))?;
        match event {
            Event::Start(start) => {
                let element = element_from(&start, data, offset)?;
                if stack.is_empty() {
                    check_root(&element, root.is_some())?;
                }
                stack.push((element, offset));
            }
            Event::Empty(start) => {
                let element = element_from(&start, data, offset)?;
                if stack.is_empty() {
                    check_root(&element, root.is_some())?;
                    root = Some(element);
                } else {
                    let end = position(&reader);
                    close_element(&mut stack, &mut children, element, data, offset, end);
                }
            }
            Event::End(_) => {
                let end = position(&reader);
                let Some((element, start)) = stack.pop() else {
                    return Err(document_message(data, offset, "unexpected closing tag"));
                };
                if stack.is_empty() {
                    root = Some(element);
                } else {
                    close_element(&mut stack, &mut children, element, data, start, end);
                }
            }
            Event::Text(text) => {
                let raw = data.get(offset..position(&reader)).unwrap_or_default();
                let text = text
                    .unescape()
                    .map_err(|e| document_error(data, offset, e))?;
                push_text(&mut stack, &text, Origin::new(data, offset).escaped(raw))?;
            }
            Event::CData(cdata) => {
                let text = String::from_utf8_lossy(&cdata);
                let origin = Origin::new(data, offset + CDATA_OPEN.len());
                push_text(&mut stack, &text, origin)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some((open, _)) = stack.last() {
        return Err(MapperError {
            location: Some(open.location),
            ..MapperError::new(MapperErrorKind::Document, format!("unclosed <{}>", open.name))
        }
        .into());
    }
    let root = root.ok_or_else(|| {
        MapperError::new(MapperErrorKind::Document, "missing <mapper> root element")
    })?;
    Ok((root, children))
}

fn check_root(element: &Element, seen_root: bool) -> Result<()> {
    let message = if seen_root {
        "multiple root elements"
    } else if element.name != "mapper" {
        "root element must be <mapper>"
    } else {
        return Ok(());
    };
    Err(MapperError {
        location: Some(element.location),
        ..MapperError::new(MapperErrorKind::Document, message)
    }
    .into())
}

fn close_element(
    stack: &mut [(Element, usize)],
    children: &mut Vec<(Element, String)>,
    element: Element,
    data: &str,
    start: usize,
    end: usize,
) {
    if stack.len() == 1 {
        let source = data.get(start..end).unwrap_or_default().to_string();
        children.push((element, source));
    } else if let Some((parent, _)) = stack.last_mut() {
        parent.children.push(Content::Element(element));
    }
}

fn push_text(stack: &mut [(Element, usize)], text: &str, origin: Origin<'_>) -> Result<()> {
    match stack.len() {
        0 | 1 => {
            if text.trim().is_empty() {
                Ok(())
            } else {
                Err(document_message(origin.source, origin.offset, "text outside a statement"))
            }
        }
        _ => {
            let segments = scan_text(text, origin, true)?;
            if let Some((parent, _)) = stack.last_mut() {
                if !segments.is_empty() {
                    parent.children.push(Content::Text(segments));
                }
            }
            Ok(())
        }
    }
}

fn element_from(start: &BytesStart<'_>, data: &str, offset: usize) -> Result<Element> {
    let location = SourceLocation::from_offset(data, offset);
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element::new(name, location);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| document_error(data, offset, e))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| document_error(data, offset, e))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

/// Byte offset in XML-escaped `raw` of the character that sits `unescaped`
/// bytes into its unescaped form.
pub(crate) fn escaped_offset(raw: &str, unescaped: usize) -> usize {
    let mut produced = 0;
    let mut i = 0;
    while i < raw.len() && produced < unescaped {
        if raw.as_bytes()[i] == b'&' {
            if let Some(end) = raw[i..].find(';') {
                let entity = &raw[i..=i + end];
                produced += quick_xml::escape::unescape(entity).map_or(entity.len(), |s| s.len());
                i += end + 1;
                continue;
            }
        }
        let width = raw[i..].chars().next().map_or(1, char::len_utf8);
        produced += width;
        i += width;
    }
    i
}

fn position(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

fn document_message(data: &str, offset: usize, message: &str) -> Error {
    MapperError {
        location: Some(SourceLocation::from_offset(data, offset)),
        ..MapperError::new(MapperErrorKind::Document, message)
    }
    .into()
}

fn document_error<E>(data: &str, offset: usize, err: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    MapperError {
        location: Some(SourceLocation::from_offset(data, offset)),
        source: Some(Box::new(err)),
        ..MapperError::new(MapperErrorKind::Document, "malformed mapper document")
    }
    .into()
}
