//! Directive elements (`<if>`, `<foreach>`, ...) shared by the inline
//! dynamic syntax and XML mapper documents.

use crate::expr::Expr;
use crate::node::{Foreach, Node, Segment, Trim};
use crate::scan::is_valid_path;
use sqlmapper_core::{Error, MapperError, Result, SourceLocation};

/// Element names understood as directives.
pub(crate) const DIRECTIVES: &[&str] = &[
    "if", "choose", "when", "otherwise", "foreach", "where", "set", "trim", "bind",
];

/// A parsed element before it is compiled into a [`Node`].
#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Content>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub(crate) enum Content {
    Text(Vec<Segment>),
    Element(Element),
}

impl Element {
    pub(crate) fn new(name: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            location,
        }
    }

    pub(crate) fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn required(&self, name: &str) -> Result<&str> {
        self.attribute(name).ok_or_else(|| {
            self.error(format!("<{}> requires attribute '{}'", self.name, name))
                .into()
        })
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> MapperError {
        MapperError::syntax(message, self.location)
    }

    fn expression(&self, name: &str) -> Result<Expr> {
        let source = self.required(name)?;
        Expr::parse(source).map_err(|message| {
            self.error(format!("<{}> {}: {}", self.name, name, message))
                .into()
        })
    }

    fn attribute_or_empty(&self, name: &str) -> String {
        self.attribute(name).unwrap_or_default().to_string()
    }
}

/// Compile a content list into nodes.
pub(crate) fn build_nodes(contents: Vec<Content>) -> Result<Vec<Node>> {
    let mut nodes = Vec::with_capacity(contents.len());
    for content in contents {
        match content {
            Content::Text(segments) => {
                if !segments.is_empty() {
                    nodes.push(Node::Text(segments));
                }
            }
            Content::Element(element) => nodes.push(build_element(element)?),
        }
    }
    Ok(nodes)
}

fn build_element(element: Element) -> Result<Node> {
    match element.name.as_str() {
        "if" => {
            let test = element.expression("test")?;
            Ok(Node::If {
                test,
                body: build_nodes(element.children)?,
            })
        }
        "choose" => build_choose(element),
        "foreach" => {
            let collection = element.required("collection")?.trim().to_string();
            if !is_valid_path(&collection) {
                return Err(element
                    .error(format!("<foreach> collection '{collection}' is not a parameter path"))
                    .into());
            }
            let item = element.attribute("item").unwrap_or("item").trim().to_string();
            let index = element
                .attribute("index")
                .map(|index| index.trim().to_string())
                .filter(|index| !index.is_empty());
            for name in std::iter::once(&item).chain(index.iter()) {
                if !is_identifier(name) {
                    return Err(element
                        .error(format!("<foreach> variable '{name}' is not an identifier"))
                        .into());
                }
            }
            Ok(Node::Foreach(Foreach {
                collection,
                item,
                index,
                open: element.attribute_or_empty("open"),
                close: element.attribute_or_empty("close"),
                separator: element.attribute_or_empty("separator"),
                body: build_nodes(element.children)?,
            }))
        }
        "where" => Ok(Node::Trim(Trim::where_clause(build_nodes(element.children)?))),
        "set" => Ok(Node::Trim(Trim::set_clause(build_nodes(element.children)?))),
        "trim" => Ok(Node::Trim(Trim {
            prefix: element.attribute_or_empty("prefix").trim().to_string(),
            suffix: element.attribute_or_empty("suffix").trim().to_string(),
            prefix_overrides: Trim::parse_overrides(element.attribute("prefixOverrides").unwrap_or("")),
            suffix_overrides: Trim::parse_overrides(element.attribute("suffixOverrides").unwrap_or("")),
            body: build_nodes(element.children)?,
        })),
        "bind" => {
            let name = element.required("name")?.trim().to_string();
            if !is_identifier(&name) {
                return Err(element
                    .error(format!("<bind> name '{name}' is not an identifier"))
                    .into());
            }
            if has_content(&element.children) {
                return Err(element.error("<bind> must be empty").into());
            }
            let expr = element.expression("value")?;
            Ok(Node::Bind { name, expr })
        }
        "when" | "otherwise" => Err(element
            .error(format!("<{}> outside <choose>", element.name))
            .into()),
        other => Err(element
            .error(format!("unsupported element <{other}>"))
            .into()),
    }
}

fn build_choose(element: Element) -> Result<Node> {
    let mut whens = Vec::new();
    let mut otherwise = None;
    let location = element.location;

    for child in element.children {
        match child {
            Content::Text(segments) => {
                if has_content(&[Content::Text(segments)]) {
                    return Err(MapperError::syntax("text inside <choose> must be in <when>", location).into());
                }
            }
            Content::Element(child) => match child.name.as_str() {
                "when" => {
                    if otherwise.is_some() {
                        return Err(child.error("<when> after <otherwise>").into());
                    }
                    let test = child.expression("test")?;
                    whens.push((test, build_nodes(child.children)?));
                }
                "otherwise" => {
                    if otherwise.is_some() {
                        return Err(child.error("duplicate <otherwise>").into());
                    }
                    otherwise = Some(build_nodes(child.children)?);
                }
                other => {
                    return Err(child
                        .error(format!("<{other}> inside <choose>"))
                        .into());
                }
            },
        }
    }

    if whens.is_empty() {
        return Err(MapperError::syntax("<choose> needs at least one <when>", location).into());
    }
    Ok(Node::Choose { whens, otherwise })
}

/// True when the content holds anything besides whitespace.
fn has_content(contents: &[Content]) -> bool {
    contents.iter().any(|content| match content {
        Content::Element(_) => true,
        Content::Text(segments) => segments.iter().any(|segment| match segment {
            Segment::Text(text) => !text.trim().is_empty(),
            Segment::Bind(_) | Segment::Literal(_) => true,
        }),
    })
}

/// Tag a registration error with the id of the SQL being registered.
pub(crate) fn attach_sql_id(err: Error, sql_id: &str) -> Error {
    match err {
        Error::Mapper(e) => Error::Mapper(e.with_sql_id(sql_id)),
        other => other,
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}
