//! The compiled SQL tree shared by every parser front-end.

use crate::expr::Expr;

/// A piece of literal SQL text or a parameter reference inside it.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// SQL text copied to the output
    Text(String),
    /// A bound parameter, written as a placeholder
    Bind(String),
    /// A parameter inlined as an escaped SQL literal
    Literal(String),
}

/// One node of a compiled SQL template.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Text with interleaved parameter references
    Text(Vec<Segment>),
    /// Body rendered when the guard is true
    If { test: Expr, body: Vec<Node> },
    /// First matching branch, else `otherwise`
    Choose {
        whens: Vec<(Expr, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    /// Body repeated per element of a collection
    Foreach(Foreach),
    /// Body with prefix/suffix handling (`where`, `set`, `trim`)
    Trim(Trim),
    /// Evaluate an expression into a named local
    Bind { name: String, expr: Expr },
}

/// Loop over a sequence parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Foreach {
    /// Path of the sequence to iterate
    pub collection: String,
    /// Local name bound to each element
    pub item: String,
    /// Local name bound to each position, if requested
    pub index: Option<String>,
    pub open: String,
    pub close: String,
    pub separator: String,
    pub body: Vec<Node>,
}

/// Prefix/suffix rewriting around a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Trim {
    pub prefix: String,
    pub suffix: String,
    /// Leading words removed from the body (first match only)
    pub prefix_overrides: Vec<String>,
    /// Trailing words removed from the body (first match only)
    pub suffix_overrides: Vec<String>,
    pub body: Vec<Node>,
}

impl Trim {
    /// `WHERE` clause that drops a dangling leading `AND` / `OR`.
    pub fn where_clause(body: Vec<Node>) -> Self {
        Self {
            prefix: "WHERE".to_string(),
            suffix: String::new(),
            prefix_overrides: vec!["AND".to_string(), "OR".to_string()],
            suffix_overrides: Vec::new(),
            body,
        }
    }

    /// `SET` clause that drops stray leading or trailing commas.
    pub fn set_clause(body: Vec<Node>) -> Self {
        Self {
            prefix: "SET".to_string(),
            suffix: String::new(),
            prefix_overrides: vec![",".to_string()],
            suffix_overrides: vec![",".to_string()],
            body,
        }
    }

    /// Parse a `|`-separated override list such as `"AND |OR "`.
    pub fn parse_overrides(list: &str) -> Vec<String> {
        list.split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Apply the prefix/suffix rules to an already rendered body.
    pub(crate) fn apply(&self, body: &str) -> String {
        let mut body = body.trim();
        if let Some(rest) = self
            .prefix_overrides
            .iter()
            .find_map(|word| strip_word_prefix(body, word))
        {
            body = rest.trim_start();
        }
        if let Some(rest) = self
            .suffix_overrides
            .iter()
            .find_map(|word| strip_word_suffix(body, word))
        {
            body = rest.trim_end();
        }
        if body.is_empty() {
            return String::new();
        }

        let mut out = String::with_capacity(body.len() + self.prefix.len() + self.suffix.len() + 2);
        if !self.prefix.is_empty() {
            out.push_str(&self.prefix);
            out.push(' ');
        }
        out.push_str(body);
        if !self.suffix.is_empty() {
            out.push(' ');
            out.push_str(&self.suffix);
        }
        out
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Strip `word` from the start of `text`, case-insensitively, on a word boundary.
fn strip_word_prefix<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let head = text.get(..word.len())?;
    if !head.eq_ignore_ascii_case(word) {
        return None;
    }
    let rest = &text[word.len()..];
    let needs_boundary = word.chars().last().is_some_and(is_word_char);
    if needs_boundary && rest.chars().next().is_some_and(is_word_char) {
        return None;
    }
    Some(rest)
}

fn strip_word_suffix<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let split = text.len().checked_sub(word.len())?;
    let tail = text.get(split..)?;
    if !tail.eq_ignore_ascii_case(word) {
        return None;
    }
    let rest = &text[..split];
    let needs_boundary = word.chars().next().is_some_and(is_word_char);
    if needs_boundary && rest.chars().last().is_some_and(is_word_char) {
        return None;
    }
    Some(rest)
}
