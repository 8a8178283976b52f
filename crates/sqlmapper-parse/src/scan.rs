//! Splits SQL text into literal runs and parameter references.
//!
//! Recognised outside quoted literals:
//!
//! - `#{path}` or `#{path, jdbcType=..}`: bound parameter
//! - `:path`: bound parameter (not `::cast`, not `a:b`)
//! - `${path}`: escaped inline literal
//! - `-- comment`: removed up to the end of the line
//!
//! `/* block */` comments are kept verbatim but never scanned. Inside
//! `'..'` and `".."` a backslash escapes the next character.

use crate::node::Segment;
use sqlmapper_core::{MapperError, Result, SourceLocation};

/// Where a chunk of text came from, for error locations.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Origin<'s> {
    pub source: &'s str,
    pub offset: usize,
    /// Raw XML text the chunk was unescaped from.
    pub escaped: Option<&'s str>,
}

impl<'s> Origin<'s> {
    pub fn new(source: &'s str, offset: usize) -> Self {
        Self {
            source,
            offset,
            escaped: None,
        }
    }

    /// Mark the scanned chunk as the unescaped form of `raw`, which starts
    /// at `offset` in `source`.
    pub fn escaped(self, raw: &'s str) -> Self {
        Self {
            escaped: Some(raw),
            ..self
        }
    }

    fn location(&self, relative: usize) -> SourceLocation {
        let relative = self
            .escaped
            .map_or(relative, |raw| crate::xml::escaped_offset(raw, relative));
        SourceLocation::from_offset(self.source, self.offset + relative)
    }
}

/// Scan `text` into segments. With `parameters` off, only comments are
/// processed and everything else stays literal.
pub(crate) fn scan_text(text: &str, origin: Origin<'_>, parameters: bool) -> Result<Vec<Segment>> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut run_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\'' | b'"' | b'`' => i = quoted_end(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = block_comment_end(text, i),
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                push_text(&mut segments, &text[run_start..i]);
                i = text[i..].find('\n').map_or(bytes.len(), |n| i + n);
                run_start = i;
            }
            b'#' | b'$' if parameters && bytes.get(i + 1) == Some(&b'{') => {
                let open = if b == b'#' { "#{" } else { "${" };
                let close = text[i + 2..]
                    .find('}')
                    .map(|n| i + 2 + n)
                    .ok_or_else(|| {
                        MapperError::syntax(
                            format!("unterminated {open} parameter reference"),
                            origin.location(i),
                        )
                    })?;
                let inner = &text[i + 2..close];
                let path = inner.split(',').next().unwrap_or("").trim();
                if !is_valid_path(path) {
                    return Err(MapperError::syntax(
                        format!("invalid parameter reference {open}{inner}}}"),
                        origin.location(i),
                    )
                    .into());
                }
                push_text(&mut segments, &text[run_start..i]);
                segments.push(if b == b'#' {
                    Segment::Bind(path.to_string())
                } else {
                    Segment::Literal(path.to_string())
                });
                i = close + 1;
                run_start = i;
            }
            b':' if parameters && starts_named_parameter(bytes, i) => {
                let end = named_parameter_end(bytes, i + 1);
                if bytes.get(end) == Some(&b':') {
                    i = end;
                    continue;
                }
                push_text(&mut segments, &text[run_start..i]);
                segments.push(Segment::Bind(text[i + 1..end].to_string()));
                i = end;
                run_start = i;
            }
            _ => i += 1,
        }
    }
    push_text(&mut segments, &text[run_start..]);
    Ok(segments)
}

/// Index just past the quoted run opening at `start`, or the end of input
/// when it is unterminated. A doubled delimiter closes and reopens the run,
/// which lands in the same place as treating it as an escape.
pub(crate) fn quoted_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if quote != b'`' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Index just past the `/* */` comment opening at `start`.
pub(crate) fn block_comment_end(text: &str, start: usize) -> usize {
    text[start + 2..]
        .find("*/")
        .map_or(text.len(), |n| start + 2 + n + 2)
}

/// Append literal text, merging with a preceding text segment.
pub(crate) fn push_text(segments: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Text(last)) = segments.last_mut() {
        last.push_str(text);
    } else {
        segments.push(Segment::Text(text.to_string()));
    }
}

/// `a`, `a.b`, `items.0.name`
pub(crate) fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_'))
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn starts_named_parameter(bytes: &[u8], colon: usize) -> bool {
    let preceded_ok = colon == 0 || {
        let prev = bytes[colon - 1];
        prev != b':' && !is_ident_byte(prev)
    };
    let first_ok = bytes
        .get(colon + 1)
        .is_some_and(|&b| b.is_ascii_alphabetic() || b == b'_');
    preceded_ok && first_ok
}

/// End of `ident(.ident)*` starting at `start`.
fn named_parameter_end(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() {
        if is_ident_byte(bytes[end]) {
            end += 1;
        } else if bytes[end] == b'.' && bytes.get(end + 1).is_some_and(|&b| is_ident_byte(b)) {
            end += 1;
        } else {
            break;
        }
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlmapper_core::{Error, MapperErrorKind};

    fn scan(text: &str) -> Result<Vec<Segment>> {
        scan_text(text, Origin::new(text, 0), true)
    }

    #[test]
    fn test_bind_forms() {
        let segments = scan("a = #{a} AND b = :user.name AND c IN (${ids})").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Text("a = ".into()),
                Segment::Bind("a".into()),
                Segment::Text(" AND b = ".into()),
                Segment::Bind("user.name".into()),
                Segment::Text(" AND c IN (".into()),
                Segment::Literal("ids".into()),
                Segment::Text(")".into()),
            ]
        );
    }

    #[test]
    fn test_type_hints_are_ignored() {
        let segments = scan("#{ id , jdbcType=INTEGER}").unwrap();
        assert_eq!(segments, vec![Segment::Bind("id".into())]);
    }

    #[test]
    fn test_quotes_casts_and_comments_stay_literal() {
        let segments = scan("SELECT '#{x}', a::int, '12:30' -- :skipped\nFROM t").unwrap();
        assert_eq!(
            segments,
            vec![Segment::Text("SELECT '#{x}', a::int, '12:30' \nFROM t".into())]
        );
    }

    #[test]
    fn test_block_comments_are_not_scanned() {
        let segments = scan("SELECT /* don't :skip #{x} */ a FROM t WHERE b = #{b}").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Text("SELECT /* don't :skip #{x} */ a FROM t WHERE b = ".into()),
                Segment::Bind("b".into()),
            ]
        );
    }

    #[test]
    fn test_escaped_quotes_stay_inside_literal() {
        let segments = scan(r"WHERE a = 'it\'s' AND c = 'x''y' AND b = #{b}").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Text(r"WHERE a = 'it\'s' AND c = 'x''y' AND b = ".into()),
                Segment::Bind("b".into()),
            ]
        );
        let segments = scan(r"WHERE p = 'C:\\' AND b = :b").unwrap();
        assert_eq!(segments.last(), Some(&Segment::Bind("b".into())));
    }

    #[test]
    fn test_quoted_end_positions() {
        assert_eq!(quoted_end(br"'a\'b' x", 0), 6);
        assert_eq!(quoted_end(b"`a\\` x", 0), 4);
        assert_eq!(quoted_end(b"'open", 0), 5);
        assert_eq!(block_comment_end("/* a */b", 0), 7);
        assert_eq!(block_comment_end("/* open", 0), 7);
    }

    #[test]
    fn test_unterminated_reference_has_location() {
        match scan("SELECT *\nFROM t WHERE id = #{id") {
            Err(Error::Mapper(e)) => {
                assert_eq!(e.kind, MapperErrorKind::Syntax);
                assert_eq!(e.location, Some(SourceLocation { line: 2, column: 19 }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_empty_reference_is_rejected() {
        assert!(scan("id = #{}").is_err());
        assert!(scan("id = ${a b}").is_err());
    }

    #[test]
    fn test_parameters_disabled() {
        let text = "a = :a -- note\nAND b = #{b}";
        let segments = scan_text(text, Origin::new(text, 0), false).unwrap();
        assert_eq!(segments, vec![Segment::Text("a = :a \nAND b = #{b}".into())]);
    }
}
