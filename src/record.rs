//! Text element records inside KiCad layout files
//!
//! A layout file is an s-expression document. This module does not build a
//! tree from it; it only finds the byte spans of lists with a given head
//! (`fp_text`, `font`, `layer`, ...) and splices replacement text back in,
//! leaving every other byte of the file untouched.

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;
use std::ops::Range;

lazy_static! {
    static ref RECORD_HEADER: Regex =
        Regex::new(r#"^\(fp_text\s+(reference|value|user)\s+("(?:[^"\\]|\\.)*"|[^\s()"]+)"#)
            .expect("record header regex is valid");
}

/// Kind of a text element, the word following `fp_text`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Reference,
    Value,
    User,
}

impl TextKind {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "reference" => Some(TextKind::Reference),
            "value" => Some(TextKind::Value),
            "user" => Some(TextKind::User),
            _ => None,
        }
    }
}

/// One `(fp_text ...)` record borrowed from the layout file
///
/// The record is split into a head (`(fp_text reference "TP1"`) and a body
/// (everything after the identifier, including the closing parenthesis).
/// Rewrite rules only ever replace the body.
#[derive(Debug, Clone, Copy)]
pub struct TextRecord<'a> {
    text: &'a str,
    kind: TextKind,
    identifier: &'a str,
    body_start: usize,
}

impl<'a> TextRecord<'a> {
    /// Parse a record from the full text of a balanced `(fp_text ...)` list
    pub fn parse(text: &'a str) -> Option<Self> {
        let caps = RECORD_HEADER.captures(text)?;
        let kind = TextKind::from_keyword(caps.get(1)?.as_str())?;
        let raw = caps.get(2)?;
        let identifier = raw
            .as_str()
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(raw.as_str());

        Some(Self {
            text,
            kind,
            identifier,
            body_start: raw.end(),
        })
    }

    pub fn kind(&self) -> TextKind {
        self.kind
    }

    /// Identifier without surrounding quotes
    pub fn identifier(&self) -> &'a str {
        self.identifier
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn head(&self) -> &'a str {
        &self.text[..self.body_start]
    }

    pub fn body(&self) -> &'a str {
        &self.text[self.body_start..]
    }

    pub fn is_reference(&self) -> bool {
        self.kind == TextKind::Reference
    }

    /// Reference record whose label starts with `prefix`
    pub fn is_test_point(&self, prefix: &str) -> bool {
        self.is_reference() && self.identifier.starts_with(prefix)
    }

    /// Rebuild the record with a new body
    pub fn with_body(&self, body: &str) -> String {
        format!("{}{}", self.head(), body)
    }
}

/// Index just past the closing quote of the string starting at `start`
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Index just past the parenthesis closing the list opened at `start`
///
/// Returns `None` for an unbalanced (truncated) list.
pub fn list_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn opens_list(text: &str, at: usize, head: &str) -> bool {
    let rest = &text[at + 1..];
    rest.starts_with(head)
        && rest[head.len()..].starts_with(|c: char| c.is_whitespace() || c == ')')
}

/// Spans of every outermost list headed by `head`, outside quoted strings
pub fn lists_named(text: &str, head: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => i = skip_string(bytes, i),
            b'(' if opens_list(text, i, head) => match list_end(text, i) {
                Some(end) => {
                    spans.push(i..end);
                    i = end;
                }
                None => break,
            },
            _ => i += 1,
        }
    }
    spans
}

/// Spans of bare atoms (unquoted tokens that are not list heads)
pub fn bare_atoms(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut atoms = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => i = skip_string(bytes, i),
            b'(' => {
                // skip the list head
                i += 1;
                while i < bytes.len() && is_atom_byte(bytes[i]) {
                    i += 1;
                }
            }
            b')' => i += 1,
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < bytes.len() && is_atom_byte(bytes[i]) {
                    i += 1;
                }
                atoms.push(start..i);
            }
        }
    }
    atoms
}

fn is_atom_byte(b: u8) -> bool {
    !matches!(b, b'(' | b')' | b'"') && !b.is_ascii_whitespace()
}

/// Spans of bare `hide` markers, each widened to include the whitespace
/// in front of it so that removing the span leaves no gap behind
pub fn hide_markers(text: &str) -> Vec<Range<usize>> {
    bare_atoms(text)
        .into_iter()
        .filter(|atom| &text[atom.clone()] == "hide")
        .map(|atom| {
            let ws_start = text[..atom.start].trim_end().len();
            ws_start..atom.end
        })
        .collect()
}

/// Replace each span with its new text
///
/// Spans must be sorted and non-overlapping. Edits whose new text equals the
/// old text are dropped, so an `Owned` result always differs from the input.
pub fn splice<'t>(text: &'t str, edits: Vec<(Range<usize>, String)>) -> Cow<'t, str> {
    let mut out: Option<String> = None;
    let mut copied = 0;
    for (span, replacement) in edits {
        if text[span.clone()] == replacement {
            continue;
        }
        let buf = out.get_or_insert_with(|| String::with_capacity(text.len() + 16));
        buf.push_str(&text[copied..span.start]);
        buf.push_str(&replacement);
        copied = span.end;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&text[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(text),
    }
}

/// Apply `rewrite` to every text element record in the document
///
/// `rewrite` returns the replacement for the whole record, or `None` to keep
/// it. Lists that do not parse as a record are left alone.
pub fn rewrite_records<'t, F>(text: &'t str, mut rewrite: F) -> Cow<'t, str>
where
    F: FnMut(&TextRecord<'_>) -> Option<String>,
{
    let edits = lists_named(text, "fp_text")
        .into_iter()
        .filter_map(|span| {
            let record = TextRecord::parse(&text[span.clone()])?;
            rewrite(&record).map(|new| (span, new))
        })
        .collect();
    splice(text, edits)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TP_RECORD: &str = r#"(fp_text reference "TP1002" (at 0 1.648) (layer "B.SilkS") (effects (font (size 0.6 0.6) (thickness 0.15)) (justify mirror)))"#;

    #[test]
    fn test_parse_quoted_record() {
        let record = TextRecord::parse(TP_RECORD).expect("record should parse");

        assert_eq!(record.kind(), TextKind::Reference);
        assert_eq!(record.identifier(), "TP1002");
        assert_eq!(record.head(), r#"(fp_text reference "TP1002""#);
        assert!(record.body().starts_with(" (at 0 1.648)"));
        assert!(record.is_test_point("TP"));
        assert!(!record.is_test_point("J"));
    }

    #[test]
    fn test_parse_bare_identifier() {
        let record = TextRecord::parse("(fp_text value 10k (at 0 2) (layer F.Fab))")
            .expect("record should parse");

        assert_eq!(record.kind(), TextKind::Value);
        assert_eq!(record.identifier(), "10k");
        assert!(!record.is_test_point("1"));
    }

    #[test]
    fn test_parse_rejects_other_lists() {
        assert!(TextRecord::parse("(gr_text \"hi\" (at 0 0))").is_none());
        assert!(TextRecord::parse("(fp_text bogus \"x\" (at 0 0))").is_none());
    }

    #[test]
    fn test_list_end_ignores_parens_in_strings() {
        let text = r#"(fp_text user "a)b(" (at 0 0)) tail"#;
        assert_eq!(list_end(text, 0), Some(text.len() - " tail".len()));
        assert_eq!(list_end("(unbalanced (x)", 0), None);
    }

    #[test]
    fn test_lists_named_spans_multiline_records() {
        let text = "(footprint \"X\"\n  (fp_text reference \"R1\" (at 0 0) (layer \"F.SilkS\")\n    (effects (font (size 1 1))))\n  (fp_text_box \"no\")\n  (fp_text value \"V\" (at 0 1) (layer \"F.Fab\")))";
        let spans = lists_named(text, "fp_text");

        assert_eq!(spans.len(), 2);
        assert!(text[spans[0].clone()].starts_with("(fp_text reference"));
        assert!(text[spans[0].clone()].ends_with("(size 1 1))))"));
        assert!(text[spans[1].clone()].starts_with("(fp_text value"));
    }

    #[test]
    fn test_hide_markers_skip_strings_and_heads() {
        let text = r#" (layer "hide") hide (hide yes) hidden  hide)"#;
        let markers = hide_markers(text);

        assert_eq!(markers.len(), 2);
        assert_eq!(&text[markers[0].clone()], " hide");
        assert_eq!(&text[markers[1].clone()], "  hide");
    }

    #[test]
    fn test_splice_borrows_when_nothing_changes() {
        let text = "(a) (b)";
        let same = splice(text, vec![(0..3, "(a)".to_string())]);
        assert!(matches!(same, Cow::Borrowed(_)));

        let changed = splice(text, vec![(4..7, "(c)".to_string())]);
        assert_eq!(changed, "(a) (c)");
    }

    #[test]
    fn test_rewrite_records_keeps_surrounding_text() {
        let text = format!("  {}\n  (pad \"1\" smd rect (size 1 1))\n", TP_RECORD);
        let out = rewrite_records(&text, |record| Some(record.with_body(" (at 9 9))")));

        assert_eq!(
            out,
            "  (fp_text reference \"TP1002\" (at 9 9))\n  (pad \"1\" smd rect (size 1 1))\n"
        );
    }
}
