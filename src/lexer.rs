//! Lightweight lexical layer shared by the language drivers.
//!
//! Nothing here builds a syntax tree. Source text is turned into two views of
//! identical byte length:
//!
//! - `masked`: comments *and* string-literal contents blanked to spaces. All
//!   structural recognition (headers, calls, paren balancing, comma
//!   splitting) runs on this view, so a `(` inside a string or a call inside a
//!   comment is never seen.
//! - `code`: only comments blanked. Parameter and argument text is sliced from
//!   this view, so string defaults survive verbatim.
//!
//! Offsets found in one view are valid in the other and in the source text.

use crate::model::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionKind {
    Comment,
    /// Contents between the delimiters; the quote characters stay visible.
    StringBody,
}

#[derive(Debug, Clone, Copy)]
struct Region {
    start: usize,
    end: usize,
    kind: RegionKind,
}

/// Source text with its masked views and a line-start table.
#[derive(Debug, Clone)]
pub struct Lexed {
    pub masked: String,
    pub code: String,
    line_starts: Vec<usize>,
}

impl Lexed {
    pub fn new(source: &str, language: Language) -> Self {
        let regions = match language {
            Language::Python => python_regions(source.as_bytes()),
            Language::JavaScript | Language::TypeScript => js_regions(source.as_bytes()),
        };
        let masked = blank(source, &regions, |_| true);
        let code = blank(source, &regions, |k| k == RegionKind::Comment);
        Self {
            masked,
            code,
            line_starts: line_starts(source),
        }
    }

    /// 1-based line of a byte offset.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// 1-based column (in bytes) of a byte offset.
    pub fn column_of(&self, offset: usize) -> usize {
        let line = self.line_of(offset);
        offset - self.line_starts[line - 1] + 1
    }

    /// Index of the `)` matching the `(` at `open`, on the masked view.
    pub fn matching_paren(&self, open: usize) -> Option<usize> {
        matching_paren(&self.masked, open)
    }

    /// Split `start..end` on top-level commas and return the trimmed, non-empty
    /// pieces of the `code` view together with their masked counterparts.
    pub fn split_list(&self, start: usize, end: usize, track_angles: bool) -> Vec<ListItem> {
        split_top_level(&self.masked[start..end], ',', track_angles)
            .into_iter()
            .filter_map(|(s, e)| {
                let masked = &self.masked[start + s..start + e];
                let code = &self.code[start + s..start + e];
                let lead = code.len() - code.trim_start().len();
                let trail = code.len() - code.trim_end().len();
                if lead + trail >= code.len() {
                    return None;
                }
                Some(ListItem {
                    code: code[lead..code.len() - trail].to_string(),
                    masked: masked[lead..masked.len() - trail].to_string(),
                })
            })
            .collect()
    }
}

/// One element of a parameter or argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub code: String,
    pub masked: String,
}

impl ListItem {
    /// Split at the first top-level `=` that is a plain assignment (not `==`,
    /// `!=`, `<=`, `>=`, `=>`). Returns trimmed `(lhs, rhs)`.
    pub fn split_assignment(&self) -> (String, Option<String>) {
        let bytes = self.masked.as_bytes();
        let mut depth = 0i32;
        for (i, &b) in bytes.iter().enumerate() {
            match b {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                b'=' if depth == 0 => {
                    let prev = i.checked_sub(1).map(|j| bytes[j]);
                    let next = bytes.get(i + 1).copied();
                    let compound = matches!(prev, Some(b'=' | b'!' | b'<' | b'>' | b':'))
                        || matches!(next, Some(b'=' | b'>'));
                    if !compound {
                        let lhs = self.code[..i].trim().to_string();
                        let rhs = self.code[i + 1..].trim().to_string();
                        return (lhs, Some(rhs));
                    }
                }
                _ => {}
            }
        }
        (self.code.trim().to_string(), None)
    }

    /// `name=value` call argument (Python keyword argument).
    pub fn keyword_argument(&self) -> Option<(String, String)> {
        let (lhs, rhs) = self.split_assignment();
        let rhs = rhs?;
        is_identifier(&lhs).then_some((lhs, rhs))
    }
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c == '$' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c == '$' || c.is_alphanumeric())
}

pub fn matching_paren(masked: &str, open: usize) -> Option<usize> {
    let bytes = masked.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Byte ranges of `sep`-separated pieces at bracket depth zero.
///
/// `track_angles` treats `<...>` as nesting (TypeScript generics in
/// annotations); `=>` never closes an angle.
pub fn split_top_level(masked: &str, sep: char, track_angles: bool) -> Vec<(usize, usize)> {
    let bytes = masked.as_bytes();
    let sep = sep as u8;
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut angle = 0i32;
    let mut start = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'<' if track_angles => angle += 1,
            b'>' if track_angles && angle > 0 && (i == 0 || bytes[i - 1] != b'=') => angle -= 1,
            _ if b == sep && depth == 0 && angle == 0 => {
                out.push((start, i));
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push((start, bytes.len()));
    out
}

/// Remove whitespace outside string literals.
pub fn squash_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in text.chars() {
        if let Some(q) = quote {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' | '`' => {
                quote = Some(ch);
                out.push(ch);
            }
            c if c.is_whitespace() => {}
            c => out.push(c),
        }
    }
    out
}

fn line_starts(source: &str) -> Vec<usize> {
    let mut starts = vec![0];
    starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
    starts
}

fn blank(source: &str, regions: &[Region], pick: impl Fn(RegionKind) -> bool) -> String {
    let mut out = source.as_bytes().to_vec();
    for r in regions.iter().filter(|r| pick(r.kind)) {
        for b in &mut out[r.start..r.end] {
            if *b != b'\n' {
                *b = b' ';
            }
        }
    }
    // Regions begin and end on ASCII delimiters, so every kept byte sequence is intact UTF-8.
    String::from_utf8_lossy(&out).into_owned()
}

/// Scan a quoted body starting right after the opening delimiter; returns the
/// offset of the closing delimiter (or end of input).
fn string_end(bytes: &[u8], mut i: usize, delim: &[u8], multiline: bool) -> usize {
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if !multiline && bytes[i] == b'\n' {
            return i;
        }
        if bytes[i..].starts_with(delim) {
            return i;
        }
        i += 1;
    }
    bytes.len()
}

fn python_regions(bytes: &[u8]) -> Vec<Region> {
    let mut regions = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'#' => {
                let end = bytes[i..].iter().position(|&b| b == b'\n').map_or(bytes.len(), |p| i + p);
                regions.push(Region { start: i, end, kind: RegionKind::Comment });
                i = end;
            }
            q @ (b'"' | b'\'') => {
                let triple = [q, q, q];
                let (delim, multiline) = if bytes[i..].starts_with(&triple) {
                    (&triple[..], true)
                } else {
                    (&triple[..1], false)
                };
                let body = i + delim.len();
                let end = string_end(bytes, body, delim, multiline).min(bytes.len());
                regions.push(Region { start: body, end, kind: RegionKind::StringBody });
                i = end + delim.len();
            }
            _ => i += 1,
        }
    }
    regions
}

fn js_regions(bytes: &[u8]) -> Vec<Region> {
    let mut regions = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = bytes[i..].iter().position(|&b| b == b'\n').map_or(bytes.len(), |p| i + p);
                regions.push(Region { start: i, end, kind: RegionKind::Comment });
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = bytes[i + 2..]
                    .windows(2)
                    .position(|w| w == b"*/")
                    .map_or(bytes.len(), |p| i + 2 + p + 2);
                regions.push(Region { start: i, end, kind: RegionKind::Comment });
                i = end;
            }
            q @ (b'"' | b'\'' | b'`') => {
                let delim = [q];
                let body = i + 1;
                let end = string_end(bytes, body, &delim, q == b'`').min(bytes.len());
                regions.push(Region { start: body, end, kind: RegionKind::StringBody });
                i = end + 1;
            }
            _ => i += 1,
        }
    }
    regions
}
