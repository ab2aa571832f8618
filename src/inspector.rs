use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{Result, TrackError};
use crate::lexer::{is_identifier, split_top_level, Lexed, ListItem};
use crate::model::{Language, Parameter, Signature};

/// A recognised function header inside lexed source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    /// Byte offset of the first character of the name.
    pub name_offset: usize,
    /// Byte offsets of the parameter list parentheses.
    pub open: usize,
    pub close: usize,
}

/// A call expression `name(args)` inside lexed source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: String,
    pub name_offset: usize,
    pub open: usize,
    pub close: usize,
    pub arguments: Vec<ListItem>,
    pub member_call: bool,
}

impl Call {
    /// From the name through the closing parenthesis, verbatim.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.name_offset..=self.close]
    }
}

/// Per-language header recogniser.
///
/// Drivers only see the lexed views; swapping one for a real incremental
/// parser does not touch the index, detector or synthesizer.
pub trait LanguageDriver: Send + Sync {
    fn language(&self) -> Language;

    /// File extensions handled by this driver (lowercase, without dot).
    fn extensions(&self) -> &'static [&'static str];

    fn handles_path(&self, path: &Path) -> bool {
        let ext = path_ext_lower(path);
        self.extensions().contains(&ext.as_str())
    }

    /// Every complete function header, ordered by offset.
    fn find_headers(&self, lexed: &Lexed) -> Vec<Header>;

    /// Words that, directly before `name(`, make it a declaration rather than a call.
    fn declaration_keywords(&self) -> &'static [&'static str];

    /// Whether `<...>` nests inside parameter lists.
    fn generic_angles(&self) -> bool {
        false
    }
}

pub struct LanguageRegistry {
    drivers: Vec<Box<dyn LanguageDriver>>,
    by_ext: HashMap<String, usize>,
}

impl LanguageRegistry {
    pub fn driver_for_path(&self, path: &Path) -> Option<&dyn LanguageDriver> {
        let ext = path_ext_lower(path);
        let idx = *self.by_ext.get(&ext)?;
        self.drivers
            .get(idx)
            .map(|d| d.as_ref())
            .filter(|d| d.handles_path(path))
    }

    pub fn driver_for_language(&self, language: Language) -> &dyn LanguageDriver {
        match self.drivers.iter().find(|d| d.language() == language) {
            Some(d) => d.as_ref(),
            // Every Language variant is registered in Default.
            None => &PYTHON,
        }
    }

    pub fn language_for_path(&self, path: &Path) -> Option<Language> {
        self.driver_for_path(path).map(|d| d.language())
    }
}

static PYTHON: PythonDriver = PythonDriver;

impl Default for LanguageRegistry {
    fn default() -> Self {
        let drivers: Vec<Box<dyn LanguageDriver>> = vec![
            Box::new(PythonDriver),
            Box::new(ScriptDriver { language: Language::JavaScript }),
            Box::new(ScriptDriver { language: Language::TypeScript }),
        ];

        let mut reg = Self {
            drivers,
            by_ext: HashMap::new(),
        };
        for (idx, d) in reg.drivers.iter().enumerate() {
            for ext in d.extensions() {
                reg.by_ext.insert(ext.to_string(), idx);
            }
        }
        reg
    }
}

pub fn language_registry() -> &'static LanguageRegistry {
    static REG: OnceLock<LanguageRegistry> = OnceLock::new();
    REG.get_or_init(LanguageRegistry::default)
}

fn path_ext_lower(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => panic!("invalid built-in pattern {pattern}: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Python
// ---------------------------------------------------------------------------

struct PythonDriver;

impl LanguageDriver for PythonDriver {
    fn language(&self) -> Language {
        Language::Python
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn find_headers(&self, lexed: &Lexed) -> Vec<Header> {
        static DEF: OnceLock<Regex> = OnceLock::new();
        let re = regex(&DEF, r"\bdef\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(");

        let masked = lexed.masked.as_str();
        let mut out = Vec::new();
        for caps in re.captures_iter(masked) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else { continue };
            let open = whole.end() - 1;
            let Some(close) = lexed.matching_paren(open) else { continue };
            if !python_header_terminates(&masked[close + 1..]) {
                continue;
            }
            out.push(Header {
                name: name.as_str().to_string(),
                name_offset: name.start(),
                open,
                close,
            });
        }
        out
    }

    fn declaration_keywords(&self) -> &'static [&'static str] {
        &["def", "class"]
    }
}

/// After the parameter list: `:` or `-> annotation:`.
fn python_header_terminates(rest: &str) -> bool {
    let rest = rest.trim_start();
    if rest.starts_with(':') {
        return true;
    }
    let Some(annotation) = rest.strip_prefix("->") else { return false };
    let mut depth = 0i32;
    for b in annotation.bytes() {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b':' if depth == 0 => return true,
            b'\n' if depth == 0 => return false,
            _ => {}
        }
    }
    false
}

// ---------------------------------------------------------------------------
// JavaScript / TypeScript
// ---------------------------------------------------------------------------

struct ScriptDriver {
    language: Language,
}

const SCRIPT_NON_METHODS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "function", "typeof", "await", "new",
    "do", "else", "with", "super", "import", "export", "yield", "delete", "void", "throw",
];

impl LanguageDriver for ScriptDriver {
    fn language(&self) -> Language {
        self.language
    }

    fn extensions(&self) -> &'static [&'static str] {
        match self.language {
            Language::TypeScript => &["ts"],
            _ => &["js"],
        }
    }

    fn find_headers(&self, lexed: &Lexed) -> Vec<Header> {
        static FUNCTION: OnceLock<Regex> = OnceLock::new();
        static ARROW: OnceLock<Regex> = OnceLock::new();
        static FUNCTION_EXPR: OnceLock<Regex> = OnceLock::new();
        static METHOD: OnceLock<Regex> = OnceLock::new();

        let function = regex(&FUNCTION, r"\bfunction\s*\*?\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*\(");
        let arrow = regex(
            &ARROW,
            r"\b(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*(?::[^=\n]+)?=\s*(?:async\s*)?\(",
        );
        let function_expr = regex(
            &FUNCTION_EXPR,
            r"\b(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*(?:async\s+)?function\s*\*?\s*(?:[A-Za-z_$][A-Za-z0-9_$]*)?\s*\(",
        );
        let method = regex(
            &METHOD,
            r"(?m)^[ \t]*(?:(?:public|private|protected|static|async|get|set|override|readonly)\s+)*\*?\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*\(",
        );

        let masked = lexed.masked.as_str();
        let mut out: Vec<Header> = Vec::new();
        let mut seen: HashSet<usize> = HashSet::new();

        let mut collect = |re: &Regex, terminator: Option<&str>, out: &mut Vec<Header>| {
            for caps in re.captures_iter(masked) {
                let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else { continue };
                if SCRIPT_NON_METHODS.contains(&name.as_str()) {
                    continue;
                }
                let open = whole.end() - 1;
                let Some(close) = lexed.matching_paren(open) else { continue };
                if let Some(term) = terminator {
                    if !followed_by_after_annotation(&masked[close + 1..], term) {
                        continue;
                    }
                }
                if seen.insert(name.start()) {
                    out.push(Header {
                        name: name.as_str().to_string(),
                        name_offset: name.start(),
                        open,
                        close,
                    });
                }
            }
        };

        collect(function, None, &mut out);
        collect(function_expr, None, &mut out);
        collect(arrow, Some("=>"), &mut out);
        collect(method, Some("{"), &mut out);

        out.sort_by_key(|h| h.name_offset);
        out
    }

    fn declaration_keywords(&self) -> &'static [&'static str] {
        &["function", "new", "class"]
    }

    fn generic_angles(&self) -> bool {
        self.language == Language::TypeScript
    }
}

/// `rest` starts right after a parameter list: accept when `terminator`
/// follows, optionally after a TypeScript `: ReturnType` annotation.
fn followed_by_after_annotation(rest: &str, terminator: &str) -> bool {
    let rest = rest.trim_start();
    if rest.starts_with(terminator) {
        return true;
    }
    let Some(annotation) = rest.strip_prefix(':') else { return false };
    let bytes = annotation.as_bytes();
    let mut depth = 0i32;
    let mut angle = 0i32;
    for (i, &b) in bytes.iter().enumerate() {
        if depth == 0 && angle == 0 && annotation[i..].starts_with(terminator) {
            return true;
        }
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'<' => angle += 1,
            b'>' if angle > 0 && (i == 0 || bytes[i - 1] != b'=') => angle -= 1,
            b';' if depth == 0 => return false,
            _ => {}
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Shared extraction
// ---------------------------------------------------------------------------

/// Build the signature for a header found in `lexed`.
pub fn signature_from_header(lexed: &Lexed, header: &Header, driver: &dyn LanguageDriver) -> Signature {
    let language = driver.language();
    let items = lexed.split_list(header.open + 1, header.close, driver.generic_angles());
    let mut parameters = Vec::with_capacity(items.len());
    for item in &items {
        let (lhs, default) = item.split_assignment();
        let (name, annotation) = split_annotation(&lhs, language);
        if name.is_empty() {
            continue;
        }
        parameters.push(Parameter {
            name,
            default,
            position: parameters.len(),
            annotation,
        });
    }
    Signature {
        function_name: header.name.clone(),
        parameters,
        language,
    }
}

const TS_PARAMETER_MODIFIERS: &[&str] = &["public", "private", "protected", "readonly", "override"];

fn split_annotation(lhs: &str, language: Language) -> (String, Option<String>) {
    let pieces = split_top_level(lhs, ':', false);
    let (name, annotation) = match pieces.as_slice() {
        [(_, end), ..] if *end < lhs.len() => {
            let ann = lhs[end + 1..].trim();
            (lhs[..*end].trim(), (!ann.is_empty()).then(|| ann.to_string()))
        }
        _ => (lhs.trim(), None),
    };

    let mut name = name;
    if language == Language::TypeScript {
        loop {
            let stripped = TS_PARAMETER_MODIFIERS.iter().find_map(|m| {
                name.strip_prefix(m)
                    .filter(|rest| rest.starts_with(char::is_whitespace))
                    .map(str::trim_start)
            });
            match stripped {
                Some(rest) => name = rest,
                None => break,
            }
        }
        name = name.strip_suffix('?').unwrap_or(name).trim_end();
    }
    (name.to_string(), annotation)
}

/// Parse the call whose name spans `name_offset..open` (open is the `(`).
pub fn call_at(lexed: &Lexed, name_offset: usize, open: usize, generic_angles: bool) -> Result<Call> {
    let masked = lexed.masked.as_str();
    let name = masked[name_offset..open].trim_end().to_string();
    let close = lexed
        .matching_paren(open)
        .ok_or_else(|| TrackError::UnbalancedCall { function: name.clone() })?;
    let member_call = masked[..name_offset].trim_end().ends_with('.');
    Ok(Call {
        name,
        name_offset,
        open,
        close,
        arguments: lexed.split_list(open + 1, close, generic_angles),
        member_call,
    })
}

fn call_pattern() -> &'static Regex {
    static CALL: OnceLock<Regex> = OnceLock::new();
    regex(&CALL, r"[A-Za-z_$][A-Za-z0-9_$]*\s*\(")
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Word immediately before `offset`, skipping whitespace.
fn previous_word(masked: &str, offset: usize) -> &str {
    let before = masked[..offset].trim_end();
    let start = before
        .bytes()
        .rposition(|b| !is_ident_byte(b))
        .map_or(0, |p| p + 1);
    &before[start..]
}

/// Calls to any name in `names`, in offset order, skipping declaration sites
/// (`def name(`, `function name(`, and offsets listed in `header_offsets`).
///
/// Names are matched textually: a local function, method or import alias
/// that shares a tracked name is reported as a usage of it.
///
/// Calls that cannot be balanced are returned as errors with their offset.
pub fn find_calls(
    lexed: &Lexed,
    driver: &dyn LanguageDriver,
    names: &HashSet<String>,
    header_offsets: &HashSet<usize>,
) -> Vec<std::result::Result<Call, (usize, TrackError)>> {
    let masked = lexed.masked.as_str();
    let bytes = masked.as_bytes();
    let mut out = Vec::new();
    for m in call_pattern().find_iter(masked) {
        let start = m.start();
        if start > 0 && is_ident_byte(bytes[start - 1]) {
            continue;
        }
        let open = m.end() - 1;
        let name = masked[start..open].trim_end();
        if !names.contains(name) || header_offsets.contains(&start) {
            continue;
        }
        if driver.declaration_keywords().contains(&previous_word(masked, start)) {
            continue;
        }
        out.push(call_at(lexed, start, open, driver.generic_angles()).map_err(|e| (start, e)));
    }
    out
}

/// Extract the signature of the first complete function header in `fragment`.
pub fn parse_signature(fragment: &str, language: Language) -> Result<Signature> {
    parse_signature_with_line(fragment, language).map(|(sig, _)| sig)
}

/// Like [`parse_signature`], also returning the 1-based line of the header.
pub fn parse_signature_with_line(fragment: &str, language: Language) -> Result<(Signature, usize)> {
    let driver = language_registry().driver_for_language(language);
    let lexed = Lexed::new(fragment, language);
    let header = driver
        .find_headers(&lexed)
        .into_iter()
        .next()
        .ok_or_else(|| TrackError::Parse(format!("no {language} function header found")))?;
    Ok((signature_from_header(&lexed, &header, driver), lexed.line_of(header.name_offset)))
}

/// Callee name and raw argument texts of the first call expression in `fragment`.
pub fn parse_call(fragment: &str, language: Language) -> Result<(String, Vec<String>)> {
    let driver = language_registry().driver_for_language(language);
    let lexed = Lexed::new(fragment, language);
    let masked = lexed.masked.as_str();
    let bytes = masked.as_bytes();
    for m in call_pattern().find_iter(masked) {
        let start = m.start();
        if start > 0 && is_ident_byte(bytes[start - 1]) {
            continue;
        }
        let open = m.end() - 1;
        let name = masked[start..open].trim_end();
        if !is_identifier(name) || SCRIPT_NON_METHODS.contains(&name) {
            continue;
        }
        let call = call_at(&lexed, start, open, driver.generic_angles())?;
        let args = call.arguments.into_iter().map(|a| a.code).collect();
        return Ok((call.name, args));
    }
    Err(TrackError::Parse(format!("no {language} call expression found")))
}
