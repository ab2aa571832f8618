//! Codebase scanner.
//!
//! Walks a tree, keeps files whose extension maps to a supported language and
//! extracts definitions and call sites in two passes:
//!
//! 1. every definition over the whole file set;
//! 2. every call to a name collected in pass 1.
//!
//! Usages are therefore never lost because their defining file sorts after
//! the calling file.
//!
//! Matching is by bare name only, with no scope or import resolution. A call
//! in a `.js` file is attributed to a same-named `.py` definition just as
//! readily, and is then rewritten with that definition's language rules.

use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::config::ScanConfig;
use crate::error::{ItemError, Result, TrackError};
use crate::inspector::{find_calls, language_registry, signature_from_header, LanguageDriver};
use crate::lexer::Lexed;
use crate::model::{FunctionDefinition, Language, UsageSite};

fn default_overrides(root: &Path, exclude_dir_names: &[String]) -> Result<Override> {
    let mut ob = OverrideBuilder::new(root);

    // Vendored code, virtualenvs and build outputs never hold tracked definitions.
    // Note: For directories, include patterns for both the directory entry and its descendants,
    // otherwise walkers may still descend into the directory.
    for d in [
        ".git",
        "node_modules",
        "venv",
        ".venv",
        "__pycache__",
        ".mypy_cache",
        ".pytest_cache",
        ".tox",
        "target",
        "dist",
        "build",
        "coverage",
        ".next",
        ".nuxt",
        "out",
    ] {
        ob.add(&format!("!**/{d}"))?;
        ob.add(&format!("!**/{d}/**"))?;
    }

    // Minified bundles.
    ob.add("!**/*.min.js")?;

    // Project-specific excluded dirs
    for d in exclude_dir_names {
        let d = d.trim().trim_matches('/');
        if d.is_empty() {
            continue;
        }
        ob.add(&format!("!**/{d}"))?;
        ob.add(&format!("!**/{d}/**"))?;
    }

    Ok(ob.build()?)
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub abs_path: PathBuf,
    /// Relative to the scan root, `/`-separated.
    pub rel_path: String,
    pub language: Language,
}

/// Supported-language files under `root`, sorted by relative path.
///
/// Unsupported extensions, empty files and files above the size limit are
/// skipped silently.
pub fn discover_files(root: &Path, scan: &ScanConfig) -> Result<Vec<FileEntry>> {
    let meta = std::fs::metadata(root).map_err(|source| TrackError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    let max_bytes = scan.effective_max_file_bytes();

    if meta.is_file() {
        return Ok(single_file(root, meta.len(), max_bytes).into_iter().collect());
    }

    let overrides = default_overrides(root, &scan.exclude_dir_names)?;
    let walker = WalkBuilder::new(root)
        .standard_filters(true) // hidden, .gitignore, .ignore, etc.
        .git_ignore(scan.respect_gitignore)
        .git_global(scan.respect_gitignore)
        .git_exclude(scan.respect_gitignore)
        .ignore(scan.respect_gitignore)
        .require_git(false)
        .overrides(overrides)
        .build();

    let registry = language_registry();
    let mut entries = Vec::new();
    for item in walker {
        let dent = match item {
            Ok(d) => d,
            Err(e) => {
                debug!(error = %e, "walk entry skipped");
                continue;
            }
        };

        if !dent.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }

        let abs_path = dent.into_path();
        let Some(language) = registry.language_for_path(&abs_path) else {
            continue;
        };

        let bytes = match std::fs::metadata(&abs_path).map(|m| m.len()) {
            Ok(b) => b,
            Err(_) => continue,
        };
        if bytes == 0 || bytes > max_bytes {
            debug!(path = %abs_path.display(), bytes, "size filter");
            continue;
        }

        let Ok(rel) = abs_path.strip_prefix(root) else { continue };
        let rel_path = normalize_path_for_output(rel);

        entries.push(FileEntry {
            abs_path,
            rel_path,
            language,
        });
    }

    entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(entries)
}

fn single_file(path: &Path, bytes: u64, max_bytes: u64) -> Option<FileEntry> {
    let language = language_registry().language_for_path(path)?;
    if bytes == 0 || bytes > max_bytes {
        return None;
    }
    let rel_path = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| normalize_path_for_output(path));
    Some(FileEntry {
        abs_path: path.to_path_buf(),
        rel_path,
        language,
    })
}

pub fn normalize_path_for_output(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

// ---------------------------------------------------------------------------
// Definition cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CachedFile {
    hash: u64,
    definitions: Vec<FunctionDefinition>,
    header_offsets: HashSet<usize>,
}

/// Pass-1 results per file, keyed by relative path and checked against an
/// xxh3 hash of the bytes read in the current scan.
#[derive(Debug, Default)]
pub struct DefinitionCache {
    files: HashMap<String, CachedFile>,
}

impl DefinitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, rel: &str, hash: u64) -> Option<&CachedFile> {
        self.files.get(rel).filter(|c| c.hash == hash)
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ScanOutput {
    /// In scan order: files by relative path, definitions by offset.
    pub definitions: Vec<FunctionDefinition>,
    /// In scan order: files by relative path, calls by offset.
    pub usages: Vec<UsageSite>,
    pub files_scanned: usize,
    /// Files whose definitions came from the cache.
    pub cache_hits: usize,
    pub errors: Vec<ItemError>,
}

struct LoadedFile {
    rel: String,
    driver: &'static dyn LanguageDriver,
    text: String,
    lexed: Lexed,
    hash: u64,
}

/// Every function header in `source`, in file order.
pub fn extract_definitions(source: &str, language: Language, file: &str) -> Vec<FunctionDefinition> {
    let driver = language_registry().driver_for_language(language);
    let lexed = Lexed::new(source, language);
    definitions_in(&lexed, driver, file).0
}

fn definitions_in(
    lexed: &Lexed,
    driver: &dyn LanguageDriver,
    rel: &str,
) -> (Vec<FunctionDefinition>, HashSet<usize>) {
    let headers = driver.find_headers(lexed);
    let offsets = headers.iter().map(|h| h.name_offset).collect();
    let definitions = headers
        .iter()
        .map(|h| FunctionDefinition {
            signature: signature_from_header(lexed, h, driver),
            file: rel.to_string(),
            line: lexed.line_of(h.name_offset),
        })
        .collect();
    (definitions, offsets)
}

fn load(entry: &FileEntry, errors: &mut Vec<ItemError>) -> Option<LoadedFile> {
    let registry = language_registry();
    let Some(driver) = registry.driver_for_path(&entry.abs_path) else {
        let err = TrackError::UnsupportedLanguage(entry.abs_path.clone());
        debug!(file = %entry.rel_path, "{err}");
        return None;
    };

    let bytes = match std::fs::read(&entry.abs_path) {
        Ok(b) => b,
        Err(source) => {
            let err = TrackError::Io {
                path: entry.abs_path.clone(),
                source,
            };
            warn!(file = %entry.rel_path, "{err}");
            errors.push(ItemError::new(&entry.rel_path, None, &err));
            return None;
        }
    };
    let hash = xxh3_64(&bytes);
    let text = match String::from_utf8(bytes) {
        Ok(t) => t,
        Err(_) => {
            let err = TrackError::InvalidUtf8(entry.abs_path.clone());
            warn!(file = %entry.rel_path, "{err}");
            errors.push(ItemError::new(&entry.rel_path, None, &err));
            return None;
        }
    };

    let lexed = Lexed::new(&text, driver.language());
    Some(LoadedFile {
        rel: entry.rel_path.clone(),
        driver,
        text,
        lexed,
        hash,
    })
}

/// Scan `root` and return all definitions and usages in scan order.
///
/// Only an unreadable root fails the call; per-file problems are returned in
/// [`ScanOutput::errors`].
pub fn scan_codebase(root: &Path, scan: &ScanConfig, cache: &mut DefinitionCache) -> Result<ScanOutput> {
    let entries = discover_files(root, scan)?;
    debug!(root = %root.display(), files = entries.len(), "discovered files");

    let mut out = ScanOutput::default();
    let files: Vec<LoadedFile> = entries
        .iter()
        .filter_map(|e| load(e, &mut out.errors))
        .collect();
    out.files_scanned = files.len();

    // Pass 1: definitions across the whole file set.
    let mut header_offsets: Vec<HashSet<usize>> = Vec::with_capacity(files.len());
    let mut fresh: HashMap<String, CachedFile> = HashMap::with_capacity(files.len());
    for file in &files {
        let cached = match cache.get(&file.rel, file.hash) {
            Some(hit) => {
                out.cache_hits += 1;
                hit.clone()
            }
            None => {
                let (definitions, offsets) = definitions_in(&file.lexed, file.driver, &file.rel);
                CachedFile {
                    hash: file.hash,
                    definitions,
                    header_offsets: offsets,
                }
            }
        };
        debug!(file = %file.rel, definitions = cached.definitions.len(), "pass 1");
        out.definitions.extend(cached.definitions.iter().cloned());
        header_offsets.push(cached.header_offsets.clone());
        fresh.insert(file.rel.clone(), cached);
    }
    // Files that vanished from the tree drop out of the cache.
    cache.files = fresh;

    let names: HashSet<String> = out.definitions.iter().map(|d| d.name().to_string()).collect();

    // Pass 2: calls to any name defined anywhere in the tree.
    for (file, offsets) in files.iter().zip(&header_offsets) {
        let before = out.usages.len();
        for found in find_calls(&file.lexed, file.driver, &names, offsets) {
            match found {
                Ok(call) => {
                    let call_text = call.text(&file.text).to_string();
                    out.usages.push(UsageSite {
                        line: file.lexed.line_of(call.name_offset),
                        column: file.lexed.column_of(call.name_offset),
                        function_name: call.name,
                        file: file.rel.clone(),
                        call_text,
                        arguments: call.arguments.into_iter().map(|a| a.code).collect(),
                        member_call: call.member_call,
                    });
                }
                Err((offset, err)) => {
                    let line = file.lexed.line_of(offset);
                    warn!(file = %file.rel, line, "{err}");
                    out.errors.push(ItemError::new(&file.rel, Some(line), &err));
                }
            }
        }
        debug!(file = %file.rel, usages = out.usages.len() - before, "pass 2");
    }

    info!(
        root = %root.display(),
        files = out.files_scanned,
        definitions = out.definitions.len(),
        usages = out.usages.len(),
        cache_hits = out.cache_hits,
        errors = out.errors.len(),
        "scan complete"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }

    fn scan(root: &Path) -> ScanOutput {
        scan_codebase(root, &ScanConfig::default(), &mut DefinitionCache::new()).unwrap()
    }

    #[test]
    fn usages_found_before_their_definition_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a_caller.py", "from z_lib import helper\n\nhelper(1, 2)\n");
        write(dir.path(), "z_lib.py", "def helper(a, b):\n    return a + b\n");

        let out = scan(dir.path());
        assert_eq!(out.files_scanned, 2);
        assert_eq!(out.definitions.len(), 1);
        assert_eq!(out.definitions[0].file, "z_lib.py");
        assert_eq!(out.definitions[0].line, 1);

        assert_eq!(out.usages.len(), 1);
        let usage = &out.usages[0];
        assert_eq!(usage.file, "a_caller.py");
        assert_eq!(usage.line, 3);
        assert_eq!(usage.column, 1);
        assert_eq!(usage.call_text, "helper(1, 2)");
        assert_eq!(usage.arguments, vec!["1", "2"]);
    }

    #[test]
    fn definitions_counted_per_header_with_lines() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "pkg/mod.py",
            "import os\n\ndef one(a):\n    pass\n\n\nasync def two(b=1):\n    pass\n\nclass K:\n    def three(self, c):\n        pass\n",
        );
        write(dir.path(), "web/app.js", "function four(x) {\n  return x;\n}\nconst five = (y) => y;\n");

        let out = scan(dir.path());
        let found: Vec<(&str, &str, usize)> = out
            .definitions
            .iter()
            .map(|d| (d.name(), d.file.as_str(), d.line))
            .collect();
        assert_eq!(
            found,
            vec![
                ("one", "pkg/mod.py", 3),
                ("two", "pkg/mod.py", 7),
                ("three", "pkg/mod.py", 11),
                ("four", "web/app.js", 1),
                ("five", "web/app.js", 4),
            ]
        );
        assert!(out.usages.is_empty());
    }

    #[test]
    fn calls_in_comments_and_strings_are_not_usages() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "m.py",
            "def f(a):\n    pass\n\n# f(1)\nmsg = \"f(2)\"\nf(3)\n",
        );
        let out = scan(dir.path());
        assert_eq!(out.usages.len(), 1);
        assert_eq!(out.usages[0].line, 6);
    }

    #[test]
    fn noisy_dirs_unsupported_files_and_configured_names_are_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/main.ts", "function run(a: number) {}\n");
        write(dir.path(), "node_modules/dep/index.js", "function dep() {}\n");
        write(dir.path(), ".venv/lib/site.py", "def site():\n    pass\n");
        write(dir.path(), "generated/api.py", "def gen():\n    pass\n");
        write(dir.path(), "README.md", "def not_code():\n");

        let cfg = ScanConfig {
            exclude_dir_names: vec!["generated".into()],
            ..ScanConfig::default()
        };
        let files = discover_files(dir.path(), &cfg).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["src/main.ts"]);
        assert_eq!(files[0].language, Language::TypeScript);
    }

    #[test]
    fn gitignore_is_respected_unless_disabled() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".gitignore", "ignored/\n");
        write(dir.path(), "ignored/x.py", "def x():\n    pass\n");
        write(dir.path(), "kept.py", "def k():\n    pass\n");

        let on = discover_files(dir.path(), &ScanConfig::default()).unwrap();
        assert_eq!(on.len(), 1);

        let cfg = ScanConfig {
            respect_gitignore: false,
            ..ScanConfig::default()
        };
        let off = discover_files(dir.path(), &cfg).unwrap();
        assert_eq!(off.len(), 2);
    }

    #[test]
    fn oversized_and_empty_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "empty.py", "");
        write(dir.path(), "big.py", &"x = 1\n".repeat(100));
        write(dir.path(), "small.py", "def s():\n    pass\n");

        let cfg = ScanConfig {
            max_file_bytes: 100,
            ..ScanConfig::default()
        };
        let files = discover_files(dir.path(), &cfg).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["small.py"]);
    }

    #[test]
    fn invalid_utf8_is_reported_and_scan_continues() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.py"), [0x64, 0x65, 0x66, 0x20, 0xff, 0xfe, 0x0a]).unwrap();
        write(dir.path(), "good.py", "def g():\n    pass\n");

        let out = scan(dir.path());
        assert_eq!(out.files_scanned, 1);
        assert_eq!(out.definitions.len(), 1);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].file, "bad.py");
        assert_eq!(out.errors[0].kind, "invalid_utf8");
    }

    #[test]
    fn unbalanced_call_is_an_item_error() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "lib.py", "def f(a):\n    pass\n");
        write(dir.path(), "use.py", "x = 1\ny = f(1,\n");

        let out = scan(dir.path());
        assert!(out.usages.is_empty());
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].kind, "unbalanced_call");
        assert_eq!(out.errors[0].line, Some(2));
    }

    #[test]
    fn cache_reuses_unchanged_files_only() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.py", "def a(x):\n    pass\n");
        write(dir.path(), "b.py", "def b(y):\n    pass\n");

        let cfg = ScanConfig::default();
        let mut cache = DefinitionCache::new();
        let first = scan_codebase(dir.path(), &cfg, &mut cache).unwrap();
        assert_eq!(first.cache_hits, 0);
        assert_eq!(cache.files.len(), 2);

        write(dir.path(), "b.py", "def b(y, z=2):\n    pass\n");
        let second = scan_codebase(dir.path(), &cfg, &mut cache).unwrap();
        assert_eq!(second.cache_hits, 1);
        let b = second.definitions.iter().find(|d| d.name() == "b").unwrap();
        assert_eq!(b.signature.parameters.len(), 2);

        fs::remove_file(dir.path().join("a.py")).unwrap();
        scan_codebase(dir.path(), &cfg, &mut cache).unwrap();
        assert_eq!(cache.files.len(), 1);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = scan_codebase(&dir.path().join("nope"), &ScanConfig::default(), &mut DefinitionCache::new())
            .unwrap_err();
        assert!(matches!(err, TrackError::Io { .. }));
    }

    #[test]
    fn extract_definitions_from_source() {
        let defs = extract_definitions("def a(x):\n  pass\n\ndef b(y=2):\n  pass\n", Language::Python, "m.py");
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[1].line, 4);
        assert_eq!(defs[1].file, "m.py");
    }
}
