use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::config::{load_config, Config};
use crate::detector::{detect, detect_definition, ParameterChanges, SignatureDiff};
use crate::error::{ItemError, Result, TrackError};
use crate::index::FunctionIndex;
use crate::inspector::language_registry;
use crate::model::{Language, Suggestion};
use crate::scanner::{extract_definitions, normalize_path_for_output, scan_codebase, DefinitionCache};
use crate::synthesizer::synthesize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefinitionEntry {
    pub file: String,
    pub signature_text: String,
    pub line: usize,
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub definitions: BTreeMap<String, DefinitionEntry>,
    pub usages: BTreeMap<String, Vec<Location>>,
    pub files_scanned: usize,
    /// Names defined more than once; the index keeps the last one in scan order.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub duplicates: BTreeMap<String, Vec<Location>>,
    pub errors: Vec<ItemError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangedFunction {
    pub function: String,
    pub file: String,
    pub line: usize,
    pub old_signature: String,
    pub new_signature: String,
    pub changes: ParameterChanges,
}

impl From<&SignatureDiff> for ChangedFunction {
    fn from(diff: &SignatureDiff) -> Self {
        Self {
            function: diff.function_name().to_string(),
            file: diff.new.file.clone(),
            line: diff.new.line,
            old_signature: diff.old.signature.render(),
            new_signature: diff.new.signature.render(),
            changes: diff.changes.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectReport {
    pub update_suggestions: Vec<Suggestion>,
    pub changed_functions: Vec<ChangedFunction>,
    /// Usages left without a suggestion because they could not be rewritten.
    pub skipped_usages: usize,
    pub needs_review: Vec<Suggestion>,
    pub errors: Vec<ItemError>,
}

/// Owns the function index and answers `scan` / `detect_change` requests.
pub struct FunctionTracker {
    index: FunctionIndex,
    config: ArcSwap<Config>,
    /// When set, `scan` keeps this config instead of reading the root's config file.
    pinned_config: bool,
    root: Mutex<Option<PathBuf>>,
    cache: Mutex<DefinitionCache>,
}

impl Default for FunctionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionTracker {
    pub fn new() -> Self {
        Self {
            index: FunctionIndex::new(),
            config: ArcSwap::from_pointee(Config::default()),
            pinned_config: false,
            root: Mutex::new(None),
            cache: Mutex::new(DefinitionCache::new()),
        }
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            pinned_config: true,
            ..Self::new()
        }
    }

    pub fn index(&self) -> &FunctionIndex {
        &self.index
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.load_full()
    }

    /// Root of the last successful scan.
    pub fn root(&self) -> Option<PathBuf> {
        lock(&self.root).clone()
    }

    /// Rebuild the index from `root`.
    pub fn scan(&self, root: &Path) -> Result<ScanReport> {
        if !self.pinned_config {
            self.config.store(Arc::new(load_config(root)));
        }
        let config = self.config.load_full();

        let out = {
            let mut cache = lock(&self.cache);
            scan_codebase(root, &config.scan, &mut cache)?
        };

        let mut report = ScanReport {
            files_scanned: out.files_scanned,
            errors: out.errors,
            ..ScanReport::default()
        };

        let mut seen: BTreeMap<String, Vec<Location>> = BTreeMap::new();
        for def in &out.definitions {
            seen.entry(def.name().to_string()).or_default().push(Location {
                file: def.file.clone(),
                line: def.line,
            });
        }
        report.duplicates = seen.into_iter().filter(|(_, locs)| locs.len() > 1).collect();

        self.index.rebuild(out.definitions, out.usages);

        for def in self.index.definitions() {
            let entry = DefinitionEntry {
                signature_text: def.signature.render(),
                line: def.line,
                language: def.signature.language,
                file: def.file,
            };
            report.definitions.insert(def.signature.function_name, entry);
        }
        for usage in self.index.usages() {
            report.usages.entry(usage.function_name).or_default().push(Location {
                file: usage.file,
                line: usage.line,
            });
        }
        *lock(&self.root) = Some(root.to_path_buf());

        info!(
            root = %root.display(),
            definitions = report.definitions.len(),
            duplicates = report.duplicates.len(),
            "index rebuilt"
        );
        Ok(report)
    }

    /// Treat `code` as an updated definition in `file_path` and propose call-site rewrites.
    ///
    /// Never fails: problems come back in [`DetectReport::errors`].
    pub fn detect_change(&self, file_path: &str, code: &str) -> DetectReport {
        let mut report = DetectReport::default();
        let file = self.relative_file(file_path);
        let Some(language) = language_registry().language_for_path(Path::new(file_path)) else {
            let err = TrackError::UnsupportedLanguage(PathBuf::from(file_path));
            report.errors.push(ItemError::new(&file, None, &err));
            return report;
        };

        match detect(&self.index, &file, code, language) {
            Ok(Some(diff)) => self.suggest(&diff, &mut report),
            Ok(None) => debug!(file = %file, "no signature change"),
            Err(err) => {
                debug!(file = %file, "{err}");
                report.errors.push(ItemError::new(&file, None, &err));
            }
        }
        report
    }

    /// Run detection for every function header in a whole source file.
    pub fn detect_file_changes(&self, file_path: &str, source: &str) -> DetectReport {
        let mut report = DetectReport::default();
        let file = self.relative_file(file_path);
        let Some(language) = language_registry().language_for_path(Path::new(file_path)) else {
            let err = TrackError::UnsupportedLanguage(PathBuf::from(file_path));
            report.errors.push(ItemError::new(&file, None, &err));
            return report;
        };

        let definitions = extract_definitions(source, language, &file);
        if definitions.is_empty() {
            let err = TrackError::Parse(format!("no {language} function header found"));
            report.errors.push(ItemError::new(&file, None, &err));
            return report;
        }
        for def in definitions {
            if let Some(diff) = detect_definition(&self.index, def) {
                self.suggest(&diff, &mut report);
            }
        }
        report
    }

    fn suggest(&self, diff: &SignatureDiff, report: &mut DetectReport) {
        let usages = self.index.usages_of(diff.function_name());
        let config = self.config.load();
        let synthesized = synthesize(diff, &usages, &config.suggestions);
        info!(
            function = %diff.function_name(),
            usages = usages.len(),
            suggestions = synthesized.suggestions.len(),
            skipped = synthesized.skipped,
            needs_review = synthesized.needs_review.len(),
            "suggestions built"
        );

        report.changed_functions.push(ChangedFunction::from(diff));
        report.update_suggestions.extend(synthesized.suggestions);
        report.needs_review.extend(synthesized.needs_review);
        report.skipped_usages += synthesized.skipped;
        report.errors.extend(synthesized.errors);
    }

    /// Index paths are relative to the scanned root; accept absolute paths under it too.
    fn relative_file(&self, file_path: &str) -> String {
        let path = Path::new(file_path);
        if path.is_absolute() {
            if let Some(root) = lock(&self.root).as_deref() {
                if let Ok(rel) = path.strip_prefix(root) {
                    return normalize_path_for_output(rel);
                }
            }
        }
        let path: PathBuf = path.components().filter(|c| !matches!(c, Component::CurDir)).collect();
        normalize_path_for_output(&path)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RemovedArgumentPolicy, SuggestionConfig, CONFIG_FILE_NAME};
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("lib.py"),
            "def area(w, h=1):\n    return w * h\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("main.py"),
            "from lib import area\n\nprint(area(2, 3))\nprint(area(4))\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn scan_reports_definitions_usages_and_duplicates() {
        let dir = fixture();
        fs::write(dir.path().join("other.py"), "def area(r):\n    return r\n").unwrap();

        let tracker = FunctionTracker::new();
        let report = tracker.scan(dir.path()).unwrap();
        assert_eq!(report.files_scanned, 3);
        let area = &report.definitions["area"];
        // other.py sorts after lib.py, so it wins.
        assert_eq!(area.file, "other.py");
        assert_eq!(area.signature_text, "area(r)");
        assert_eq!(report.duplicates["area"].len(), 2);
        let lines: Vec<usize> = report.usages["area"].iter().map(|l| l.line).collect();
        assert_eq!(lines, vec![3, 4]);
    }

    #[test]
    fn detect_change_rewrites_usages() {
        let dir = fixture();
        let tracker = FunctionTracker::new();
        tracker.scan(dir.path()).unwrap();

        let report = tracker.detect_change("lib.py", "def area(w, h=1, scale=1.0):\n    return w * h * scale\n");
        assert_eq!(report.changed_functions.len(), 1);
        assert_eq!(report.changed_functions[0].changes.added, vec!["scale"]);
        let new: Vec<&str> = report.update_suggestions.iter().map(|s| s.new_code.as_str()).collect();
        assert_eq!(new, vec!["area(2, 3, 1.0)", "area(4, 1, 1.0)"]);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn absolute_paths_under_the_root_are_relativised() {
        let dir = fixture();
        let tracker = FunctionTracker::new();
        tracker.scan(dir.path()).unwrap();

        let abs = dir.path().join("lib.py");
        let report = tracker.detect_change(&abs.to_string_lossy(), "def area(w):\n    pass\n");
        assert_eq!(report.changed_functions[0].file, "lib.py");
        assert_eq!(report.changed_functions[0].line, 1);
    }

    #[test]
    fn dot_relative_paths_match_the_index() {
        let dir = fixture();
        let tracker = FunctionTracker::new();
        assert!(tracker.root().is_none());
        tracker.scan(dir.path()).unwrap();
        assert_eq!(tracker.root().as_deref(), Some(dir.path()));

        let report = tracker.detect_change("./lib.py", "\n\ndef area(w, h=2):\n    pass\n");
        assert_eq!(report.changed_functions[0].file, "lib.py");
        // Indexed line, not the line inside the fragment.
        assert_eq!(report.changed_functions[0].line, 1);
        assert_eq!(report.update_suggestions.len(), 2);
    }

    #[test]
    fn unsupported_and_unparsable_inputs_are_error_entries() {
        let tracker = FunctionTracker::new();
        let report = tracker.detect_change("notes.txt", "def f(a):");
        assert!(report.update_suggestions.is_empty());
        assert_eq!(report.errors[0].kind, "unsupported_language");

        let report = tracker.detect_change("lib.py", "just text");
        assert!(report.update_suggestions.is_empty());
        assert_eq!(report.errors[0].kind, "parse_error");
        assert!(report.errors[0].message.contains("could not detect a function signature"));
    }

    #[test]
    fn config_file_in_root_is_loaded_by_scan() {
        let dir = fixture();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "suggestions": { "removed_arguments": "flag" } }"#,
        )
        .unwrap();
        let tracker = FunctionTracker::new();
        tracker.scan(dir.path()).unwrap();
        assert_eq!(tracker.config().suggestions.removed_arguments, RemovedArgumentPolicy::Flag);

        let report = tracker.detect_change("lib.py", "def area(w):\n    pass\n");
        assert_eq!(report.update_suggestions.len(), 1);
        assert_eq!(report.update_suggestions[0].new_code, "area(4)");
        assert_eq!(report.needs_review.len(), 1);
        assert_eq!(report.needs_review[0].dropped_arguments, vec!["3"]);
    }

    #[test]
    fn pinned_config_survives_scan() {
        let dir = fixture();
        let tracker = FunctionTracker::with_config(Config {
            suggestions: SuggestionConfig {
                skip_same_file_usages: true,
                ..SuggestionConfig::default()
            },
            ..Config::default()
        });
        tracker.scan(dir.path()).unwrap();
        assert!(tracker.config().suggestions.skip_same_file_usages);
    }

    #[test]
    fn whole_file_detection_checks_every_header() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("lib.js"), "function a(x) {}\nfunction b(y) {}\n").unwrap();
        fs::write(dir.path().join("app.js"), "a(1);\nb(2);\n").unwrap();
        let tracker = FunctionTracker::new();
        tracker.scan(dir.path()).unwrap();

        let report = tracker.detect_file_changes(
            "lib.js",
            "function a(x, z = 0) {}\n\nfunction b(y) {}\n",
        );
        assert_eq!(report.changed_functions.len(), 1);
        assert_eq!(report.changed_functions[0].function, "a");
        assert_eq!(report.update_suggestions[0].new_code, "a(1, 0)");
    }
}
