use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name looked up at the root of every scanned tree.
pub const CONFIG_FILE_NAME: &str = ".sigdrift.json";

/// Hard safety ceiling: files larger than this are **always** skipped, regardless of config.
/// Minified bundles and generated dumps are never worth lexing.
pub const ABSOLUTE_MAX_FILE_BYTES: u64 = 1_000_000; // 1 MB

/// Controls workspace scanning behavior (what to skip).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory *names* to skip anywhere in the tree (e.g. "generated", "tmp").
    ///
    /// These are compared against path components, not full paths.
    pub exclude_dir_names: Vec<String>,
    /// Files above this size are skipped. Clamped to [`ABSOLUTE_MAX_FILE_BYTES`].
    pub max_file_bytes: u64,
    /// Honour `.gitignore` / `.ignore` files while walking.
    pub respect_gitignore: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude_dir_names: vec![],
            // 512 KB: fits any hand-written source file.
            max_file_bytes: 512 * 1024,
            respect_gitignore: true,
        }
    }
}

impl ScanConfig {
    pub fn effective_max_file_bytes(&self) -> u64 {
        self.max_file_bytes.min(ABSOLUTE_MAX_FILE_BYTES)
    }
}

/// What to do with a call site that passes an argument for a parameter that no longer exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovedArgumentPolicy {
    /// Rewrite the call without the argument and list it in `dropped_arguments`.
    #[default]
    Drop,
    /// Leave the call alone and report it under `needs_review`.
    Flag,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    pub removed_arguments: RemovedArgumentPolicy,
    /// Ignore call sites located in the file whose definition changed.
    pub skip_same_file_usages: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings that govern file discovery and exclusion.
    pub scan: ScanConfig,
    /// Settings that govern call-site rewrites.
    pub suggestions: SuggestionConfig,
}

pub fn load_config(repo_root: &Path) -> Config {
    let primary = repo_root.join(CONFIG_FILE_NAME);

    let text = std::fs::read_to_string(&primary);
    let Ok(text) = text else { return Config::default() };

    match serde_json::from_str::<Config>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(path = %primary.display(), error = %e, "ignoring malformed config");
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config(dir.path());
        assert_eq!(cfg.scan.max_file_bytes, 512 * 1024);
        assert!(cfg.scan.respect_gitignore);
        assert_eq!(cfg.suggestions.removed_arguments, RemovedArgumentPolicy::Drop);
        assert!(!cfg.suggestions.skip_same_file_usages);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "scan": { "exclude_dir_names": ["generated"] }, "suggestions": { "removed_arguments": "flag" } }"#,
        )
        .unwrap();
        let cfg = load_config(dir.path());
        assert_eq!(cfg.scan.exclude_dir_names, vec!["generated".to_string()]);
        assert_eq!(cfg.scan.max_file_bytes, 512 * 1024);
        assert_eq!(cfg.suggestions.removed_arguments, RemovedArgumentPolicy::Flag);
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{ not json").unwrap();
        let cfg = load_config(dir.path());
        assert!(cfg.scan.exclude_dir_names.is_empty());
    }

    #[test]
    fn max_file_bytes_is_clamped() {
        let scan = ScanConfig {
            max_file_bytes: 50_000_000,
            ..ScanConfig::default()
        };
        assert_eq!(scan.effective_max_file_bytes(), ABSOLUTE_MAX_FILE_BYTES);
    }
}
