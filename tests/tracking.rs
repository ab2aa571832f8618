use sigdrift::FunctionTracker;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const ANALYTICS: &str = "\
import statistics


def process_data(data, threshold=0.5):
    \"\"\"Keep values above the threshold.\"\"\"
    return [d for d in data if d > threshold]


def summarize(values):
    return statistics.mean(values)
";

const REPORT: &str = "\
from analytics import process_data, summarize


def load_records():
    return [0.2, 0.8, 0.95]


def build_report():
    records = load_records()
    records.sort()
    # Slightly stricter than the default.
    filtered = process_data(records, 0.7)
    return summarize(filtered)
";

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

fn two_file_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "analytics.py", ANALYTICS);
    write(dir.path(), "report.py", REPORT);
    dir
}

#[test]
fn added_parameter_with_default_rewrites_the_call_site() {
    let dir = two_file_repo();
    let tracker = FunctionTracker::new();
    let scan = tracker.scan(dir.path()).unwrap();
    assert_eq!(scan.usages["process_data"].len(), 1);
    assert_eq!(scan.usages["process_data"][0].line, 12);

    let report = tracker.detect_change(
        "analytics.py",
        "def process_data(data, threshold=0.5, normalize=False):\n    return data\n",
    );
    assert_eq!(report.update_suggestions.len(), 1);
    let s = &report.update_suggestions[0];
    assert_eq!(s.function_name, "process_data");
    assert_eq!(s.file, "report.py");
    assert_eq!(s.line, 12);
    assert_eq!(s.old_code, "process_data(records, 0.7)");
    assert_eq!(s.new_code, "process_data(records, 0.7, False)");
    assert_eq!(report.skipped_usages, 0);
    assert!(report.errors.is_empty());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["update_suggestions"][0]["function"], "process_data");
    assert!(json["update_suggestions"][0].get("dropped_arguments").is_none());
}

#[test]
fn every_definition_is_indexed_with_its_line() {
    let dir = two_file_repo();
    let tracker = FunctionTracker::new();
    let scan = tracker.scan(dir.path()).unwrap();

    let mut found: Vec<(&str, &str, usize)> = scan
        .definitions
        .iter()
        .map(|(name, d)| (name.as_str(), d.file.as_str(), d.line))
        .collect();
    found.sort();
    assert_eq!(
        found,
        vec![
            ("build_report", "report.py", 8),
            ("load_records", "report.py", 4),
            ("process_data", "analytics.py", 4),
            ("summarize", "analytics.py", 9),
        ]
    );
    assert!(scan.duplicates.is_empty());
}

#[test]
fn scanning_twice_gives_the_same_report() {
    let dir = two_file_repo();
    let tracker = FunctionTracker::new();
    let first = serde_json::to_value(tracker.scan(dir.path()).unwrap()).unwrap();
    let second = serde_json::to_value(tracker.scan(dir.path()).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn whitespace_only_edit_is_not_a_change() {
    let dir = two_file_repo();
    let tracker = FunctionTracker::new();
    tracker.scan(dir.path()).unwrap();

    let report = tracker.detect_change(
        "analytics.py",
        "def process_data( data,\n                  threshold = 0.5 ):\n    return []\n",
    );
    assert!(report.update_suggestions.is_empty());
    assert!(report.changed_functions.is_empty());
    assert!(report.errors.is_empty());
}

#[test]
fn baseline_moves_forward_after_a_detected_change() {
    let dir = two_file_repo();
    let tracker = FunctionTracker::new();
    tracker.scan(dir.path()).unwrap();

    let changed = "def process_data(data, threshold=0.5, normalize=False):\n    return data\n";
    assert_eq!(tracker.detect_change("analytics.py", changed).update_suggestions.len(), 1);
    assert!(tracker.detect_change("analytics.py", changed).update_suggestions.is_empty());

    // A rescan restores the on-disk definition.
    tracker.scan(dir.path()).unwrap();
    assert_eq!(tracker.detect_change("analytics.py", changed).update_suggestions.len(), 1);
}

#[test]
fn removed_parameter_is_dropped_from_calls() {
    let dir = two_file_repo();
    let tracker = FunctionTracker::new();
    tracker.scan(dir.path()).unwrap();

    let report = tracker.detect_change("analytics.py", "def process_data(data):\n    return data\n");
    let s = &report.update_suggestions[0];
    assert_eq!(s.new_code, "process_data(records)");
    assert_eq!(s.dropped_arguments, vec!["0.7"]);
    assert_eq!(report.changed_functions[0].changes.removed, vec!["threshold"]);
}

#[test]
fn new_parameter_without_default_skips_the_usage() {
    let dir = two_file_repo();
    let tracker = FunctionTracker::new();
    tracker.scan(dir.path()).unwrap();

    let report = tracker.detect_change(
        "analytics.py",
        "def process_data(data, threshold=0.5, mode):\n    return data\n",
    );
    assert!(report.update_suggestions.is_empty());
    assert_eq!(report.skipped_usages, 1);
    assert_eq!(report.errors[0].kind, "missing_default_for_new_parameter");
    assert_eq!(report.errors[0].file, "report.py");
    assert_eq!(report.errors[0].line, Some(12));
}

#[test]
fn cross_language_repo_tracks_typescript_callers() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "src/api/client.ts",
        "export async function fetchUser(id: string, opts: Options = {}): Promise<User> {\n  return get(id, opts);\n}\n",
    );
    write(
        dir.path(),
        "src/pages/profile.ts",
        "import { fetchUser } from '../api/client';\n\nexport const load = async () => {\n  const user = await fetchUser(params.id);\n  return user;\n};\n",
    );
    write(dir.path(), "node_modules/pkg/index.js", "fetchUser(1);\n");

    let tracker = FunctionTracker::new();
    let scan = tracker.scan(dir.path()).unwrap();
    assert_eq!(scan.files_scanned, 2);
    assert_eq!(scan.usages["fetchUser"].len(), 1);
    assert_eq!(scan.usages["fetchUser"][0].file, "src/pages/profile.ts");

    let report = tracker.detect_change(
        "src/api/client.ts",
        "export async function fetchUser(opts: Options = {}, id: string): Promise<User> {\n}",
    );
    assert_eq!(report.update_suggestions[0].new_code, "fetchUser({}, params.id)");
    assert!(report.changed_functions[0].changes.reordered);
}
