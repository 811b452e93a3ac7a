// Shared test helpers for integration tests
use std::fs;
use std::path::PathBuf;
use tempfile::{TempDir, tempdir};

use stagehand::core::models::{EntryReport, RunReport, StageResult};

/// Creates an empty temporary directory that acts as the project root the
/// stages run in.
pub fn setup_project() -> TempDir {
    tempdir().expect("Failed to create temporary project directory")
}

/// Writes a `Stagehand.toml` with the given content into the project
/// directory and returns its path.
pub fn write_config(project: &TempDir, content: &str) -> PathBuf {
    let config_path = project.path().join("Stagehand.toml");
    fs::write(&config_path, content).expect("Failed to write Stagehand.toml");
    config_path
}

/// Writes an arbitrary file (a helper script, a committed document) into the
/// project directory and returns its path. Parent directories are created as
/// needed.
pub fn write_file(project: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = project.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(&path, content).expect("Failed to write file");
    path
}

/// Reads a `--json` report back into the typed run report.
pub fn read_report(path: &std::path::Path) -> RunReport {
    let content = fs::read_to_string(path).expect("Failed to read JSON report");
    serde_json::from_str(&content).expect("Failed to parse JSON report")
}

/// Finds a stage result by name within one matrix entry's report.
pub fn find_result<'a>(entry: &'a EntryReport, stage: &str) -> &'a StageResult {
    entry
        .results
        .iter()
        .find(|r| r.stage == stage)
        .unwrap_or_else(|| panic!("no result recorded for stage '{}'", stage))
}
