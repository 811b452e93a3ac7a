//! # File System Helpers Unit Tests / 文件系统辅助函数单元测试
//!
//! This module contains comprehensive unit tests for the `fs.rs` module,
//! covering name sanitization, atomic report writing, failure log
//! preservation and path resolution.
//!
//! 此模块包含 `fs.rs` 模块的全面单元测试，
//! 涵盖名称清理、原子报告写出、失败日志保存和路径解析。

use chrono::Utc;
use stagehand::core::models::{EntryReport, RunReport, StageKind, StageResult, StageStatus};
use stagehand::infra::fs::{absolute_path, preserve_failure_logs, sanitized_name, write_atomically};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

/// Creates a stage result with the given status and transcript for testing.
/// 创建具有给定状态和输出记录的阶段结果用于测试。
fn make_result(stage: &str, status: StageStatus, allow_failure: bool, output: &str) -> StageResult {
    StageResult {
        stage: stage.to_string(),
        kind: StageKind::Test,
        runtime: "3.11".to_string(),
        status,
        exit_code: None,
        started_at: Utc::now(),
        duration: Duration::from_secs(1),
        output: output.to_string(),
        truncated: false,
        allow_failure,
        skip_reason: None,
    }
}

/// Wraps the given results into a single-entry run report.
/// 将给定结果包装成单条目运行报告。
fn make_report(runtime: &str, results: Vec<StageResult>) -> RunReport {
    RunReport {
        version: "0.1.0".to_string(),
        started_at: Utc::now(),
        duration: Duration::from_secs(1),
        cancelled: false,
        entries: vec![EntryReport {
            runtime: runtime.to_string(),
            results,
        }],
    }
}

#[cfg(test)]
mod sanitized_name_tests {
    use super::*;

    #[test]
    fn test_separators_become_underscores() {
        assert_eq!(sanitized_name("integration/api v2"), "integration_api_v2");
    }

    #[test]
    fn test_alphanumeric_names_pass_through() {
        assert_eq!(sanitized_name("unit123"), "unit123");
    }

    #[test]
    fn test_dots_and_dashes_are_replaced() {
        assert_eq!(sanitized_name("3.11-beta"), "3_11_beta");
    }
}

#[cfg(test)]
mod write_atomically_tests {
    use super::*;

    #[test]
    fn test_writes_content_to_the_target() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");

        write_atomically(&path, "{\"ok\":true}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"ok\":true}");
    }

    #[test]
    fn test_replaces_an_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        fs::write(&path, "old").unwrap();

        write_atomically(&path, "new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn test_creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports/nested/report.html");

        write_atomically(&path, "<html></html>").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "<html></html>");
    }

    #[test]
    fn test_leaves_no_temporary_files_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");

        write_atomically(&path, "content").unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["report.json"]);
    }
}

#[cfg(test)]
mod preserve_failure_logs_tests {
    use super::*;

    #[test]
    fn test_only_unexpected_failures_are_preserved() {
        let dir = tempdir().unwrap();
        let report = make_report(
            "3.11",
            vec![
                make_result("passed", StageStatus::Passed, false, "fine"),
                make_result("allowed", StageStatus::Failed, true, "tolerated"),
                make_result("broken", StageStatus::Failed, false, "boom\n"),
            ],
        );

        let written = preserve_failure_logs(&report, dir.path()).unwrap();

        assert_eq!(written, 1);
        let log = dir.path().join("3_11").join("broken.log");
        assert_eq!(fs::read_to_string(log).unwrap(), "boom\n");
        assert!(!dir.path().join("3_11").join("passed.log").exists());
        assert!(!dir.path().join("3_11").join("allowed.log").exists());
    }

    #[test]
    fn test_stage_names_are_sanitized_in_log_paths() {
        let dir = tempdir().unwrap();
        let report = make_report(
            "3.11",
            vec![make_result(
                "integration/api",
                StageStatus::TimedOut,
                false,
                "stuck",
            )],
        );

        let written = preserve_failure_logs(&report, dir.path()).unwrap();

        assert_eq!(written, 1);
        let log = dir.path().join("3_11").join("integration_api.log");
        assert_eq!(fs::read_to_string(log).unwrap(), "stuck");
    }

    #[test]
    fn test_clean_report_writes_nothing() {
        let dir = tempdir().unwrap();
        let report = make_report(
            "3.11",
            vec![make_result("unit", StageStatus::Passed, false, "fine")],
        );

        let written = preserve_failure_logs(&report, dir.path()).unwrap();

        assert_eq!(written, 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

#[cfg(test)]
mod absolute_path_tests {
    use super::*;

    #[test]
    fn test_resolves_dot_components() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("file.txt"), "x").unwrap();

        let resolved = absolute_path(&dir.path().join("sub/../file.txt")).unwrap();

        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("file.txt"));
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let dir = tempdir().unwrap();

        let err = absolute_path(&dir.path().join("missing")).unwrap_err();

        assert!(err.to_string().contains("Failed to resolve path"));
    }
}
