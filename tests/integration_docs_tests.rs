//! # Documentation Check Integration Tests / 文档检查集成测试
//!
//! This module tests the documentation consistency checks end to end:
//! normalization tolerance, drift detection with a line diff, generator
//! failures and the once-per-run scheduling.
//!
//! 此模块端到端测试文档一致性检查：规范化容差、
//! 带行级差异的漂移检测、生成器失败以及每次运行一次的调度。

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

mod common;
use common::{find_result, read_report, setup_project, write_config, write_file};

/// Builds a `stagehand run` invocation against the given project.
/// 针对给定项目构建 `stagehand run` 调用。
fn run_cmd(project: &TempDir, config_path: &Path) -> Command {
    let mut cmd = Command::cargo_bin("stagehand").unwrap();
    cmd.arg("run")
        .arg("--lang")
        .arg("en")
        .arg("--config")
        .arg(config_path)
        .arg("--project-dir")
        .arg(project.path());
    cmd
}

/// Writes a pipeline with a single doc check backed by `sh gen.sh`.
/// 写出以 `sh gen.sh` 为生成器的单个文档检查流水线。
fn docs_config(project: &TempDir, runtimes: &str) -> std::path::PathBuf {
    write_config(
        project,
        &format!(
            r#"
runtimes = {runtimes}

[[docs]]
name = "cli-docs"
command = "sh gen.sh"
path = "docs/cli.md"
"#
        ),
    )
}

#[cfg(test)]
mod comparison_tests {
    use super::*;

    #[test]
    fn test_matching_fragment_passes() {
        let project = setup_project();
        write_file(&project, "gen.sh", "printf '# CLI\\n\\nusage: app run\\n'\n");
        write_file(&project, "docs/cli.md", "# CLI\n\nusage: app run\n");
        let config_path = docs_config(&project, r#"["system"]"#);
        let report_path = project.path().join("report.json");

        run_cmd(&project, &config_path)
            .arg("--json")
            .arg(&report_path)
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Documentation 'cli-docs' is in sync.",
            ));

        let report = read_report(&report_path);
        let check = find_result(&report.entries[0], "cli-docs");
        assert!(check.output.contains("'docs/cli.md' is in sync with its generator"));
    }

    /// CRLF line endings and trailing whitespace in the committed file must
    /// not fail the check.
    /// 已提交文件中的 CRLF 行尾和行尾空白不得使检查失败。
    #[test]
    fn test_line_ending_and_whitespace_differences_are_tolerated() {
        let project = setup_project();
        write_file(&project, "gen.sh", "printf '# CLI\\n\\nusage: app run\\n'\n");
        write_file(&project, "docs/cli.md", "# CLI  \r\n\r\nusage: app run\r\n\r\n");
        let config_path = docs_config(&project, r#"["system"]"#);

        run_cmd(&project, &config_path).assert().success();
    }

    #[test]
    fn test_drift_fails_with_a_line_diff() {
        let project = setup_project();
        write_file(
            &project,
            "gen.sh",
            "printf 'usage: app run\\nflags: --json\\n'\n",
        );
        write_file(&project, "docs/cli.md", "usage: app run\nflags: none\n");
        let config_path = docs_config(&project, r#"["system"]"#);
        let report_path = project.path().join("report.json");

        run_cmd(&project, &config_path)
            .arg("--json")
            .arg(&report_path)
            .assert()
            .failure()
            .code(5)
            .stdout(predicate::str::contains("Documentation drift in 'cli-docs'"));

        let report = read_report(&report_path);
        let check = find_result(&report.entries[0], "cli-docs");
        assert!(
            check
                .output
                .contains("documentation drift detected in 'docs/cli.md'")
        );
        assert!(check.output.contains("--- docs/cli.md (committed)"));
        assert!(check.output.contains("-flags: none"));
        assert!(check.output.contains("+flags: --json"));
        assert_eq!(report.exit_code(), 5);
    }

    #[test]
    fn test_missing_committed_file_fails() {
        let project = setup_project();
        write_file(&project, "gen.sh", "printf 'content\\n'\n");
        let config_path = docs_config(&project, r#"["system"]"#);
        let report_path = project.path().join("report.json");

        run_cmd(&project, &config_path)
            .arg("--json")
            .arg(&report_path)
            .assert()
            .failure()
            .code(5);

        let report = read_report(&report_path);
        let check = find_result(&report.entries[0], "cli-docs");
        assert!(check.output.contains("could not be read"));
    }

    #[test]
    fn test_generator_failure_fails_the_check() {
        let project = setup_project();
        write_file(&project, "gen.sh", "echo broken >&2; exit 3\n");
        write_file(&project, "docs/cli.md", "content\n");
        let config_path = docs_config(&project, r#"["system"]"#);
        let report_path = project.path().join("report.json");

        run_cmd(&project, &config_path)
            .arg("--json")
            .arg(&report_path)
            .assert()
            .failure()
            .code(5);

        let report = read_report(&report_path);
        let check = find_result(&report.entries[0], "cli-docs");
        assert!(check.output.contains("generator failed"));
        assert!(check.output.contains("broken"));
    }
}

#[cfg(test)]
mod scheduling_tests {
    use super::*;
    use stagehand::core::models::StageKind;

    /// Doc checks do not depend on the runtime version, so a multi-entry
    /// matrix runs them exactly once.
    /// 文档检查不依赖运行时版本，因此多条目矩阵只运行它们一次。
    #[test]
    fn test_doc_checks_run_once_per_run() {
        let project = setup_project();
        write_file(
            &project,
            "gen.sh",
            "echo run >> gen-count.txt; printf 'content\\n'\n",
        );
        write_file(&project, "docs/cli.md", "content\n");
        let config_path = docs_config(&project, r#"["3.10", "3.11"]"#);
        let report_path = project.path().join("report.json");

        run_cmd(&project, &config_path)
            .arg("--json")
            .arg(&report_path)
            .assert()
            .success();

        let gen_count = fs::read_to_string(project.path().join("gen-count.txt")).unwrap();
        assert_eq!(gen_count.lines().count(), 1);

        let report = read_report(&report_path);
        assert_eq!(report.entries.len(), 2);
        assert!(
            report.entries[0]
                .results
                .iter()
                .any(|r| r.kind == StageKind::DocCheck)
        );
        assert!(
            report.entries[1]
                .results
                .iter()
                .all(|r| r.kind != StageKind::DocCheck)
        );
    }
}
