//! # Parallel Scheduling Integration Tests / 并行调度集成测试
//!
//! This module tests the partitioned execution model end to end: the
//! parallel fan-out, the barrier in front of the serial group, failure
//! draining, timeouts, the matrix narrowing flags and the exported
//! environment contract.
//!
//! 此模块端到端测试分区执行模型：并行扇出、串行组前的屏障、
//! 失败收集、超时、矩阵收窄参数以及导出的环境变量约定。

use assert_cmd::prelude::*;
use chrono::TimeDelta;
use predicates::prelude::*;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

mod common;
use common::{find_result, read_report, setup_project, write_config};

/// Builds a `stagehand run` invocation against the given project. English
/// output keeps the assertions below locale-independent.
/// 针对给定项目构建 `stagehand run` 调用。
/// 英文输出使下方断言与系统语言无关。
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

#[cfg(test)]
mod scheduling_tests {
    use super::*;

    /// Serial stages must not start before every parallel stage has
    /// finished, even when a parallel slot is still sleeping.
    /// 串行阶段必须等所有并行阶段结束后才开始，
    /// 即使仍有并行槽位在休眠。
    #[test]
    fn test_serial_stage_waits_for_the_parallel_barrier() {
        let project = setup_project();
        let config_path = write_config(
            &project,
            r#"
runtimes = ["system"]

[[stages]]
name = "b-parallel"
command = "sh -c 'sleep 0.5; echo b'"

[[stages]]
name = "a-parallel"
command = "sh -c 'sleep 0.5; echo a'"

[[stages]]
name = "serial-check"
command = "sh -c 'echo serial'"
group = "serial"
"#,
        );
        let report_path = project.path().join("report.json");

        run_cmd(&project, &config_path)
            .arg("--json")
            .arg(&report_path)
            .assert()
            .success();

        let report = read_report(&report_path);
        let entry = &report.entries[0];

        let order: Vec<&str> = entry.results.iter().map(|r| r.stage.as_str()).collect();
        assert_eq!(order, vec!["a-parallel", "b-parallel", "serial-check"]);

        let serial = find_result(entry, "serial-check");
        for parallel in ["a-parallel", "b-parallel"] {
            let stage = find_result(entry, parallel);
            assert!(
                serial.started_at - stage.started_at >= TimeDelta::milliseconds(400),
                "serial stage started before the parallel barrier drained"
            );
        }
    }

    /// One failing parallel stage must not cancel its siblings and must not
    /// skip the serial phase.
    /// 单个并行阶段失败不得取消其兄弟阶段，也不得跳过串行阶段。
    #[test]
    fn test_parallel_failure_does_not_cancel_siblings_or_serial() {
        let project = setup_project();
        let config_path = write_config(
            &project,
            r#"
runtimes = ["system"]

[[stages]]
name = "fails-fast"
command = "sh -c 'exit 3'"

[[stages]]
name = "slow-sibling"
command = "sh -c 'sleep 0.4; echo done'"

[[stages]]
name = "serial-final"
command = "sh -c 'echo serial ran'"
group = "serial"
"#,
        );
        let report_path = project.path().join("report.json");

        run_cmd(&project, &config_path)
            .arg("--json")
            .arg(&report_path)
            .assert()
            .failure()
            .code(1)
            .stdout(predicate::str::contains(
                "The run finished with unexpected failures.",
            ));

        let report = read_report(&report_path);
        let entry = &report.entries[0];

        let failed = find_result(entry, "fails-fast");
        assert_eq!(failed.exit_code, Some(3));
        assert!(failed.is_unexpected_failure());

        assert!(!find_result(entry, "slow-sibling").is_failure());
        assert!(!find_result(entry, "serial-final").is_failure());
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_single_job_serializes_the_parallel_group() {
        let project = setup_project();
        let config_path = write_config(
            &project,
            r#"
runtimes = ["system"]

[[stages]]
name = "a-slot"
command = "sh -c 'sleep 0.3'"

[[stages]]
name = "b-slot"
command = "sh -c 'sleep 0.3'"
"#,
        );
        let report_path = project.path().join("report.json");

        run_cmd(&project, &config_path)
            .arg("-j")
            .arg("1")
            .arg("--json")
            .arg(&report_path)
            .assert()
            .success();

        let report = read_report(&report_path);
        let entry = &report.entries[0];
        let first = find_result(entry, "a-slot");
        let second = find_result(entry, "b-slot");

        assert!(
            second.started_at - first.started_at >= TimeDelta::milliseconds(250),
            "both stages ran concurrently despite a job limit of one"
        );
    }
}

#[cfg(test)]
mod timeout_tests {
    use super::*;
    use stagehand::core::models::StageStatus;

    #[test]
    fn test_stage_timeout_is_enforced() {
        let project = setup_project();
        let config_path = write_config(
            &project,
            r#"
runtimes = ["system"]

[[stages]]
name = "stuck"
command = "sh -c 'sleep 5'"
timeout_secs = 1
"#,
        );
        let report_path = project.path().join("report.json");

        run_cmd(&project, &config_path)
            .arg("--json")
            .arg(&report_path)
            .assert()
            .failure()
            .code(1)
            .stdout(predicate::str::contains(
                "Stage 'stuck' timed out after 1s and was terminated.",
            ));

        let report = read_report(&report_path);
        let stuck = find_result(&report.entries[0], "stuck");
        assert_eq!(stuck.status, StageStatus::TimedOut);
        assert!(stuck.is_unexpected_failure());
    }

    #[test]
    fn test_global_timeout_applies_when_the_stage_has_none() {
        let project = setup_project();
        let config_path = write_config(
            &project,
            r#"
runtimes = ["system"]

[settings]
timeout_secs = 1

[[stages]]
name = "stuck"
command = "sh -c 'sleep 5'"
"#,
        );

        run_cmd(&project, &config_path)
            .assert()
            .failure()
            .code(1)
            .stdout(predicate::str::contains(
                "Stage 'stuck' timed out after 1s and was terminated.",
            ));
    }
}

#[cfg(test)]
mod matrix_cli_tests {
    use super::*;

    /// Writes a three-runtime pipeline with one probe stage.
    /// 写出带一个探测阶段的三运行时流水线。
    fn three_runtime_config(project: &TempDir) -> std::path::PathBuf {
        write_config(
            project,
            r#"
runtimes = ["3.10", "3.11", "3.12"]

[[stages]]
name = "probe"
command = "sh -c 'echo probe'"
"#,
        )
    }

    #[test]
    fn test_runner_split_assigns_alternating_entries() {
        let project = setup_project();
        let config_path = three_runtime_config(&project);
        let report_path = project.path().join("report.json");

        run_cmd(&project, &config_path)
            .arg("--total-runners")
            .arg("2")
            .arg("--runner-index")
            .arg("0")
            .arg("--json")
            .arg(&report_path)
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Running as runner 1/2: 2 matrix entries assigned.",
            ));

        let report = read_report(&report_path);
        let runtimes: Vec<&str> = report.entries.iter().map(|e| e.runtime.as_str()).collect();
        assert_eq!(runtimes, vec!["3.10", "3.12"]);
    }

    #[test]
    fn test_second_runner_takes_the_remaining_entry() {
        let project = setup_project();
        let config_path = three_runtime_config(&project);
        let report_path = project.path().join("report.json");

        run_cmd(&project, &config_path)
            .arg("--total-runners")
            .arg("2")
            .arg("--runner-index")
            .arg("1")
            .arg("--json")
            .arg(&report_path)
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Running as runner 2/2: 1 matrix entries assigned.",
            ));

        let report = read_report(&report_path);
        let runtimes: Vec<&str> = report.entries.iter().map(|e| e.runtime.as_str()).collect();
        assert_eq!(runtimes, vec!["3.11"]);
    }

    #[test]
    fn test_empty_shard_is_a_clean_run() {
        let project = setup_project();
        let config_path = write_config(
            &project,
            r#"
runtimes = ["system"]

[[stages]]
name = "probe"
command = "sh -c 'echo probe'"
"#,
        );

        run_cmd(&project, &config_path)
            .arg("--total-runners")
            .arg("2")
            .arg("--runner-index")
            .arg("1")
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Nothing to run: the matrix resolved to zero entries.",
            ));
    }

    #[test]
    fn test_runtime_filter_reports_the_removed_count() {
        let project = setup_project();
        let config_path = three_runtime_config(&project);

        run_cmd(&project, &config_path)
            .arg("--runtime")
            .arg("3.11")
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "--runtime filter removed 2 configured runtime(s); 1 left to run.",
            ))
            .stdout(predicate::str::contains("=== Runtime 3.11 (1/1) ==="));
    }

    #[test]
    fn test_each_matrix_entry_gets_a_banner() {
        let project = setup_project();
        let config_path = three_runtime_config(&project);

        run_cmd(&project, &config_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("=== Runtime 3.10 (1/3) ==="))
            .stdout(predicate::str::contains("=== Runtime 3.11 (2/3) ==="))
            .stdout(predicate::str::contains("=== Runtime 3.12 (3/3) ==="));
    }
}

#[cfg(test)]
mod environment_tests {
    use super::*;

    #[test]
    fn test_runtime_placeholder_and_variables_are_exported() {
        let project = setup_project();
        let config_path = write_config(
            &project,
            r#"
runtimes = ["3.11"]

[[stages]]
name = "env-probe"
command = "sh -c 'echo runtime=$STAGEHAND_RUNTIME stage=$STAGEHAND_STAGE version={runtime}'"
"#,
        );
        let report_path = project.path().join("report.json");

        run_cmd(&project, &config_path)
            .arg("--json")
            .arg(&report_path)
            .assert()
            .success();

        let report = read_report(&report_path);
        let probe = find_result(&report.entries[0], "env-probe");
        assert!(
            probe
                .output
                .contains("runtime=3.11 stage=env-probe version=3.11")
        );
    }

    #[test]
    fn test_stage_environment_overrides_win() {
        let project = setup_project();
        let config_path = write_config(
            &project,
            r#"
runtimes = ["3.11"]

[[stages]]
name = "override"
command = "sh -c 'echo value=$STAGEHAND_RUNTIME custom=$MY_FLAG'"

[stages.env]
STAGEHAND_RUNTIME = "overridden"
MY_FLAG = "on"
"#,
        );
        let report_path = project.path().join("report.json");

        run_cmd(&project, &config_path)
            .arg("--json")
            .arg(&report_path)
            .assert()
            .success();

        let report = read_report(&report_path);
        let result = find_result(&report.entries[0], "override");
        assert!(result.output.contains("value=overridden custom=on"));
    }

    #[test]
    fn test_output_is_truncated_at_the_limit() {
        let project = setup_project();
        let config_path = write_config(
            &project,
            r#"
runtimes = ["system"]

[settings]
output_limit_bytes = 64

[[stages]]
name = "chatty"
command = "sh -c 'yes 0123456789 | head -n 50'"
"#,
        );
        let report_path = project.path().join("report.json");

        run_cmd(&project, &config_path)
            .arg("--json")
            .arg(&report_path)
            .assert()
            .success();

        let report = read_report(&report_path);
        let chatty = find_result(&report.entries[0], "chatty");
        assert!(chatty.truncated);
        assert!(chatty.output.starts_with("command: "));
    }
}

#[cfg(test)]
mod suite_scheduling_tests {
    use super::*;
    use stagehand::core::config::{Settings, StageSpec};
    use stagehand::core::matrix::MatrixEntry;
    use stagehand::core::models::{StageStatus, TestGroup};
    use stagehand::core::stage::StageContext;
    use stagehand::core::suite::run_partitioned;
    use std::collections::BTreeMap;
    use tokio_util::sync::CancellationToken;

    /// Builds a parallel echo stage for scheduling tests.
    /// 为调度测试构建一个并行 echo 阶段。
    fn echo_stage(name: &str, group: TestGroup) -> StageSpec {
        StageSpec {
            name: name.to_string(),
            command: format!("sh -c 'echo {}'", name),
            group,
            ..StageSpec::default()
        }
    }

    #[tokio::test]
    async fn test_results_order_parallel_sorted_then_serial_declared() {
        let project = setup_project();
        let entry = MatrixEntry {
            runtime: "3.11".to_string(),
        };
        let settings = Settings::default();
        let ctx = StageContext {
            entry: &entry,
            project_root: project.path(),
            settings: &settings,
            stop: CancellationToken::new(),
        };
        let stages = vec![
            echo_stage("zeta", TestGroup::Parallel),
            echo_stage("alpha", TestGroup::Parallel),
            echo_stage("second-serial", TestGroup::Serial),
            echo_stage("first-serial", TestGroup::Serial),
        ];

        let results = run_partitioned(&stages, &BTreeMap::new(), &ctx, 4).await;

        let order: Vec<&str> = results.iter().map(|r| r.stage.as_str()).collect();
        assert_eq!(
            order,
            vec!["alpha", "zeta", "second-serial", "first-serial"]
        );
        assert!(results.iter().all(|r| r.status == StageStatus::Passed));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_every_stage() {
        let project = setup_project();
        let entry = MatrixEntry {
            runtime: "3.11".to_string(),
        };
        let settings = Settings::default();
        let stop = CancellationToken::new();
        stop.cancel();
        let ctx = StageContext {
            entry: &entry,
            project_root: project.path(),
            settings: &settings,
            stop,
        };
        let stages = vec![
            echo_stage("parallel-one", TestGroup::Parallel),
            echo_stage("serial-one", TestGroup::Serial),
        ];

        let results = run_partitioned(&stages, &BTreeMap::new(), &ctx, 2).await;

        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(result.status, StageStatus::Skipped);
            assert_eq!(result.skip_reason.as_deref(), Some("run cancelled"));
        }
    }

    #[tokio::test]
    async fn test_fixture_blocked_stage_is_skipped_with_the_reason() {
        let project = setup_project();
        let entry = MatrixEntry {
            runtime: "3.11".to_string(),
        };
        let settings = Settings::default();
        let ctx = StageContext {
            entry: &entry,
            project_root: project.path(),
            settings: &settings,
            stop: CancellationToken::new(),
        };
        let mut blocked_stage = echo_stage("needs-db", TestGroup::Parallel);
        blocked_stage.needs = vec!["db".to_string()];
        let stages = vec![blocked_stage, echo_stage("independent", TestGroup::Parallel)];

        let mut blocked = BTreeMap::new();
        blocked.insert("db".to_string(), "timed out".to_string());

        let results = run_partitioned(&stages, &blocked, &ctx, 2).await;

        let skipped = results.iter().find(|r| r.stage == "needs-db").unwrap();
        assert_eq!(skipped.status, StageStatus::Skipped);
        assert_eq!(
            skipped.skip_reason.as_deref(),
            Some("fixture 'db' unavailable (timed out)")
        );

        let independent = results.iter().find(|r| r.stage == "independent").unwrap();
        assert_eq!(independent.status, StageStatus::Passed);
    }
}
