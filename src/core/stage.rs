//! # Stage Execution Engine Module / 阶段执行引擎模块
//!
//! This module provides the core functionality for executing a single stage:
//! placeholder substitution, command parsing, working directory and
//! environment setup, bounded output capture, timeout enforcement and
//! cancellation. Every outcome becomes a `StageResult`; stage failures never
//! crash the orchestrator.
//!
//! 此模块为执行单个阶段提供核心功能：
//! 占位符替换、命令解析、工作目录和环境设置、有界输出捕获、
//! 超时强制执行和取消。所有结果都会成为 `StageResult`；阶段失败不会使编排器崩溃。

use chrono::Utc;
use colored::*;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        config::{Settings, StageSpec},
        matrix::MatrixEntry,
        models::{StageKind, StageResult, StageStatus},
    },
    infra::{command, t},
};

/// The environment variable carrying the current matrix entry's runtime
/// version into every spawned stage.
pub const RUNTIME_ENV: &str = "STAGEHAND_RUNTIME";

/// The environment variable carrying the current stage's name into the
/// spawned process.
pub const STAGE_ENV: &str = "STAGEHAND_STAGE";

/// Everything a stage execution needs besides its own spec: the matrix entry
/// it runs under, the resolved project root, the global settings and the
/// run's stop token.
///
/// 阶段执行除自身配置外所需的一切：所处的矩阵条目、
/// 解析后的项目根目录、全局设置和运行的停止令牌。
#[derive(Debug, Clone)]
pub struct StageContext<'a> {
    pub entry: &'a MatrixEntry,
    pub project_root: &'a Path,
    pub settings: &'a Settings,
    pub stop: CancellationToken,
}

/// Builds a result for a stage that never ran.
/// 为从未运行的阶段构建结果。
pub fn skipped_stage(
    name: &str,
    kind: StageKind,
    runtime: &str,
    allow_failure: bool,
    reason: &str,
) -> StageResult {
    StageResult {
        stage: name.to_string(),
        kind,
        runtime: runtime.to_string(),
        status: StageStatus::Skipped,
        exit_code: None,
        started_at: Utc::now(),
        duration: Duration::from_secs(0),
        output: String::new(),
        truncated: false,
        allow_failure,
        skip_reason: Some(reason.to_string()),
    }
}

/// Substitutes the `{runtime}` placeholder, expands a leading `~` and splits
/// the command line into a program and its arguments. Variable references are
/// left alone so they resolve in the spawned process's environment.
///
/// 替换 `{runtime}` 占位符，展开开头的 `~`，并将命令行拆分为程序及其参数。
/// 变量引用保持原样，以便在生成进程的环境中解析。
pub(crate) fn parse_command_line(raw: &str, runtime: &str) -> Result<(Vec<String>, String), String> {
    let substituted = raw.replace("{runtime}", runtime);
    let expanded = shellexpand::tilde(&substituted).to_string();
    match shlex::split(&expanded) {
        Some(parts) if !parts.is_empty() => Ok((parts, expanded)),
        _ => Err(format!("Failed to parse command: {}", expanded)),
    }
}

/// Builds the `tokio::process::Command` for a stage: parsed program and
/// arguments, resolved working directory, inherited environment with the
/// stage's overrides applied on top, and the runtime exported.
///
/// 为阶段构建 `tokio::process::Command`：解析后的程序和参数、
/// 解析后的工作目录、在继承环境之上应用阶段覆盖，并导出运行时版本。
fn build_command(
    spec: &StageSpec,
    ctx: &StageContext<'_>,
) -> Result<(tokio::process::Command, String), String> {
    let (parts, expanded) = parse_command_line(&spec.command, &ctx.entry.runtime)?;

    let mut cmd = tokio::process::Command::new(&parts[0]);
    cmd.args(&parts[1..]).kill_on_drop(true);

    let cwd = match &spec.working_dir {
        Some(dir) => ctx.project_root.join(dir),
        None => ctx.project_root.to_path_buf(),
    };
    cmd.current_dir(&cwd);

    cmd.env(RUNTIME_ENV, &ctx.entry.runtime);
    cmd.env(STAGE_ENV, &spec.name);
    // Overrides win over the inherited environment on collision.
    // 覆盖项在冲突时优先于继承的环境。
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    Ok((cmd, expanded))
}

/// The main entry point for running a single stage. All limits come from the
/// context: the timeout (stage-level over the global default), the output
/// byte cap and the stop token.
///
/// # Arguments
/// * `spec` - The stage configuration to execute
/// * `kind` - The category the result is recorded under
/// * `ctx` - The execution context for the current matrix entry
///
/// # Returns
/// A `StageResult` indicating the outcome of the execution
///
/// 运行单个阶段的主入口。所有限制都来自上下文：
/// 超时（阶段级优先于全局默认）、输出字节上限和停止令牌。
pub async fn execute_stage(
    spec: &StageSpec,
    kind: StageKind,
    ctx: &StageContext<'_>,
) -> StageResult {
    let runtime = &ctx.entry.runtime;

    if ctx.stop.is_cancelled() {
        println!(
            "{}",
            t!("run.stage_skipped_cancelled", name = &spec.name, runtime = runtime).yellow()
        );
        return skipped_stage(
            &spec.name,
            kind,
            runtime,
            spec.allow_failure,
            "run cancelled",
        );
    }

    println!(
        "{}",
        t!("run.stage_running", name = &spec.name, runtime = runtime).blue()
    );

    let started_at = Utc::now();
    let timer = Instant::now();

    let (cmd, expanded) = match build_command(spec, ctx) {
        Ok(built) => built,
        Err(message) => {
            println!(
                "{}",
                t!("run.stage_failed", name = &spec.name, duration = "0.00").red()
            );
            return StageResult {
                stage: spec.name.clone(),
                kind,
                runtime: runtime.clone(),
                status: StageStatus::Failed,
                exit_code: None,
                started_at,
                duration: timer.elapsed(),
                output: message,
                truncated: false,
                allow_failure: spec.allow_failure,
                skip_reason: None,
            };
        }
    };

    let timeout = ctx.settings.effective_timeout(spec.timeout_secs);
    let capture = command::spawn_and_capture(
        cmd,
        ctx.settings.output_limit_bytes,
        timeout,
        Some(&ctx.stop),
    )
    .await;
    let duration = timer.elapsed();

    let command_log = format!("{} {}\n", t!("run.command_prefix"), expanded);
    let output = format!("{command_log}{}", capture.output);

    let (status, exit_code) = match capture.status {
        Ok(status) => {
            let exit_code = status.code();
            if capture.cancelled {
                (StageStatus::Skipped, exit_code)
            } else if capture.timed_out {
                (StageStatus::TimedOut, exit_code)
            } else if status.success() {
                (StageStatus::Passed, exit_code)
            } else {
                (StageStatus::Failed, exit_code)
            }
        }
        Err(e) => {
            let output = format!("{command_log}{}: {}", t!("run.spawn_failed"), e);
            println!(
                "{}",
                t!("run.stage_failed", name = &spec.name, duration = "0.00").red()
            );
            return StageResult {
                stage: spec.name.clone(),
                kind,
                runtime: runtime.clone(),
                status: StageStatus::Failed,
                exit_code: None,
                started_at,
                duration,
                output,
                truncated: false,
                allow_failure: spec.allow_failure,
                skip_reason: None,
            };
        }
    };

    let duration_str = format!("{:.2}", duration.as_secs_f64());
    match status {
        StageStatus::Passed => println!(
            "{}",
            t!("run.stage_passed", name = &spec.name, duration = &duration_str).green()
        ),
        StageStatus::TimedOut => {
            let limit = timeout.map(|d| d.as_secs()).unwrap_or_default();
            println!(
                "{}",
                t!("run.stage_timeout", name = &spec.name, timeout = limit).red()
            );
        }
        StageStatus::Skipped => println!(
            "{}",
            t!("run.stage_skipped_cancelled", name = &spec.name, runtime = runtime).yellow()
        ),
        StageStatus::Failed => println!(
            "{}",
            t!("run.stage_failed", name = &spec.name, duration = &duration_str).red()
        ),
    }

    StageResult {
        stage: spec.name.clone(),
        kind,
        runtime: runtime.clone(),
        status,
        exit_code,
        started_at,
        duration,
        output,
        truncated: capture.truncated,
        allow_failure: spec.allow_failure,
        skip_reason: (status == StageStatus::Skipped).then(|| "run cancelled".to_string()),
    }
}
