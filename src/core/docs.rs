//! # Documentation Consistency Module / 文档一致性模块
//!
//! This module re-runs the generator command behind each committed
//! documentation fragment and compares the fresh output against the file in
//! the repository. Comparison happens after normalization, so line-ending and
//! trailing-whitespace differences never fail a check; real drift produces a
//! line diff in the stage output. Checks run once per run, not once per
//! matrix entry, because their output does not depend on the runtime version.
//!
//! 此模块重新运行每个已提交文档片段背后的生成器命令，
//! 并将新输出与仓库中的文件比较。比较在规范化之后进行，
//! 因此行尾和行尾空白差异不会使检查失败；真正的偏移会在阶段输出中产生行级差异。
//! 检查每次运行执行一次而非每个矩阵条目一次，因为其输出不依赖运行时版本。

use chrono::Utc;
use colored::*;
use similar::{ChangeTag, TextDiff};
use std::time::Instant;

use crate::{
    core::{
        config::DocCheck,
        models::{StageKind, StageResult, StageStatus},
        stage::{RUNTIME_ENV, StageContext, parse_command_line, skipped_stage},
    },
    infra::{command, t},
};

/// Normalizes a documentation fragment for comparison: CRLF becomes LF,
/// trailing whitespace is stripped from every line and the fragment ends with
/// exactly one newline.
///
/// 规范化文档片段以供比较：CRLF 变为 LF，去除每行行尾空白，
/// 片段以恰好一个换行符结尾。
pub fn normalize_fragment(fragment: &str) -> String {
    let unified = fragment.replace("\r\n", "\n");
    let mut normalized: String = unified
        .split('\n')
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    while normalized.ends_with('\n') {
        normalized.pop();
    }
    normalized.push('\n');
    normalized
}

/// Renders a line diff between the committed fragment and the regenerated
/// one, in the order a reviewer expects: committed first, regenerated second.
///
/// 渲染已提交片段与重新生成片段之间的行级差异，
/// 顺序符合审阅者的预期：先是已提交内容，再是重新生成内容。
pub fn render_diff(path: &str, committed: &str, regenerated: &str) -> String {
    let diff = TextDiff::from_lines(committed, regenerated);
    let mut rendered = format!("--- {} (committed)\n+++ {} (regenerated)\n", path, path);
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        rendered.push_str(sign);
        rendered.push_str(change.value());
        if !change.value().ends_with('\n') {
            rendered.push('\n');
        }
    }
    rendered
}

/// Runs one documentation check: regenerate, normalize, compare.
///
/// # Arguments
/// * `doc` - The check configuration
/// * `ctx` - The execution context for the current matrix entry
///
/// # Returns
/// A `StageResult` carrying the diff when the fragment drifted
///
/// 运行一次文档检查：重新生成、规范化、比较。
pub async fn check(doc: &DocCheck, ctx: &StageContext<'_>) -> StageResult {
    let runtime = &ctx.entry.runtime;

    if ctx.stop.is_cancelled() {
        return skipped_stage(&doc.name, StageKind::DocCheck, runtime, false, "run cancelled");
    }

    println!("{}", t!("docs.checking", name = &doc.name).blue());
    let started_at = Utc::now();
    let timer = Instant::now();

    let committed_path = ctx.project_root.join(&doc.path);
    let committed = match std::fs::read_to_string(&committed_path) {
        Ok(content) => content,
        Err(e) => {
            println!("{}", t!("docs.failed", name = &doc.name).red());
            return StageResult {
                stage: doc.name.clone(),
                kind: StageKind::DocCheck,
                runtime: runtime.clone(),
                status: StageStatus::Failed,
                exit_code: None,
                started_at,
                duration: timer.elapsed(),
                output: format!(
                    "committed file '{}' could not be read: {}",
                    committed_path.display(),
                    e
                ),
                truncated: false,
                allow_failure: false,
                skip_reason: None,
            };
        }
    };

    let (cmd, expanded) = match build_doc_command(doc, ctx) {
        Ok(built) => built,
        Err(message) => {
            println!("{}", t!("docs.failed", name = &doc.name).red());
            return StageResult {
                stage: doc.name.clone(),
                kind: StageKind::DocCheck,
                runtime: runtime.clone(),
                status: StageStatus::Failed,
                exit_code: None,
                started_at,
                duration: timer.elapsed(),
                output: message,
                truncated: false,
                allow_failure: false,
                skip_reason: None,
            };
        }
    };

    let capture = command::spawn_and_capture_split(
        cmd,
        ctx.settings.output_limit_bytes,
        ctx.settings.effective_timeout(None),
        Some(&ctx.stop),
    )
    .await;
    let duration = timer.elapsed();
    let command_log = format!("{} {}\n", t!("run.command_prefix"), expanded);

    if capture.cancelled {
        return skipped_stage(&doc.name, StageKind::DocCheck, runtime, false, "run cancelled");
    }

    let (status, exit_code, output, drifted) = match capture.status {
        Ok(status) if capture.timed_out => (
            StageStatus::TimedOut,
            status.code(),
            format!("{command_log}generator timed out\n{}", capture.stderr),
            false,
        ),
        Ok(status) if status.success() => {
            let committed_norm = normalize_fragment(&committed);
            let regenerated_norm = normalize_fragment(&capture.stdout);
            let path = doc.path.display().to_string();
            if committed_norm == regenerated_norm {
                (
                    StageStatus::Passed,
                    status.code(),
                    format!("{command_log}'{}' is in sync with its generator\n", path),
                    false,
                )
            } else {
                let diff = render_diff(&path, &committed_norm, &regenerated_norm);
                (
                    StageStatus::Failed,
                    status.code(),
                    format!(
                        "{command_log}documentation drift detected in '{}'\n{}",
                        path, diff
                    ),
                    true,
                )
            }
        }
        Ok(status) => (
            StageStatus::Failed,
            status.code(),
            format!(
                "{command_log}generator failed ({})\n{}{}",
                status, capture.stdout, capture.stderr
            ),
            false,
        ),
        Err(e) => (
            StageStatus::Failed,
            None,
            format!("{command_log}{}: {}", t!("run.spawn_failed"), e),
            false,
        ),
    };

    match status {
        StageStatus::Passed => println!("{}", t!("docs.in_sync", name = &doc.name).green()),
        _ if drifted => {
            let path = doc.path.display();
            println!("{}", t!("docs.drift", name = &doc.name, path = path).red());
        }
        _ => println!("{}", t!("docs.failed", name = &doc.name).red()),
    }

    StageResult {
        stage: doc.name.clone(),
        kind: StageKind::DocCheck,
        runtime: runtime.clone(),
        status,
        exit_code,
        started_at,
        duration,
        output,
        truncated: capture.truncated,
        allow_failure: false,
        skip_reason: None,
    }
}

/// Runs every configured documentation check, strictly one after another so
/// generators that touch shared state cannot race each other.
/// 依次运行每个配置的文档检查，严格串行，使修改共享状态的生成器不会相互竞争。
pub async fn check_all(docs: &[DocCheck], ctx: &StageContext<'_>) -> Vec<StageResult> {
    let mut results = Vec::with_capacity(docs.len());
    for doc in docs {
        results.push(check(doc, ctx).await);
    }
    results
}

fn build_doc_command(
    doc: &DocCheck,
    ctx: &StageContext<'_>,
) -> Result<(tokio::process::Command, String), String> {
    let (parts, expanded) = parse_command_line(&doc.command, &ctx.entry.runtime)?;

    let mut cmd = tokio::process::Command::new(&parts[0]);
    cmd.args(&parts[1..]).kill_on_drop(true);
    let cwd = match &doc.working_dir {
        Some(dir) => ctx.project_root.join(dir),
        None => ctx.project_root.to_path_buf(),
    };
    cmd.current_dir(&cwd);
    cmd.env(RUNTIME_ENV, &ctx.entry.runtime);

    Ok((cmd, expanded))
}
