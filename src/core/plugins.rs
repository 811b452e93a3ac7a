//! # Plugin Verification Module / 插件验证模块
//!
//! This module proves that the target application's plugin-discovery
//! mechanism works end to end: the declared plugins are installed one by one,
//! a probe run with the discovery variable set must report every declared
//! plugin as loaded, and a probe run with the variable absent must report
//! none. The probe's standard output is parsed as a JSON array of plugin
//! names or of objects with a `name` field.
//!
//! 此模块端到端地证明目标应用的插件发现机制有效：
//! 声明的插件逐一安装，设置发现变量的探测运行必须报告每个声明的插件已加载，
//! 未设置变量的探测运行必须报告零个插件。
//! 探测的标准输出被解析为插件名称或带 `name` 字段对象的 JSON 数组。

use chrono::Utc;
use colored::*;
use std::time::{Duration, Instant};

use crate::{
    core::{
        config::PluginConfig,
        models::{StageKind, StageResult, StageStatus},
        stage::{RUNTIME_ENV, StageContext, parse_command_line, skipped_stage},
    },
    infra::{command, t},
};

/// The stage name the verifier's result is recorded under.
pub const STAGE_NAME: &str = "plugin-discovery";

/// Parses the probe's standard output: a JSON array whose elements are plugin
/// names or objects carrying a `name` field.
///
/// 解析探测的标准输出：一个 JSON 数组，其元素为插件名称或带 `name` 字段的对象。
pub fn parse_active_plugins(stdout: &str) -> Result<Vec<String>, String> {
    let value: serde_json::Value = serde_json::from_str(stdout.trim())
        .map_err(|e| format!("probe output is not valid JSON: {}", e))?;
    let array = value
        .as_array()
        .ok_or_else(|| "probe output is not a JSON array".to_string())?;

    let mut names = Vec::with_capacity(array.len());
    for item in array {
        match item {
            serde_json::Value::String(name) => names.push(name.clone()),
            serde_json::Value::Object(object) => {
                match object.get("name").and_then(|n| n.as_str()) {
                    Some(name) => names.push(name.to_string()),
                    None => return Err(format!("probe entry has no 'name' field: {}", item)),
                }
            }
            other => return Err(format!("unexpected probe entry: {}", other)),
        }
    }
    Ok(names)
}

/// What a single probe run produced.
enum ProbeOutcome {
    Active(Vec<String>),
    Failed(String),
    TimedOut(String),
    Cancelled,
}

/// Runs the probe once. `discovery` decides whether the discovery variable is
/// set to the given value or removed from the child's environment entirely.
/// 运行一次探测。`discovery` 决定发现变量被设置为给定值，
/// 还是从子进程环境中完全移除。
async fn run_probe(
    cfg: &PluginConfig,
    ctx: &StageContext<'_>,
    discovery: Option<&str>,
    transcript: &mut String,
) -> ProbeOutcome {
    let (parts, expanded) = match parse_command_line(&cfg.probe, &ctx.entry.runtime) {
        Ok(parsed) => parsed,
        Err(message) => return ProbeOutcome::Failed(message),
    };

    match discovery {
        Some(value) => transcript.push_str(&format!(
            "probe ({}={}):\n",
            cfg.discovery_env,
            if value.is_empty() { "<empty>" } else { value }
        )),
        None => transcript.push_str(&format!("probe ({} unset):\n", cfg.discovery_env)),
    }
    transcript.push_str(&format!("{} {}\n", t!("run.command_prefix"), expanded));

    let mut cmd = tokio::process::Command::new(&parts[0]);
    cmd.args(&parts[1..]).kill_on_drop(true);
    let cwd = match &cfg.working_dir {
        Some(dir) => ctx.project_root.join(dir),
        None => ctx.project_root.to_path_buf(),
    };
    cmd.current_dir(&cwd);
    cmd.env(RUNTIME_ENV, &ctx.entry.runtime);
    match discovery {
        Some(value) => {
            cmd.env(&cfg.discovery_env, value);
        }
        None => {
            // The orchestrator's own environment must not leak into the
            // negative probe.
            // 编排器自身的环境不得泄漏到反向探测中。
            cmd.env_remove(&cfg.discovery_env);
        }
    }

    let capture = command::spawn_and_capture_split(
        cmd,
        ctx.settings.output_limit_bytes,
        ctx.settings.effective_timeout(None),
        Some(&ctx.stop),
    )
    .await;

    transcript.push_str(&capture.stdout);
    if !capture.stdout.ends_with('\n') && !capture.stdout.is_empty() {
        transcript.push('\n');
    }
    if !capture.stderr.is_empty() {
        transcript.push_str(&capture.stderr);
        if !capture.stderr.ends_with('\n') {
            transcript.push('\n');
        }
    }

    if capture.cancelled {
        return ProbeOutcome::Cancelled;
    }
    if capture.timed_out {
        return ProbeOutcome::TimedOut("probe timed out".to_string());
    }
    match capture.status {
        Ok(status) if status.success() => match parse_active_plugins(&capture.stdout) {
            Ok(active) => ProbeOutcome::Active(active),
            Err(message) => ProbeOutcome::Failed(message),
        },
        Ok(status) => ProbeOutcome::Failed(format!("probe command failed ({})", status)),
        Err(e) => ProbeOutcome::Failed(format!("{}: {}", t!("run.spawn_failed"), e)),
    }
}

/// Installs one plugin using the configured template.
/// 使用配置的模板安装一个插件。
async fn install_plugin(
    template: &str,
    plugin: &str,
    cfg: &PluginConfig,
    ctx: &StageContext<'_>,
    transcript: &mut String,
) -> Result<(), ProbeOutcome> {
    println!("{}", t!("plugin.installing", plugin = plugin).blue());
    let raw = template.replace("{plugin}", plugin);
    let (parts, expanded) = match parse_command_line(&raw, &ctx.entry.runtime) {
        Ok(parsed) => parsed,
        Err(message) => return Err(ProbeOutcome::Failed(message)),
    };
    transcript.push_str(&format!("{} {}\n", t!("run.command_prefix"), expanded));

    let mut cmd = tokio::process::Command::new(&parts[0]);
    cmd.args(&parts[1..]).kill_on_drop(true);
    let cwd = match &cfg.working_dir {
        Some(dir) => ctx.project_root.join(dir),
        None => ctx.project_root.to_path_buf(),
    };
    cmd.current_dir(&cwd);
    cmd.env(RUNTIME_ENV, &ctx.entry.runtime);

    let capture = command::spawn_and_capture(
        cmd,
        ctx.settings.output_limit_bytes,
        ctx.settings.effective_timeout(None),
        Some(&ctx.stop),
    )
    .await;
    transcript.push_str(&capture.output);

    if capture.cancelled {
        return Err(ProbeOutcome::Cancelled);
    }
    if capture.timed_out {
        return Err(ProbeOutcome::TimedOut(format!(
            "installation of plugin '{}' timed out",
            plugin
        )));
    }
    match capture.status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(ProbeOutcome::Failed(format!(
            "plugin '{}' failed to install ({})",
            plugin, status
        ))),
        Err(e) => Err(ProbeOutcome::Failed(format!(
            "plugin '{}' failed to install: {}",
            plugin, e
        ))),
    }
}

/// Runs the whole verification for one matrix entry: installation in declared
/// order, the positive probe, then the negative probe. The first violation
/// fails the stage and names the plugin it concerns.
///
/// 为一个矩阵条目运行完整验证：按声明顺序安装、正向探测、反向探测。
/// 第一个违规会使该阶段失败，并指名涉及的插件。
pub async fn verify(cfg: &PluginConfig, ctx: &StageContext<'_>) -> StageResult {
    let runtime = &ctx.entry.runtime;

    if ctx.stop.is_cancelled() {
        return skipped_stage(STAGE_NAME, StageKind::PluginCheck, runtime, false, "run cancelled");
    }

    println!(
        "{}",
        t!("plugin.verifying", count = cfg.plugins.len()).blue()
    );

    let started_at = Utc::now();
    let timer = Instant::now();
    let mut transcript = String::new();

    // Installation, in declared order.
    if let Some(template) = &cfg.install {
        for plugin in &cfg.plugins {
            if let Err(outcome) =
                install_plugin(template, plugin, cfg, ctx, &mut transcript).await
            {
                return conclude(outcome, runtime, started_at, timer.elapsed(), transcript);
            }
        }
    }

    // Positive probe: every declared plugin must be observed; an empty
    // declared set must observe none.
    let joined = cfg.plugins.join(",");
    match run_probe(cfg, ctx, Some(&joined), &mut transcript).await {
        ProbeOutcome::Active(active) => {
            if cfg.plugins.is_empty() {
                if let Some(stray) = active.first() {
                    let message =
                        format!("plugin '{}' was loaded for an empty plugin set", stray);
                    return conclude(
                        ProbeOutcome::Failed(message),
                        runtime,
                        started_at,
                        timer.elapsed(),
                        transcript,
                    );
                }
            } else {
                let missing: Vec<&String> = cfg
                    .plugins
                    .iter()
                    .filter(|p| !active.iter().any(|a| a == *p))
                    .collect();
                if let Some(first_missing) = missing.first() {
                    let message =
                        format!("plugin '{}' was not reported as loaded", first_missing);
                    return conclude(
                        ProbeOutcome::Failed(message),
                        runtime,
                        started_at,
                        timer.elapsed(),
                        transcript,
                    );
                }
            }
        }
        outcome => return conclude(outcome, runtime, started_at, timer.elapsed(), transcript),
    }

    // Negative probe: with the discovery variable absent, nothing may load.
    match run_probe(cfg, ctx, None, &mut transcript).await {
        ProbeOutcome::Active(active) => {
            if let Some(stray) = active.first() {
                let message = format!(
                    "plugin '{}' was loaded with no discovery variable set",
                    stray
                );
                return conclude(
                    ProbeOutcome::Failed(message),
                    runtime,
                    started_at,
                    timer.elapsed(),
                    transcript,
                );
            }
        }
        outcome => return conclude(outcome, runtime, started_at, timer.elapsed(), transcript),
    }

    let duration = timer.elapsed();
    println!(
        "{}",
        t!("plugin.passed", count = cfg.plugins.len()).green()
    );
    if cfg.plugins.is_empty() {
        transcript.push_str("verified: no plugins load without the discovery variable\n");
    } else {
        transcript.push_str(&format!("verified: {}\n", cfg.plugins.join(", ")));
    }

    StageResult {
        stage: STAGE_NAME.to_string(),
        kind: StageKind::PluginCheck,
        runtime: runtime.clone(),
        status: StageStatus::Passed,
        exit_code: Some(0),
        started_at,
        duration,
        output: transcript,
        truncated: false,
        allow_failure: false,
        skip_reason: None,
    }
}

/// Turns a non-passing probe outcome into the stage result.
fn conclude(
    outcome: ProbeOutcome,
    runtime: &str,
    started_at: chrono::DateTime<Utc>,
    duration: Duration,
    transcript: String,
) -> StageResult {
    let (status, skip_reason) = match &outcome {
        ProbeOutcome::Cancelled => (StageStatus::Skipped, Some("run cancelled".to_string())),
        ProbeOutcome::TimedOut(_) => (StageStatus::TimedOut, None),
        _ => (StageStatus::Failed, None),
    };
    let mut output = transcript;
    if let ProbeOutcome::TimedOut(message) | ProbeOutcome::Failed(message) = &outcome {
        output.push_str(message);
        output.push('\n');
    }
    if status != StageStatus::Skipped {
        println!("{}", t!("plugin.failed").red());
    }

    StageResult {
        stage: STAGE_NAME.to_string(),
        kind: StageKind::PluginCheck,
        runtime: runtime.to_string(),
        status,
        exit_code: None,
        started_at,
        duration,
        output,
        truncated: false,
        allow_failure: false,
        skip_reason,
    }
}
