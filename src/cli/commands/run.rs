//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command for the Stagehand CLI: it loads
//! and validates the pipeline, resolves the runtime matrix, then drives
//! fixtures, the partitioned test suite and the independent checks for every
//! matrix entry, and finally emits the configured reports.
//!
//! 此模块实现 Stagehand CLI 的 `run` 命令：加载并验证流水线、解析运行时矩阵，
//! 然后为每个矩阵条目驱动夹具、分区测试套件和独立检查，最后生成配置的报告。

use anyhow::{Context, Result};
use chrono::Utc;
use colored::*;
use std::{fs, path::PathBuf, time::Instant};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        config::Pipeline,
        docs,
        fixture::FixtureSet,
        matrix,
        models::{EntryReport, RunReport, StageResult},
        plugins,
        stage::StageContext,
        suite,
    },
    infra::{fs::preserve_failure_logs, t},
    reporting::{
        console::{print_entry_summary, print_run_summary, print_unexpected_failure_details},
        html::generate_html_report,
        json::write_json_report,
    },
};

/// The resolved `run` subcommand arguments.
/// 解析后的 `run` 子命令参数。
#[derive(Debug)]
pub struct RunOptions {
    /// Parallel fan-out override from `--jobs` / 来自 `--jobs` 的并行扇出覆盖
    pub jobs: Option<usize>,
    /// Path to the pipeline configuration file / 流水线配置文件路径
    pub config: PathBuf,
    /// Path to the project directory / 项目目录路径
    pub project_dir: PathBuf,
    /// Runtime versions requested with `--runtime`; empty keeps the full matrix
    /// 通过 `--runtime` 请求的运行时版本；为空时保留完整矩阵
    pub runtimes: Vec<String>,
    /// Total number of distributed runners (for CI) / 分布式运行器总数（用于 CI）
    pub total_runners: Option<usize>,
    /// Index of this runner (for CI) / 此运行器的序号（用于 CI）
    pub runner_index: Option<usize>,
    /// Optional path for the JSON report / JSON 报告的可选路径
    pub json: Option<PathBuf>,
    /// Optional path for the HTML report / HTML 报告的可选路径
    pub html: Option<PathBuf>,
    /// Optional directory for failure log preservation / 保留失败日志的可选目录
    pub keep_logs: Option<PathBuf>,
}

/// Executes the run command with the provided options.
///
/// # Returns
/// The process exit code for the run: `0` for a clean run, otherwise the code
/// of the first failing stage's category. Configuration problems surface as
/// errors before anything runs.
///
/// 使用给定选项执行运行命令。
///
/// # Returns
/// 本次运行的进程退出码：干净运行为 `0`，否则为第一个失败阶段类别对应的码。
/// 配置问题在任何阶段运行之前以错误形式出现。
pub async fn execute(options: RunOptions) -> Result<u8> {
    let config_path = fs::canonicalize(&options.config).with_context(|| {
        t!(
            "config_not_found",
            locale = "en",
            path = options.config.display()
        )
    })?;
    let pipeline = Pipeline::load(&config_path)?;
    let locale = pipeline.language.clone();
    rust_i18n::set_locale(&locale);

    let project_root = fs::canonicalize(&options.project_dir).with_context(|| {
        t!(
            "project_dir_not_found",
            locale = locale,
            path = options.project_dir.display()
        )
    })?;

    println!(
        "{}",
        t!("project_root_detected", locale = locale, path = project_root.display())
    );
    println!(
        "{}",
        t!("loading_pipeline", locale = locale, path = config_path.display())
    );

    let stop = setup_signal_handler(&locale)?;

    let plan = matrix::resolve(
        &pipeline.runtimes,
        &options.runtimes,
        options.total_runners,
        options.runner_index,
    )?;

    if plan.filtered_count > 0 {
        println!(
            "{}",
            t!(
                "filtered_runtimes",
                locale = locale,
                filtered = plan.filtered_count,
                total = plan.entries.len()
            )
            .cyan()
        );
    }

    if let (Some(total), Some(index)) = (options.total_runners, options.runner_index) {
        println!(
            "{}",
            t!(
                "running_as_split_runner",
                locale = locale,
                index = index + 1,
                total = total,
                count = plan.entries.len()
            )
            .bold()
        );
    } else {
        println!(
            "{}",
            t!("running_full_matrix", locale = locale, count = plan.entries.len()).bold()
        );
    }

    if plan.entries.is_empty() {
        println!("{}", t!("no_entries_to_run", locale = locale).green());
        return Ok(0);
    }

    let jobs = pipeline.settings.effective_jobs(options.jobs);
    let run_started_at = Utc::now();
    let run_timer = Instant::now();

    let mut fixtures = FixtureSet::new();
    let mut entries: Vec<EntryReport> = Vec::with_capacity(plan.entries.len());

    for (index, entry) in plan.entries.iter().enumerate() {
        if stop.is_cancelled() {
            break;
        }

        println!(
            "\n{}",
            t!(
                "matrix_entry_banner",
                locale = locale,
                runtime = &entry.runtime,
                current = index + 1,
                total = plan.entries.len()
            )
            .bold()
        );

        let ctx = StageContext {
            entry,
            project_root: &project_root,
            settings: &pipeline.settings,
            stop: stop.clone(),
        };

        // Fixtures come first; the suite consults their failure state.
        // 夹具先行；套件会查询它们的失败状态。
        let mut results = fixtures.prepare_all(&pipeline.fixtures, &ctx).await;
        results.extend(suite::run_partitioned(&pipeline.stages, fixtures.blocked(), &ctx, jobs).await);

        // Doc output does not depend on the runtime, so the checks run once,
        // on the first scheduled entry, alongside the plugin verifier.
        // 文档输出与运行时无关，因此检查只在第一个调度条目上运行一次，与插件验证并行。
        let docs_due = index == 0 && !pipeline.docs.is_empty();
        match (&pipeline.plugins, docs_due) {
            (Some(plugin_cfg), true) => {
                let (plugin_result, doc_results) = tokio::join!(
                    plugins::verify(plugin_cfg, &ctx),
                    docs::check_all(&pipeline.docs, &ctx)
                );
                results.push(plugin_result);
                results.extend(doc_results);
            }
            (Some(plugin_cfg), false) => results.push(plugins::verify(plugin_cfg, &ctx).await),
            (None, true) => results.extend(docs::check_all(&pipeline.docs, &ctx).await),
            (None, false) => {}
        }

        print_entry_summary(&entry.runtime, &results, &locale);
        entries.push(EntryReport {
            runtime: entry.runtime.clone(),
            results,
        });
    }

    fixtures.shutdown().await;

    let report = RunReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: run_started_at,
        duration: run_timer.elapsed(),
        cancelled: stop.is_cancelled(),
        entries,
    };

    print_run_summary(&report, &locale);

    let unexpected_failures: Vec<&StageResult> = report
        .iter_results()
        .filter(|r| r.is_unexpected_failure())
        .collect();
    if !unexpected_failures.is_empty() {
        print_unexpected_failure_details(&unexpected_failures, &locale);
    }

    if let Some(dir) = &options.keep_logs {
        match preserve_failure_logs(&report, dir) {
            Ok(count) if count > 0 => {
                println!("\nPreserved {} failure log(s) under: {}", count, dir.display());
            }
            Ok(_) => {}
            Err(e) => eprintln!("{} {}", "Failed to preserve failure logs:".red(), e),
        }
    }

    if let Some(report_path) = &options.json {
        println!("\nWriting JSON report at: {}", report_path.display());
        if let Err(e) = write_json_report(&report, report_path) {
            eprintln!("{} {}", "Failed to write JSON report:".red(), e);
        }
    }

    if let Some(report_path) = &options.html {
        println!("\nGenerating HTML report at: {}", report_path.display());
        if let Err(e) = generate_html_report(&report, report_path, &locale) {
            eprintln!("{} {}", "Failed to generate HTML report:".red(), e);
        }
    }

    Ok(report.exit_code())
}

/// Sets up a signal handler for graceful shutdown.
fn setup_signal_handler(locale: &str) -> Result<CancellationToken> {
    let token = CancellationToken::new();
    let token_clone = token.clone();
    let locale = locale.to_string();

    tokio::spawn(async move {
        signal::ctrl_c().await.expect("Failed to listen for Ctrl-C");
        println!("\n{}", t!("shutdown_signal", locale = &locale).yellow());
        token_clone.cancel();
    });

    Ok(token)
}
