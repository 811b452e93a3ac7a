//! # Console Reporting Module / 控制台报告模块
//!
//! This module handles the generation and display of run reports in the
//! console. It provides functionality for printing colorful, formatted
//! summaries with internationalization support.
//!
//! 此模块处理控制台中运行报告的生成和显示。
//! 它提供打印彩色格式化摘要的功能，支持国际化。

use crate::core::models::{RunReport, StageResult, StageStatus};
use crate::infra::t;
use colored::*;

/// Prints a formatted summary of one matrix entry's stage results.
/// Displays a table with stage status, name, kind and duration, using color
/// coding to highlight different statuses.
///
/// 打印单个矩阵条目阶段结果的格式化摘要。
/// 显示一个包含阶段状态、名称、类别和持续时间的表格，
/// 使用颜色编码突出显示不同的状态。
///
/// # Arguments / 参数
/// * `runtime` - The runtime version of the entry
///               条目的运行时版本
/// * `results` - A slice of stage results to summarize
///               要总结的阶段结果切片
/// * `locale` - The language locale to use for messages
///              用于消息的语言区域设置
///
/// # Output Format / 输出格式
/// ```text
/// --- Entry Summary: 3.11 ---
///   - Passed           | unit                                    | test         |      1.23s
///   - Failed           | integration-serial                      | test         |      0.45s
///   - Skipped          | browser                                 | test         |        N/A
/// ```
pub fn print_entry_summary(runtime: &str, results: &[StageResult], locale: &str) {
    println!(
        "\n{}",
        t!("report.entry_banner", locale = locale, runtime = runtime).bold()
    );

    for result in results {
        let status_str = result.status_str(locale);
        let duration_str = match result.status {
            StageStatus::Skipped => "N/A".to_string(),
            _ => format!("{:.2?}", result.duration),
        };
        let truncated_marker = if result.truncated {
            t!("report.truncated_marker", locale = locale).to_string()
        } else {
            String::new()
        };

        let status_colored = match result.status {
            StageStatus::Passed => status_str.green(),
            StageStatus::Failed | StageStatus::TimedOut => {
                if result.allow_failure {
                    status_str.yellow()
                } else {
                    status_str.red()
                }
            }
            StageStatus::Skipped => status_str.dimmed(),
        };

        println!(
            "  - {:<18} | {:<40} | {:<12} | {:>10} {}",
            status_colored,
            result.stage,
            result.kind.as_str(locale),
            duration_str,
            truncated_marker
        );
    }
}

/// Prints the final run summary across all matrix entries: counts per
/// category, the skip reasons, and the overall verdict banner.
///
/// 打印跨所有矩阵条目的最终运行摘要：各类别计数、跳过原因和整体结论横幅。
pub fn print_run_summary(report: &RunReport, locale: &str) {
    let total: usize = report.iter_results().count();
    let passed = report
        .iter_results()
        .filter(|r| r.status == StageStatus::Passed)
        .count();
    let allowed = report
        .iter_results()
        .filter(|r| r.is_allowed_failure())
        .count();
    let skipped: Vec<&StageResult> = report
        .iter_results()
        .filter(|r| r.status == StageStatus::Skipped)
        .collect();
    let unexpected: Vec<&StageResult> = report
        .iter_results()
        .filter(|r| r.is_unexpected_failure())
        .collect();

    println!("\n{}", t!("report.run_banner", locale = locale).bold());
    println!(
        "{}",
        t!(
            "report.run_counts",
            locale = locale,
            total = total,
            passed = passed,
            failed = unexpected.len(),
            allowed = allowed,
            skipped = skipped.len(),
            duration = &format!("{:.2?}", report.duration)
        )
    );

    for result in &skipped {
        let reason = result.skip_reason.as_deref().unwrap_or_default();
        println!(
            "  - {} {} [{}]: {}",
            t!("report.skipped_prefix", locale = locale).dimmed(),
            result.stage,
            result.runtime,
            reason
        );
    }

    if report.cancelled {
        println!("\n{}", t!("report.run_cancelled", locale = locale).yellow().bold());
    }

    if report.failed() {
        println!("\n{}", t!("report.overall_failure", locale = locale).red().bold());
    } else {
        println!("\n{}", t!("report.overall_success", locale = locale).green().bold());
    }
}

/// Prints detailed information about unexpected stage failures.
/// Shows the full captured output for each stage that failed unexpectedly,
/// helping developers debug issues without digging through CI artifacts.
///
/// 打印意外阶段失败的详细信息。
/// 显示每个意外失败阶段的完整捕获输出，
/// 帮助开发者无需翻查 CI 产物即可调试问题。
///
/// # Arguments / 参数
/// * `unexpected_failures` - A slice of stage results that failed unexpectedly
///                           意外失败的阶段结果切片
/// * `locale` - The language locale to use for messages
///              用于消息的语言区域设置
pub fn print_unexpected_failure_details(unexpected_failures: &[&StageResult], locale: &str) {
    if unexpected_failures.is_empty() {
        return;
    }

    println!(
        "\n{}",
        t!("report.unexpected_failure_banner", locale = locale).red().bold()
    );
    println!("{}", "-".repeat(80));

    for (i, result) in unexpected_failures.iter().enumerate() {
        println!(
            "[{}/{}] {} '{}' [{}]",
            i + 1,
            unexpected_failures.len(),
            t!("report.header_failure", locale = locale).red(),
            result.stage.cyan(),
            result.runtime
        );

        println!("\n--- {} ---\n", t!("report.stage_log", locale = locale).yellow());
        println!("{}", result.output);
        if result.truncated {
            println!("{}", t!("report.output_truncated", locale = locale).yellow());
        }
        println!("\n{}", "-".repeat(80));
    }
}
