//! # HTML Reporting Module / HTML 报告模块
//!
//! This module handles the generation of HTML run reports.
//! It creates styled HTML files with run statistics, one results table per
//! matrix entry, and interactive features for viewing stage output.
//!
//! 此模块处理 HTML 运行报告的生成。
//! 它创建带有运行统计、每个矩阵条目一张结果表格
//! 以及查看阶段输出的交互功能的样式化 HTML 文件。

use anyhow::Result;
use std::path::Path;
use std::time::Duration;

use crate::core::models::{RunReport, StageResult, StageStatus};
use crate::infra::fs::write_atomically;
use crate::infra::t;

/// Embedded CSS styles for HTML reports / HTML 报告的嵌入式 CSS 样式
const HTML_STYLE: &str = include_str!("assets/report.css");

/// Embedded JavaScript for HTML report interactivity / HTML 报告交互性的嵌入式 JavaScript
const HTML_SCRIPT: &str = include_str!("assets/report.js");

/// Generates a comprehensive HTML report from a run report.
/// Creates a styled HTML file with run statistics, a detailed results table
/// per matrix entry, and interactive features for viewing stage output.
///
/// 从运行报告生成综合的 HTML 报告。
/// 创建一个样式化的 HTML 文件，包含运行统计、每个矩阵条目的详细结果表格
/// 和查看阶段输出的交互功能。
///
/// # Arguments / 参数
/// * `report` - The aggregated run report to render
///              要渲染的聚合运行报告
/// * `output_path` - The file path where the HTML report will be saved
///                   保存 HTML 报告的文件路径
/// * `locale` - The locale to use for internationalization
///              用于国际化使用的语言环境
///
/// # Errors / 错误
/// This function will return an error if:
/// - The output file cannot be written to the specified path
/// - File system permissions prevent writing
///
/// 此函数在以下情况下会返回错误：
/// - 无法将输出文件写入指定路径
/// - 文件系统权限阻止写入
pub fn generate_html_report(report: &RunReport, output_path: &Path, locale: &str) -> Result<()> {
    let mut html = String::new();
    html.push_str(&format!(
        "<!DOCTYPE html><html><head><meta charset='utf-8'><title>{}</title>",
        t!("html_report.title", locale = locale)
    ));
    html.push_str("<style>");
    html.push_str(HTML_STYLE);
    html.push_str("</style>");
    html.push_str("</head><body>");
    html.push_str(&format!(
        "<h1>{}</h1>",
        t!("html_report.main_header", locale = locale)
    ));

    // Run metadata line
    html.push_str(&format!(
        "<div class='meta'>{} {} &middot; {} {} &middot; {} {}</div>",
        t!("html_report.meta.version", locale = locale),
        escape_html(&report.version),
        t!("html_report.meta.started", locale = locale),
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        t!("html_report.meta.duration", locale = locale),
        format_duration(report.duration),
    ));
    if report.cancelled {
        html.push_str(&format!(
            "<div class='cancelled-banner'>{}</div>",
            t!("html_report.meta.cancelled", locale = locale)
        ));
    }

    // Add summary statistics
    let total = report.iter_results().count();
    let passed = report
        .iter_results()
        .filter(|r| matches!(r.status, StageStatus::Passed))
        .count();
    let failed = report
        .iter_results()
        .filter(|r| r.is_unexpected_failure())
        .count();
    let allowed = report
        .iter_results()
        .filter(|r| r.is_allowed_failure())
        .count();
    let skipped = report
        .iter_results()
        .filter(|r| matches!(r.status, StageStatus::Skipped))
        .count();

    html.push_str("<div class='summary-container'>");
    html.push_str(&format!(
        "<div class='summary-item'><span class='count'>{}</span><span class='label'>{}</span></div>",
        total,
        t!("html_report.summary.total", locale = locale)
    ));
    html.push_str(&format!(
        "<div class='summary-item'><span class='count passed-text'>{}</span><span class='label'>{}</span></div>",
        passed,
        t!("html_report.summary.passed", locale = locale)
    ));
    html.push_str(&format!(
        "<div class='summary-item'><span class='count failed-text'>{}</span><span class='label'>{}</span></div>",
        failed,
        t!("html_report.summary.failed", locale = locale)
    ));
    html.push_str(&format!(
        "<div class='summary-item'><span class='count allowed-text'>{}</span><span class='label'>{}</span></div>",
        allowed,
        t!("html_report.summary.allowed", locale = locale)
    ));
    html.push_str(&format!(
        "<div class='summary-item'><span class='count skipped-text'>{}</span><span class='label'>{}</span></div>",
        skipped,
        t!("html_report.summary.skipped", locale = locale)
    ));
    html.push_str("</div>");

    // One results table per matrix entry
    for (entry_idx, entry) in report.entries.iter().enumerate() {
        html.push_str(&format!(
            "<h2>{} {}</h2>",
            t!("html_report.entry_header", locale = locale),
            escape_html(&entry.runtime)
        ));
        push_results_table(&mut html, entry_idx, &entry.results, locale);
    }

    html.push_str(&format!(
        "<div class='footer'>stagehand {} &middot; {} ({})</div>",
        escape_html(&report.version),
        crate::build_info::BUILD_TIME,
        crate::build_info::GIT_HASH
    ));

    html.push_str("<script>");
    html.push_str(HTML_SCRIPT);
    html.push_str("</script></body></html>");

    write_atomically(output_path, &html)?;
    Ok(())
}

/// Renders the results table for one matrix entry into the HTML buffer.
/// 将一个矩阵条目的结果表格渲染到 HTML 缓冲区。
fn push_results_table(html: &mut String, entry_idx: usize, results: &[StageResult], locale: &str) {
    html.push_str("<table><thead><tr>");
    html.push_str(&format!(
        "<th>{}</th>",
        t!("html_report.table.header.stage", locale = locale)
    ));
    html.push_str(&format!(
        "<th class='kind-cell'>{}</th>",
        t!("html_report.table.header.kind", locale = locale)
    ));
    html.push_str(&format!(
        "<th class='status-col'>{}</th>",
        t!("html_report.table.header.status", locale = locale)
    ));
    html.push_str(&format!(
        "<th class='duration-cell'>{}</th>",
        t!("html_report.table.header.duration", locale = locale)
    ));
    html.push_str("</tr></thead><tbody>");

    for (i, result) in results.iter().enumerate() {
        let status_str = result.status_str(locale);
        let status_class = result.status_class();
        let duration_str = match result.status {
            StageStatus::Skipped => "N/A".to_string(),
            _ => format_duration(result.duration),
        };

        let output_id = format!("output-{}-{}", entry_idx, i);
        let output_details = if result.is_failure() {
            let mut escaped_output = escape_html(&result.output);
            if result.truncated {
                escaped_output.push_str(&format!(
                    "\n[{}]",
                    t!("html_report.output_truncated", locale = locale)
                ));
            }
            format!(
                "<tr id='{}' style='display:none;'><td colspan='4'><pre class='output-content'>{}</pre></td></tr>",
                output_id, escaped_output
            )
        } else {
            String::new()
        };

        let output_toggle = if result.is_failure() {
            format!(
                "<div class='output-toggle' onclick=\"toggleOutput('{}')\">{}</div>",
                output_id,
                t!("html_report.toggle_output", locale = locale)
            )
        } else {
            String::new()
        };

        let skip_note = match &result.skip_reason {
            Some(reason) => format!("<div class='skip-reason'>{}</div>", escape_html(reason)),
            None => String::new(),
        };

        html.push_str("<tr>");
        html.push_str(&format!("<td>{}</td>", escape_html(&result.stage)));
        html.push_str(&format!(
            "<td class='kind-cell'>{}</td>",
            result.kind.as_str(locale)
        ));
        html.push_str(&format!(
            "<td class='status-col'><div class='status-cell {}'>{}</div>{}{}</td>",
            status_class, status_str, output_toggle, skip_note
        ));
        html.push_str(&format!("<td class='duration-cell'>{}</td>", duration_str));
        html.push_str("</tr>");
        html.push_str(&output_details);
    }

    html.push_str("</tbody></table>");
}

fn format_duration(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f64())
}

/// Simple HTML escape function to replace special characters with their HTML entities
/// 简单的 HTML 转义函数，用 HTML 实体替换特殊字符
fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
