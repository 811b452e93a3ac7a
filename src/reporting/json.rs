//! # JSON Reporting Module / JSON 报告模块
//!
//! Serializes the run report to a machine-readable JSON file for CI systems
//! and dashboards. The file is written atomically so a consumer never sees a
//! half-written report.
//!
//! 将运行报告序列化为机器可读的 JSON 文件，供 CI 系统和仪表盘使用。
//! 文件以原子方式写出，消费者不会读到写了一半的报告。

use crate::core::models::RunReport;
use crate::infra::fs::write_atomically;
use anyhow::{Context, Result};
use std::path::Path;

/// Writes the run report as pretty-printed JSON to the given path.
///
/// # Arguments
/// * `report` - The finished run report
/// * `path` - The destination file
pub fn write_json_report(report: &RunReport, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(report)
        .context("Failed to serialize the run report to JSON")?;
    write_atomically(path, &content)
}
