//! # File System Operations Module / 文件系统操作模块
//!
//! This module provides utilities for file system operations, such as
//! preserving failure logs, writing report files atomically and resolving
//! project paths.
//!
//! 此模块提供文件系统操作的实用功能，
//! 如保存失败日志、原子地写出报告文件和解析项目路径。

use crate::core::models::RunReport;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Maps a stage or runtime name to a name that is safe as a file system
/// component.
///
/// # Arguments
/// * `name` - The name to sanitize
///
/// # Returns
/// The name with every non-alphanumeric character replaced by `_`
pub fn sanitized_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Writes the captured output of every unexpectedly failed stage to
/// `<dir>/<runtime>/<stage>.log` so CI systems can archive them.
///
/// # Arguments
/// * `report` - The finished run report
/// * `dir` - The directory to place the log tree under
///
/// # Returns
/// The number of log files written
///
/// 将每个意外失败阶段捕获的输出写入 `<dir>/<runtime>/<stage>.log`，
/// 以便 CI 系统归档。
///
/// # Arguments
/// * `report` - 已完成的运行报告
/// * `dir` - 放置日志树的目录
///
/// # Returns
/// 写出的日志文件数量
pub fn preserve_failure_logs(report: &RunReport, dir: &Path) -> Result<usize> {
    let mut written = 0;
    for entry in &report.entries {
        let entry_dir = dir.join(sanitized_name(&entry.runtime));
        for result in entry.results.iter().filter(|r| r.is_unexpected_failure()) {
            fs::create_dir_all(&entry_dir).with_context(|| {
                format!("Failed to create log directory: {}", entry_dir.display())
            })?;
            let log_path = entry_dir.join(format!("{}.log", sanitized_name(&result.stage)));
            fs::write(&log_path, &result.output)
                .with_context(|| format!("Failed to write log file: {}", log_path.display()))?;
            written += 1;
        }
    }
    Ok(written)
}

/// Writes a file atomically: the content lands in a temporary file in the
/// destination directory which is then renamed over the target, so a crashed
/// run never leaves a half-written report behind.
///
/// 原子地写出文件：内容先写入目标目录中的临时文件，
/// 再重命名覆盖目标，因此中断的运行不会留下写了一半的报告。
pub fn write_atomically(path: &Path, content: &str) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let dir = match dir {
        Some(parent) => {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create report directory: {}", parent.display())
            })?;
            parent.to_path_buf()
        }
        None => PathBuf::from("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".stagehand_")
        .tempfile_in(&dir)
        .with_context(|| format!("Failed to create temporary file in: {}", dir.display()))?;
    tmp.write_all(content.as_bytes())
        .with_context(|| "Failed to write report content".to_string())?;
    tmp.persist(path)
        .with_context(|| format!("Failed to persist report to: {}", path.display()))?;
    Ok(())
}

/// Gets the absolute path from a potentially relative path.
///
/// # Arguments
/// * `path` - Path to canonicalize
///
/// # Returns
/// Canonicalized absolute path, or an error if the path doesn't exist
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("Failed to resolve path: {}", path.display()))
}
