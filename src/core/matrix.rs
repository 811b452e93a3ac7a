//! # Matrix Resolution Module / 矩阵解析模块
//!
//! This module turns the configured runtime versions into the concrete
//! matrix entries of a run, applying the `--runtime` filter and the CI
//! sharding arguments. Entries keep their declaration order so that runs
//! are reproducible.
//!
//! 此模块将配置的运行时版本转换为一次运行的具体矩阵条目，
//! 应用 `--runtime` 过滤器和 CI 分片参数。条目保持声明顺序，以保证运行可复现。

use anyhow::{Result, bail};

/// One concrete cell of the runtime matrix. The full stage list runs once
/// per entry; entries run one after another because they share local ports
/// and artifact paths.
/// 运行时矩阵中的一个具体单元。完整的阶段列表在每个条目上运行一次；
/// 条目依次运行，因为它们共享本地端口和产物路径。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixEntry {
    /// The runtime version label, exported to stages as `STAGEHAND_RUNTIME`.
    /// 运行时版本标签，以 `STAGEHAND_RUNTIME` 导出给各阶段。
    pub runtime: String,
}

/// Represents the resolved schedule of matrix entries for a run.
/// 表示一次运行解析后的矩阵条目调度。
#[derive(Debug)]
pub struct MatrixPlan {
    /// The entries to execute, in schedule order.
    /// 要执行的条目，按调度顺序排列。
    pub entries: Vec<MatrixEntry>,
    /// The number of configured runtimes removed by the `--runtime` filter.
    /// 被 `--runtime` 过滤器移除的已配置运行时数量。
    pub filtered_count: usize,
    /// Whether the entries are distributed across multiple runners (CI environment).
    /// 条目是否分布在多个运行器上（CI 环境）。
    pub is_distributed: bool,
}

/// Resolves the matrix for a run: exactly one entry per configured runtime,
/// narrowed by the optional `--runtime` filter and the optional runner shard.
///
/// 解析一次运行的矩阵：每个配置的运行时恰好一个条目，
/// 并按可选的 `--runtime` 过滤器和可选的运行器分片收窄。
///
/// # Arguments
/// * `runtimes` - The configured runtime versions, in declaration order
/// * `only` - Runtime versions requested on the command line; empty keeps all
/// * `total_runners` - Optional total number of runners for distributed execution
/// * `runner_index` - Optional index of this runner (0-based)
///
/// # Returns
/// A `MatrixPlan` with the filtered and potentially distributed entries
pub fn resolve(
    runtimes: &[String],
    only: &[String],
    total_runners: Option<usize>,
    runner_index: Option<usize>,
) -> Result<MatrixPlan> {
    if runtimes.is_empty() {
        bail!("the runtime matrix is empty: 'runtimes' must list at least one version");
    }

    // A filter naming an unknown version is a configuration error, not an
    // empty schedule.
    for requested in only {
        if !runtimes.iter().any(|r| r == requested) {
            bail!(
                "unknown runtime '{}' in --runtime filter (configured: {})",
                requested,
                runtimes.join(", ")
            );
        }
    }

    let selected: Vec<MatrixEntry> = runtimes
        .iter()
        .filter(|r| only.is_empty() || only.iter().any(|o| o == *r))
        .map(|r| MatrixEntry {
            runtime: r.clone(),
        })
        .collect();
    let filtered_count = runtimes.len() - selected.len();

    // Distribute entries if running in CI
    let (entries, is_distributed) = if let (Some(total), Some(index)) = (total_runners, runner_index)
    {
        if total == 0 {
            bail!("--total-runners must be greater than zero.");
        }
        if index >= total {
            bail!("Runner index must be less than total runners.");
        }
        let distributed: Vec<_> = selected
            .into_iter()
            .enumerate()
            .filter(|(i, _)| i % total == index)
            .map(|(_, entry)| entry)
            .collect();
        (distributed, true)
    } else {
        if total_runners.is_some() || runner_index.is_some() {
            bail!("Both --total-runners and --runner-index must be provided.");
        }
        (selected, false)
    };

    Ok(MatrixPlan {
        entries,
        filtered_count,
        is_distributed,
    })
}
