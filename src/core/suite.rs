//! # Partitioned Suite Module / 分区套件模块
//!
//! This module schedules the test stages of one matrix entry: the parallel
//! group fans out up to the job limit, then a barrier, then the serial group
//! one stage at a time. A failing parallel stage never cancels its siblings
//! and never skips the serial phase; the whole failure surface of an entry is
//! collected in one pass.
//!
//! 此模块调度单个矩阵条目的测试阶段：并行组最多扇出到作业上限，
//! 然后是屏障，再是串行组逐一执行。失败的并行阶段不会取消其兄弟阶段，
//! 也不会跳过串行阶段；条目的全部失败面在一次遍历中收集。

use colored::*;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;

use crate::{
    core::{
        config::StageSpec,
        models::{StageKind, StageResult, TestGroup},
        stage::{StageContext, execute_stage, skipped_stage},
    },
    infra::t,
};

/// Finds the first needed fixture of a stage that is unavailable, together
/// with the recorded failure reason.
fn blocked_reason<'a>(
    spec: &StageSpec,
    blocked: &'a BTreeMap<String, String>,
) -> Option<(&'a str, &'a str)> {
    spec.needs.iter().find_map(|needed| {
        blocked
            .get_key_value(needed.as_str())
            .map(|(name, reason)| (name.as_str(), reason.as_str()))
    })
}

/// Builds and announces the skip result for a stage whose fixture failed.
/// 为夹具失败的阶段构建并宣布跳过结果。
fn skip_for_fixture(
    spec: &StageSpec,
    fixture: &str,
    reason: &str,
    ctx: &StageContext<'_>,
) -> StageResult {
    println!(
        "{}",
        t!("suite.stage_skipped_fixture", name = &spec.name, fixture = fixture).yellow()
    );
    skipped_stage(
        &spec.name,
        StageKind::Test,
        &ctx.entry.runtime,
        spec.allow_failure,
        &format!("fixture '{}' unavailable ({})", fixture, reason),
    )
}

/// Runs all test stages of one matrix entry under the partitioning rules.
///
/// # Arguments
/// * `stages` - The configured test stages, in declaration order
/// * `blocked` - Fixtures that failed for this entry, with their reasons
/// * `ctx` - The execution context for the current matrix entry
/// * `jobs` - The parallel fan-out limit
///
/// # Returns
/// One result per stage: parallel results sorted by name for stable reports,
/// followed by serial results in declaration order
///
/// 在分区规则下运行单个矩阵条目的所有测试阶段。
///
/// # Arguments
/// * `stages` - 配置的测试阶段，按声明顺序
/// * `blocked` - 此条目上失败的夹具及其原因
/// * `ctx` - 当前矩阵条目的执行上下文
/// * `jobs` - 并行扇出上限
///
/// # Returns
/// 每个阶段一个结果：并行结果按名称排序以保证报告稳定，
/// 随后是按声明顺序的串行结果
pub async fn run_partitioned(
    stages: &[StageSpec],
    blocked: &BTreeMap<String, String>,
    ctx: &StageContext<'_>,
    jobs: usize,
) -> Vec<StageResult> {
    let (parallel, serial): (Vec<&StageSpec>, Vec<&StageSpec>) = stages
        .iter()
        .partition(|spec| spec.group == TestGroup::Parallel);

    let mut results: Vec<StageResult> = Vec::with_capacity(stages.len());

    if !parallel.is_empty() {
        println!(
            "{}",
            t!("suite.parallel_phase", count = parallel.len(), jobs = jobs).cyan()
        );
    }

    let mut parallel_results: Vec<StageResult> = Vec::with_capacity(parallel.len());
    let mut runnable: Vec<&StageSpec> = Vec::new();
    for spec in parallel {
        match blocked_reason(spec, blocked) {
            Some((fixture, reason)) => {
                parallel_results.push(skip_for_fixture(spec, fixture, reason, ctx));
            }
            None => runnable.push(spec),
        }
    }

    let executed: Vec<StageResult> = stream::iter(
        runnable
            .into_iter()
            .map(|spec| execute_stage(spec, StageKind::Test, ctx)),
    )
    .buffer_unordered(jobs.max(1))
    .collect()
    .await;
    parallel_results.extend(executed);

    // Completion order is nondeterministic; sort by name for stable reports.
    // 完成顺序不确定；按名称排序以保证报告稳定。
    parallel_results.sort_by(|a, b| a.stage.cmp(&b.stage));
    results.extend(parallel_results);

    // The serial phase must not start before the whole parallel phase has
    // drained; collecting the stream above is that barrier.
    // 串行阶段不得在整个并行阶段完成前开始；上面流的收集就是这道屏障。
    if !serial.is_empty() {
        println!("{}", t!("suite.serial_phase", count = serial.len()).cyan());
    }
    for spec in serial {
        match blocked_reason(spec, blocked) {
            Some((fixture, reason)) => results.push(skip_for_fixture(spec, fixture, reason, ctx)),
            None => results.push(execute_stage(spec, StageKind::Test, ctx).await),
        }
    }

    results
}
