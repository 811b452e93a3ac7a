//! # Data Models Module / 数据模型模块
//!
//! This module defines the core data structures used throughout Stagehand.
//! It includes models for stage results, matrix entries, per-entry reports
//! and the aggregated run report that reporting surfaces consume.
//!
//! 此模块定义了整个 Stagehand 中使用的核心数据结构。
//! 它包括阶段结果、矩阵条目、单条目报告以及供报告界面使用的聚合运行报告的模型。

use crate::infra::t;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The category of work a stage result belongs to. The category decides which
/// process exit code a failure maps to.
///
/// 阶段结果所属的工作类别。类别决定失败映射到哪个进程退出码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    /// A fixture build or serve step that test stages may depend on.
    /// 测试阶段可能依赖的夹具构建或服务步骤。
    Fixture,
    /// A regular test stage from the `[[stages]]` tables.
    /// 来自 `[[stages]]` 表的常规测试阶段。
    Test,
    /// The plugin-loading verification stage.
    /// 插件加载验证阶段。
    PluginCheck,
    /// A documentation consistency check.
    /// 文档一致性检查。
    DocCheck,
}

impl StageKind {
    /// Gets the kind as a localized string for display.
    /// 以本地化字符串形式获取类别以供显示。
    pub fn as_str(&self, locale: &str) -> String {
        match self {
            StageKind::Fixture => t!("report.kind_fixture", locale = locale).to_string(),
            StageKind::Test => t!("report.kind_test", locale = locale).to_string(),
            StageKind::PluginCheck => t!("report.kind_plugin_check", locale = locale).to_string(),
            StageKind::DocCheck => t!("report.kind_doc_check", locale = locale).to_string(),
        }
    }

    /// The process exit code a failure of this kind maps to.
    /// 此类别的失败映射到的进程退出码。
    pub fn failure_exit_code(&self) -> u8 {
        match self {
            StageKind::Test => 1,
            StageKind::Fixture => 3,
            StageKind::PluginCheck => 4,
            StageKind::DocCheck => 5,
        }
    }
}

/// The concurrency group a test stage belongs to. Every test stage is in
/// exactly one group; parallel stages fan out up to the job limit, serial
/// stages run one at a time after the whole parallel phase has drained.
///
/// 测试阶段所属的并发组。每个测试阶段恰好属于一个组；
/// 并行阶段最多扇出到作业上限，串行阶段在整个并行阶段完成后逐一运行。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TestGroup {
    #[default]
    Parallel,
    Serial,
}

/// The final status of a single stage execution.
/// 单个阶段执行的最终状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    /// The stage exited successfully.
    /// 阶段成功退出。
    Passed,
    /// The stage exited with a non-zero status or could not be launched.
    /// 阶段以非零状态退出或无法启动。
    Failed,
    /// The stage exceeded its timeout and was forcibly terminated.
    /// 阶段超时并被强制终止。
    TimedOut,
    /// The stage never ran, e.g. because a fixture it needs failed or the
    /// run was cancelled.
    /// 阶段从未运行，例如其依赖的夹具失败或运行被取消。
    Skipped,
}

/// Represents the recorded outcome of a single stage on one matrix entry.
/// This is the unit every reporting surface works with.
///
/// 表示单个阶段在一个矩阵条目上的记录结果。
/// 这是所有报告界面处理的基本单元。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage name from the configuration / 配置中的阶段名称
    pub stage: String,
    /// The category of the stage / 阶段的类别
    pub kind: StageKind,
    /// The runtime version of the matrix entry this ran under / 运行所在矩阵条目的运行时版本
    pub runtime: String,
    /// The final status / 最终状态
    pub status: StageStatus,
    /// The child process exit code, if it ran to completion / 子进程退出码（如果运行完成）
    pub exit_code: Option<i32>,
    /// When the stage started / 阶段开始时间
    pub started_at: DateTime<Utc>,
    /// How long the stage took / 阶段耗时
    pub duration: Duration,
    /// Combined captured output, bounded by the configured limit / 捕获的合并输出，受配置上限约束
    pub output: String,
    /// `true` if the captured output hit the limit and was cut off / 捕获输出达到上限被截断时为 `true`
    pub truncated: bool,
    /// Whether a failure of this stage is tolerated / 此阶段的失败是否被容忍
    pub allow_failure: bool,
    /// Why the stage was skipped, when it was / 阶段被跳过的原因（如被跳过）
    pub skip_reason: Option<String>,
}

impl StageResult {
    /// Checks if the result is a failure that was not explicitly allowed.
    /// Timeouts count; skips and allowed failures do not.
    pub fn is_unexpected_failure(&self) -> bool {
        match self.status {
            StageStatus::Failed | StageStatus::TimedOut => !self.allow_failure,
            _ => false,
        }
    }

    /// Checks if the result is a failure that was explicitly allowed.
    pub fn is_allowed_failure(&self) -> bool {
        matches!(self.status, StageStatus::Failed | StageStatus::TimedOut) && self.allow_failure
    }

    /// Checks if the result is any kind of failure.
    pub fn is_failure(&self) -> bool {
        matches!(self.status, StageStatus::Failed | StageStatus::TimedOut)
    }

    /// The instant the stage finished, derived from start and duration.
    /// 由开始时间和耗时推出的阶段结束时刻。
    pub fn completed_at(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.duration).unwrap_or_else(|_| TimeDelta::zero());
        self.started_at + elapsed
    }

    /// Gets the appropriate CSS class for the stage status.
    pub fn status_class(&self) -> &str {
        match self.status {
            StageStatus::Passed => "status-Passed",
            StageStatus::Failed => {
                if self.allow_failure {
                    "status-Allowed-Failure"
                } else {
                    "status-Failed"
                }
            }
            StageStatus::TimedOut => "status-Timeout",
            StageStatus::Skipped => "status-Skipped",
        }
    }

    /// Gets the status of the stage result as a string for display.
    /// 以字符串形式获取阶段结果的状态以供显示。
    pub fn status_str(&self, locale: &str) -> String {
        match self.status {
            StageStatus::Passed => t!("report.status_passed", locale = locale).to_string(),
            StageStatus::Failed => {
                if self.allow_failure {
                    t!("report.status_allowed_failure", locale = locale).to_string()
                } else {
                    t!("report.status_failed", locale = locale).to_string()
                }
            }
            StageStatus::TimedOut => t!("report.status_timeout", locale = locale).to_string(),
            StageStatus::Skipped => t!("report.status_skipped", locale = locale).to_string(),
        }
    }
}

/// All stage results recorded for one matrix entry, in report order:
/// fixtures, then tests, then the independent checks.
///
/// 为一个矩阵条目记录的所有阶段结果，按报告顺序排列：
/// 先是夹具，然后是测试，最后是独立检查。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryReport {
    /// The runtime version this entry ran under / 此条目运行的运行时版本
    pub runtime: String,
    /// The recorded stage results / 记录的阶段结果
    pub results: Vec<StageResult>,
}

impl EntryReport {
    /// Checks whether any stage of this entry failed unexpectedly.
    pub fn has_unexpected_failure(&self) -> bool {
        self.results.iter().any(|r| r.is_unexpected_failure())
    }
}

/// The aggregated result of a whole run across the matrix.
/// 整个矩阵运行的聚合结果。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// The crate version that produced the report / 生成报告的 crate 版本
    pub version: String,
    /// When the run started / 运行开始时间
    pub started_at: DateTime<Utc>,
    /// Total wall-clock duration of the run / 运行的总耗时
    pub duration: Duration,
    /// Whether the run was interrupted by a cancellation signal / 运行是否被取消信号中断
    pub cancelled: bool,
    /// One report per executed matrix entry, in schedule order / 每个已执行矩阵条目的报告，按调度顺序
    pub entries: Vec<EntryReport>,
}

impl RunReport {
    /// Iterates over every recorded stage result in report order.
    pub fn iter_results(&self) -> impl Iterator<Item = &StageResult> {
        self.entries.iter().flat_map(|e| e.results.iter())
    }

    /// The first unexpectedly failing stage of the run, if any.
    /// 运行中第一个意外失败的阶段（如有）。
    pub fn first_unexpected_failure(&self) -> Option<&StageResult> {
        self.iter_results().find(|r| r.is_unexpected_failure())
    }

    /// Checks whether the run failed overall.
    pub fn failed(&self) -> bool {
        self.cancelled || self.first_unexpected_failure().is_some()
    }

    /// Maps the run outcome to the process exit code: 0 for a clean run,
    /// otherwise the code of the first failing stage's category. A cancelled
    /// run that recorded no failure still exits with the test-failure code.
    ///
    /// 将运行结果映射为进程退出码：干净运行为 0，
    /// 否则为第一个失败阶段类别对应的码。未记录失败但被取消的运行仍以测试失败码退出。
    pub fn exit_code(&self) -> u8 {
        match self.first_unexpected_failure() {
            Some(result) => result.kind.failure_exit_code(),
            None if self.cancelled => StageKind::Test.failure_exit_code(),
            None => 0,
        }
    }
}
