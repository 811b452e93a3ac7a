//! # Configuration Module / 配置模块
//!
//! This module defines the `Stagehand.toml` schema: the runtime matrix, the
//! test stages with their concurrency groups, fixtures, the plugin
//! verification block and the documentation checks. Loading validates the
//! whole file up front so that a malformed pipeline is rejected before any
//! process is spawned.
//!
//! 此模块定义 `Stagehand.toml` 的结构：运行时矩阵、带并发组的测试阶段、
//! 夹具、插件验证块和文档检查。加载时会预先验证整个文件，
//! 以便在生成任何进程之前拒绝格式错误的流水线。

use crate::core::models::TestGroup;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Represents a single test stage defined in the pipeline configuration.
/// Each stage is one command the orchestrator runs per matrix entry.
/// 代表流水线配置中定义的单个测试阶段。
/// 每个阶段是编排器在每个矩阵条目上运行的一条命令。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageSpec {
    /// The unique name for the stage, used for identification in logs and reports.
    /// 阶段的唯一名称，用于在日志和报告中进行识别。
    pub name: String,
    /// The command line to run. The `{runtime}` placeholder is replaced with
    /// the matrix entry's runtime version before the command is parsed.
    /// 要运行的命令行。`{runtime}` 占位符在解析命令前会被替换为矩阵条目的运行时版本。
    pub command: String,
    /// An optional working directory, resolved relative to the project root.
    /// 可选的工作目录，相对于项目根目录解析。
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Environment variable overrides for the spawned process. These win over
    /// the orchestrator's own environment on collision.
    /// 生成进程的环境变量覆盖。与编排器自身环境冲突时以这些为准。
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Which concurrency group the stage runs in. Defaults to `parallel`.
    /// 阶段运行所在的并发组。默认为 `parallel`。
    #[serde(default)]
    pub group: TestGroup,
    /// Names of fixtures this stage depends on. If one of them fails, the
    /// stage is skipped instead of run.
    /// 此阶段依赖的夹具名称。若其中之一失败，该阶段将被跳过而不运行。
    #[serde(default)]
    pub needs: Vec<String>,
    /// An optional timeout in seconds for the stage. If the stage runs longer
    /// than this, it is forcibly terminated and marked as timed out.
    /// 阶段的可选超时时间（秒）。运行超过此值的阶段会被强制终止并标记为超时。
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// If `true`, a failure of this stage does not fail the overall run.
    /// 如果为 `true`，此阶段的失败不会导致整个运行失败。
    #[serde(default)]
    pub allow_failure: bool,
}

impl Default for StageSpec {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
            command: String::new(),
            working_dir: None,
            env: BTreeMap::new(),
            group: TestGroup::default(),
            needs: vec![],
            timeout_secs: None,
            allow_failure: false,
        }
    }
}

/// Represents a fixture: an artifact build or a long-lived server that test
/// stages depend on. Exactly one of `build` and `serve` must be set.
/// 代表一个夹具：测试阶段依赖的产物构建或长驻服务器。
/// `build` 和 `serve` 必须恰好设置其一。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FixtureSpec {
    /// The unique name for the fixture, referenced by stage `needs` lists.
    /// 夹具的唯一名称，被阶段的 `needs` 列表引用。
    pub name: String,
    /// A command that builds an artifact and then exits.
    /// 构建产物后退出的命令。
    #[serde(default)]
    pub build: Option<String>,
    /// A command that serves on `port` for the duration of the run. The
    /// `{port}` placeholder is replaced before the command is parsed.
    /// 在 `port` 上服务直至运行结束的命令。`{port}` 占位符在解析命令前会被替换。
    #[serde(default)]
    pub serve: Option<String>,
    /// The artifact path a `build` fixture produces, resolved relative to the
    /// project root. When the path already exists the build is skipped; when
    /// no artifact is declared the build runs on every matrix entry.
    /// `build` 夹具产出的产物路径，相对于项目根目录解析。
    /// 路径已存在时跳过构建；未声明产物时，每个矩阵条目都会执行构建。
    #[serde(default)]
    pub artifact: Option<PathBuf>,
    /// The local port a `serve` fixture listens on. Readiness is probed by
    /// connecting to it.
    /// `serve` 夹具监听的本地端口。通过连接该端口来探测就绪状态。
    #[serde(default)]
    pub port: Option<u16>,
    /// How long to wait for a `serve` fixture to accept connections.
    /// 等待 `serve` 夹具接受连接的时长。
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
    /// An optional working directory, resolved relative to the project root.
    /// 可选的工作目录，相对于项目根目录解析。
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Environment variable overrides for the fixture process.
    /// 夹具进程的环境变量覆盖。
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

fn default_ready_timeout() -> u64 {
    30
}

impl FixtureSpec {
    /// Checks whether this fixture is a long-lived server.
    pub fn is_server(&self) -> bool {
        self.serve.is_some()
    }
}

/// Configuration for the plugin-loading verification stage.
/// 插件加载验证阶段的配置。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginConfig {
    /// The plugin identifiers to install and verify, in installation order.
    /// 要安装和验证的插件标识符，按安装顺序排列。
    pub plugins: Vec<String>,
    /// An optional installation command template run once per plugin. The
    /// `{plugin}` placeholder is replaced with the plugin identifier.
    /// 可选的安装命令模板，每个插件运行一次。`{plugin}` 占位符会被替换为插件标识符。
    #[serde(default)]
    pub install: Option<String>,
    /// The environment variable the target process reads to discover which
    /// plugins to load.
    /// 目标进程用于发现要加载哪些插件的环境变量。
    pub discovery_env: String,
    /// The probe command. Its standard output must be a JSON array of active
    /// plugins, either as names or as objects with a `name` field.
    /// 探测命令。其标准输出必须是活动插件的 JSON 数组，元素为名称或带 `name` 字段的对象。
    pub probe: String,
    /// An optional working directory, resolved relative to the project root.
    /// 可选的工作目录，相对于项目根目录解析。
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// A single documentation consistency check: a generator command whose output
/// must match a committed file.
/// 单个文档一致性检查：生成器命令的输出必须与已提交文件一致。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocCheck {
    /// The unique name for the check, used in logs and reports.
    /// 检查的唯一名称，用于日志和报告。
    pub name: String,
    /// The command that regenerates the documentation fragment on stdout.
    /// 在标准输出上重新生成文档片段的命令。
    pub command: String,
    /// The committed file the regenerated fragment is compared against,
    /// resolved relative to the project root.
    /// 与重新生成片段比较的已提交文件，相对于项目根目录解析。
    pub path: PathBuf,
    /// An optional working directory, resolved relative to the project root.
    /// 可选的工作目录，相对于项目根目录解析。
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// Global execution settings for a run.
/// 一次运行的全局执行设置。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// The maximum number of parallel test stages. `0` picks a default based
    /// on the machine's logical CPU count.
    /// 并行测试阶段的最大数量。`0` 表示根据机器的逻辑 CPU 数选择默认值。
    #[serde(default)]
    pub jobs: usize,
    /// The default per-stage timeout in seconds, used when a stage does not
    /// declare its own. `0` disables the default timeout.
    /// 默认的单阶段超时时间（秒），在阶段未自行声明时使用。`0` 表示禁用默认超时。
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// The per-stage captured output limit in bytes. Output beyond the limit
    /// is dropped and the result is marked truncated.
    /// 每个阶段捕获输出的字节上限。超出上限的输出被丢弃，结果标记为已截断。
    #[serde(default = "default_output_limit")]
    pub output_limit_bytes: usize,
}

fn default_timeout_secs() -> u64 {
    900
}

fn default_output_limit() -> usize {
    256 * 1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jobs: 0,
            timeout_secs: default_timeout_secs(),
            output_limit_bytes: default_output_limit(),
        }
    }
}

impl Settings {
    /// Resolves the effective parallel job count: the CLI value wins, then a
    /// non-zero configured value, then half the logical CPUs plus one.
    /// 解析实际的并行作业数：CLI 值优先，其次是非零配置值，
    /// 最后为逻辑 CPU 数的一半加一。
    pub fn effective_jobs(&self, cli_jobs: Option<usize>) -> usize {
        cli_jobs
            .filter(|j| *j > 0)
            .or_else(|| (self.jobs > 0).then_some(self.jobs))
            .unwrap_or_else(|| num_cpus::get() / 2 + 1)
    }

    /// Resolves the effective timeout for a stage, if any.
    pub fn effective_timeout(&self, stage_timeout_secs: Option<u64>) -> Option<std::time::Duration> {
        stage_timeout_secs
            .or((self.timeout_secs > 0).then_some(self.timeout_secs))
            .filter(|secs| *secs > 0)
            .map(std::time::Duration::from_secs)
    }
}

/// Represents the entire pipeline configuration, loaded from `Stagehand.toml`.
/// It contains the runtime matrix, global settings and everything the
/// orchestrator runs per matrix entry.
/// 代表从 `Stagehand.toml` 加载的整个流水线配置。
/// 它包含运行时矩阵、全局设置以及编排器在每个矩阵条目上运行的全部内容。
#[derive(Debug, Deserialize, Serialize)]
pub struct Pipeline {
    /// The language for the orchestrator's output messages (e.g., "en", "zh-CN").
    /// Defaults to "en" if not specified.
    ///
    /// 编排器输出消息的语言（例如 "en", "zh-CN"）。
    /// 如果未指定，则默认为 "en"。
    #[serde(default = "default_language")]
    pub language: String,

    /// The runtime versions forming the matrix, in schedule order.
    /// 构成矩阵的运行时版本，按调度顺序排列。
    pub runtimes: Vec<String>,

    /// Global execution settings.
    /// 全局执行设置。
    #[serde(default)]
    pub settings: Settings,

    /// The fixtures prepared before test stages, in declaration order.
    /// 在测试阶段之前准备的夹具，按声明顺序排列。
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixtures: Vec<FixtureSpec>,

    /// The test stages to run per matrix entry.
    /// 每个矩阵条目上运行的测试阶段。
    #[serde(default)]
    pub stages: Vec<StageSpec>,

    /// The optional plugin-loading verification block.
    /// 可选的插件加载验证块。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<PluginConfig>,

    /// The documentation consistency checks, run once per run.
    /// 文档一致性检查，每次运行执行一次。
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docs: Vec<DocCheck>,
}

fn default_language() -> String {
    "en".to_string()
}

impl Pipeline {
    /// Loads and validates a pipeline from a TOML file.
    /// 从 TOML 文件加载并验证流水线。
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let pipeline: Pipeline = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Validates cross-field invariants that the TOML schema cannot express.
    /// All violations are configuration errors: the run must not start.
    /// 验证 TOML 结构无法表达的跨字段不变量。
    /// 所有违规都是配置错误：运行不得开始。
    pub fn validate(&self) -> Result<()> {
        if self.runtimes.is_empty() {
            bail!("the runtime matrix is empty: 'runtimes' must list at least one version");
        }
        let mut seen_runtimes = HashSet::new();
        for runtime in &self.runtimes {
            if !seen_runtimes.insert(runtime.as_str()) {
                bail!("duplicate runtime '{}' in the matrix", runtime);
            }
        }

        let mut fixture_names = HashSet::new();
        for fixture in &self.fixtures {
            if !fixture_names.insert(fixture.name.as_str()) {
                bail!("duplicate fixture name '{}'", fixture.name);
            }
            match (&fixture.build, &fixture.serve) {
                (Some(_), Some(_)) => bail!(
                    "fixture '{}' sets both 'build' and 'serve'; exactly one is required",
                    fixture.name
                ),
                (None, None) => bail!(
                    "fixture '{}' sets neither 'build' nor 'serve'; exactly one is required",
                    fixture.name
                ),
                _ => {}
            }
            if fixture.is_server() && fixture.port.is_none() {
                bail!("serve fixture '{}' must declare a 'port'", fixture.name);
            }
            Self::validate_command(
                fixture.build.as_deref().or(fixture.serve.as_deref()),
                &format!("fixture '{}'", fixture.name),
            )?;
        }

        let mut stage_names = HashSet::new();
        for stage in &self.stages {
            if !stage_names.insert(stage.name.as_str()) {
                bail!("duplicate stage name '{}'", stage.name);
            }
            Self::validate_command(Some(&stage.command), &format!("stage '{}'", stage.name))?;
            for needed in &stage.needs {
                if !fixture_names.contains(needed.as_str()) {
                    bail!(
                        "stage '{}' needs unknown fixture '{}'",
                        stage.name,
                        needed
                    );
                }
            }
        }

        if let Some(plugins) = &self.plugins {
            if plugins.discovery_env.is_empty() {
                bail!("the plugin block must name a non-empty 'discovery_env' variable");
            }
            Self::validate_command(Some(&plugins.probe), "the plugin probe")?;
            if let Some(install) = &plugins.install {
                Self::validate_command(Some(install), "the plugin install template")?;
            }
            let mut seen = HashSet::new();
            for plugin in &plugins.plugins {
                if !seen.insert(plugin.as_str()) {
                    bail!("duplicate plugin '{}' in the plugin list", plugin);
                }
            }
        }

        let mut doc_names = HashSet::new();
        for doc in &self.docs {
            if !doc_names.insert(doc.name.as_str()) {
                bail!("duplicate doc check name '{}'", doc.name);
            }
            Self::validate_command(Some(&doc.command), &format!("doc check '{}'", doc.name))?;
        }

        Ok(())
    }

    fn validate_command(command: Option<&str>, owner: &str) -> Result<()> {
        let Some(command) = command else {
            return Ok(());
        };
        match shlex::split(command) {
            Some(parts) if !parts.is_empty() => Ok(()),
            _ => bail!("{} has an empty or unparseable command: '{}'", owner, command),
        }
    }
}
