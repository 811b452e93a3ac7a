//! # Fixture Module / 夹具模块
//!
//! This module prepares the fixtures test stages depend on: artifact builds
//! that run to completion before any dependent stage starts, and long-lived
//! servers that are spawned once, probed for readiness over TCP, kept for the
//! whole run and killed before the orchestrator returns. A fixture failure
//! never aborts the run; dependent stages are skipped and independent stages
//! still execute.
//!
//! 此模块准备测试阶段依赖的夹具：在任何依赖阶段开始前完成的产物构建，
//! 以及只生成一次、通过 TCP 探测就绪、保持整个运行期并在编排器返回前被杀死的长驻服务器。
//! 夹具失败不会中止运行；依赖它的阶段被跳过，独立阶段照常执行。

use chrono::Utc;
use colored::*;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        config::FixtureSpec,
        models::{StageKind, StageResult, StageStatus},
        stage::{RUNTIME_ENV, StageContext, parse_command_line, skipped_stage},
    },
    infra::{
        command::{self, ServerProcess},
        t,
    },
};

/// How often the readiness probe retries the TCP connect.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a single readiness connect attempt may block.
const READY_CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

/// Owns the run's fixture state: the live server processes and, per matrix
/// entry, the fixtures that failed and the reasons. Servers are shared across
/// entries; failure state is reset before each entry so a fixture gets a
/// fresh attempt.
///
/// 拥有运行的夹具状态：存活的服务器进程，以及每个矩阵条目上失败的夹具及原因。
/// 服务器在条目间共享；失败状态在每个条目前重置，让夹具获得新的尝试机会。
#[derive(Debug, Default)]
pub struct FixtureSet {
    servers: HashMap<String, ServerProcess>,
    failed: BTreeMap<String, String>,
}

impl FixtureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixtures that failed for the current matrix entry, with reasons.
    /// Stages that need one of these are skipped instead of run.
    /// 当前矩阵条目上失败的夹具及原因。依赖它们的阶段会被跳过而不运行。
    pub fn blocked(&self) -> &BTreeMap<String, String> {
        &self.failed
    }

    /// Checks whether the named fixture is usable for the current entry.
    pub fn is_ready(&self, name: &str) -> bool {
        !self.failed.contains_key(name)
    }

    /// Prepares every fixture for one matrix entry, in declaration order and
    /// strictly before any dependent stage runs. Returns one result per
    /// fixture.
    ///
    /// 为一个矩阵条目准备所有夹具，按声明顺序且严格先于任何依赖阶段。
    /// 每个夹具返回一个结果。
    pub async fn prepare_all(
        &mut self,
        specs: &[FixtureSpec],
        ctx: &StageContext<'_>,
    ) -> Vec<StageResult> {
        self.failed.clear();

        let mut results = Vec::with_capacity(specs.len());
        for spec in specs {
            if ctx.stop.is_cancelled() {
                self.failed
                    .insert(spec.name.clone(), "run cancelled".to_string());
                results.push(skipped_stage(
                    &spec.name,
                    StageKind::Fixture,
                    &ctx.entry.runtime,
                    false,
                    "run cancelled",
                ));
                continue;
            }

            let result = if spec.is_server() {
                self.prepare_server(spec, ctx).await
            } else {
                self.prepare_build(spec, ctx).await
            };
            if result.is_failure() {
                // skip_reason is never set on a failure; the output carries
                // the details, the map carries the short reason.
                let reason = failure_reason(&result);
                self.failed.insert(spec.name.clone(), reason);
            }
            results.push(result);
        }
        results
    }

    /// Prepares an artifact-building fixture. An existing artifact path makes
    /// the build a no-op; a fixture without a declared artifact builds on
    /// every matrix entry.
    /// 准备构建产物的夹具。产物路径已存在时构建为空操作；
    /// 未声明产物的夹具在每个矩阵条目上都会构建。
    async fn prepare_build(&mut self, spec: &FixtureSpec, ctx: &StageContext<'_>) -> StageResult {
        let runtime = &ctx.entry.runtime;

        if let Some(artifact) = &spec.artifact {
            let artifact_path = ctx.project_root.join(artifact);
            if artifact_path.exists() {
                println!(
                    "{}",
                    t!(
                        "fixture.reused_artifact",
                        name = &spec.name,
                        path = artifact_path.display()
                    )
                    .green()
                );
                return StageResult {
                    stage: spec.name.clone(),
                    kind: StageKind::Fixture,
                    runtime: runtime.clone(),
                    status: StageStatus::Passed,
                    exit_code: None,
                    started_at: Utc::now(),
                    duration: Duration::from_secs(0),
                    output: format!("artifact up to date: {}", artifact_path.display()),
                    truncated: false,
                    allow_failure: false,
                    skip_reason: None,
                };
            }
        }

        println!("{}", t!("fixture.preparing", name = &spec.name).blue());
        let started_at = Utc::now();
        let timer = Instant::now();

        let build = spec.build.as_deref().unwrap_or_default();
        let (cmd, expanded) = match self.build_fixture_command(spec, build, ctx) {
            Ok(built) => built,
            Err(message) => {
                return failed_fixture(spec, runtime, started_at, timer.elapsed(), message);
            }
        };

        let timeout = ctx.settings.effective_timeout(None);
        let capture = command::spawn_and_capture(
            cmd,
            ctx.settings.output_limit_bytes,
            timeout,
            Some(&ctx.stop),
        )
        .await;
        let duration = timer.elapsed();
        let duration_str = format!("{:.2}", duration.as_secs_f64());

        let command_log = format!("{} {}\n", t!("run.command_prefix"), expanded);
        let output = format!("{command_log}{}", capture.output);

        let (status, exit_code) = match capture.status {
            Ok(status) => {
                if capture.cancelled {
                    (StageStatus::Skipped, status.code())
                } else if capture.timed_out {
                    (StageStatus::TimedOut, status.code())
                } else if status.success() {
                    (StageStatus::Passed, status.code())
                } else {
                    (StageStatus::Failed, status.code())
                }
            }
            Err(e) => {
                return failed_fixture(
                    spec,
                    runtime,
                    started_at,
                    duration,
                    format!("{command_log}{}: {}", t!("run.spawn_failed"), e),
                );
            }
        };

        match status {
            StageStatus::Passed => println!(
                "{}",
                t!("fixture.build_passed", name = &spec.name, duration = &duration_str).green()
            ),
            _ => println!(
                "{}",
                t!("fixture.failed", name = &spec.name, duration = &duration_str).red()
            ),
        }

        StageResult {
            stage: spec.name.clone(),
            kind: StageKind::Fixture,
            runtime: runtime.clone(),
            status,
            exit_code,
            started_at,
            duration,
            output,
            truncated: capture.truncated,
            allow_failure: false,
            skip_reason: (status == StageStatus::Skipped).then(|| "run cancelled".to_string()),
        }
    }

    /// Prepares a serving fixture. A server that is still alive from an
    /// earlier matrix entry is reused; otherwise the server is spawned and
    /// probed until it accepts TCP connections or the ready timeout elapses.
    /// 准备服务夹具。先前矩阵条目留下且仍存活的服务器会被复用；
    /// 否则生成服务器并探测，直到其接受 TCP 连接或就绪超时。
    async fn prepare_server(&mut self, spec: &FixtureSpec, ctx: &StageContext<'_>) -> StageResult {
        let runtime = &ctx.entry.runtime;
        let port = spec.port.unwrap_or_default();
        let started_at = Utc::now();
        let timer = Instant::now();

        if let Some(server) = self.servers.get_mut(&spec.name) {
            match server.try_wait() {
                Ok(None) => {
                    println!(
                        "{}",
                        t!("fixture.already_serving", name = &spec.name, port = port).green()
                    );
                    return StageResult {
                        stage: spec.name.clone(),
                        kind: StageKind::Fixture,
                        runtime: runtime.clone(),
                        status: StageStatus::Passed,
                        exit_code: None,
                        started_at,
                        duration: timer.elapsed(),
                        output: format!("already serving on 127.0.0.1:{}", port),
                        truncated: false,
                        allow_failure: false,
                        skip_reason: None,
                    };
                }
                _ => {
                    // The server died between entries; reap it and start fresh.
                    // 服务器在条目之间退出；回收后重新启动。
                    if let Some(mut dead) = self.servers.remove(&spec.name) {
                        dead.shutdown().await;
                    }
                }
            }
        }

        println!("{}", t!("fixture.preparing", name = &spec.name).blue());

        let serve = spec.serve.as_deref().unwrap_or_default();
        let serve = serve.replace("{port}", &port.to_string());
        let (cmd, expanded) = match self.build_fixture_command(spec, &serve, ctx) {
            Ok(built) => built,
            Err(message) => {
                return failed_fixture(spec, runtime, started_at, timer.elapsed(), message);
            }
        };

        let mut server = match ServerProcess::spawn(cmd, ctx.settings.output_limit_bytes) {
            Ok(server) => server,
            Err(e) => {
                let message = format!(
                    "{} {}\n{}: {}",
                    t!("run.command_prefix"),
                    expanded,
                    t!("run.spawn_failed"),
                    e
                );
                return failed_fixture(spec, runtime, started_at, timer.elapsed(), message);
            }
        };

        let ready_timeout = Duration::from_secs(spec.ready_timeout_secs);
        match wait_until_ready(&mut server, port, ready_timeout, &ctx.stop).await {
            Ok(()) => {
                println!(
                    "{}",
                    t!("fixture.serving", name = &spec.name, port = port).green()
                );
                self.servers.insert(spec.name.clone(), server);
                StageResult {
                    stage: spec.name.clone(),
                    kind: StageKind::Fixture,
                    runtime: runtime.clone(),
                    status: StageStatus::Passed,
                    exit_code: None,
                    started_at,
                    duration: timer.elapsed(),
                    output: format!(
                        "{} {}\nserving on 127.0.0.1:{}",
                        t!("run.command_prefix"),
                        expanded,
                        port
                    ),
                    truncated: false,
                    allow_failure: false,
                    skip_reason: None,
                }
            }
            Err(error) => {
                println!(
                    "{}",
                    t!("fixture.not_ready", name = &spec.name, error = &error).red()
                );
                let transcript = server.output_snapshot().await;
                server.shutdown().await;
                failed_fixture(
                    spec,
                    runtime,
                    started_at,
                    timer.elapsed(),
                    format!(
                        "{} {}\n{}\n{}",
                        t!("run.command_prefix"),
                        expanded,
                        error,
                        transcript
                    ),
                )
            }
        }
    }

    /// Builds the process command for a fixture step.
    fn build_fixture_command(
        &self,
        spec: &FixtureSpec,
        raw: &str,
        ctx: &StageContext<'_>,
    ) -> Result<(tokio::process::Command, String), String> {
        let (parts, expanded) = parse_command_line(raw, &ctx.entry.runtime)?;

        let mut cmd = tokio::process::Command::new(&parts[0]);
        cmd.args(&parts[1..]).kill_on_drop(true);

        let cwd = match &spec.working_dir {
            Some(dir) => ctx.project_root.join(dir),
            None => ctx.project_root.to_path_buf(),
        };
        cmd.current_dir(&cwd);

        cmd.env(RUNTIME_ENV, &ctx.entry.runtime);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        Ok((cmd, expanded))
    }

    /// Kills every live server and reaps it. Called once at the end of the
    /// run and again is a no-op.
    /// 杀死并回收所有存活的服务器。运行结束时调用一次，重复调用为空操作。
    pub async fn shutdown(&mut self) {
        if self.servers.is_empty() {
            return;
        }
        println!("{}", t!("fixture.shutdown", count = self.servers.len()).cyan());
        for (_, mut server) in self.servers.drain() {
            server.shutdown().await;
        }
    }
}

/// Builds a failed fixture result from an error message.
fn failed_fixture(
    spec: &FixtureSpec,
    runtime: &str,
    started_at: chrono::DateTime<Utc>,
    duration: Duration,
    output: String,
) -> StageResult {
    println!(
        "{}",
        t!(
            "fixture.failed",
            name = &spec.name,
            duration = &format!("{:.2}", duration.as_secs_f64())
        )
        .red()
    );
    StageResult {
        stage: spec.name.clone(),
        kind: StageKind::Fixture,
        runtime: runtime.to_string(),
        status: StageStatus::Failed,
        exit_code: None,
        started_at,
        duration,
        output,
        truncated: false,
        allow_failure: false,
        skip_reason: None,
    }
}

/// The short reason recorded for dependents when a fixture result failed.
fn failure_reason(result: &StageResult) -> String {
    match result.status {
        StageStatus::TimedOut => "timed out".to_string(),
        _ => match result.exit_code {
            Some(code) => format!("exited with status {}", code),
            None => "failed to start or become ready".to_string(),
        },
    }
}

/// Polls the server's port until it accepts a TCP connection, the server
/// exits, the timeout elapses or the run is cancelled.
/// 轮询服务器端口，直到其接受 TCP 连接、服务器退出、超时或运行被取消。
async fn wait_until_ready(
    server: &mut ServerProcess,
    port: u16,
    ready_timeout: Duration,
    stop: &CancellationToken,
) -> Result<(), String> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let started = Instant::now();

    loop {
        if stop.is_cancelled() {
            return Err("run cancelled before the server became ready".to_string());
        }
        if let Ok(Some(status)) = server.try_wait() {
            return Err(format!("server exited before becoming ready ({})", status));
        }
        if let Ok(Ok(_)) = tokio::time::timeout(READY_CONNECT_TIMEOUT, TcpStream::connect(addr)).await
        {
            return Ok(());
        }
        if started.elapsed() >= ready_timeout {
            return Err(format!(
                "no connection accepted on 127.0.0.1:{} within {}s",
                port,
                ready_timeout.as_secs()
            ));
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}
