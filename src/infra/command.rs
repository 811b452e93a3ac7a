//! # Process Capture Module / 进程捕获模块
//!
//! This module spawns child processes and captures their output under the
//! run's limits: a byte cap on stored output, an optional timeout and an
//! optional stop token. Both limits terminate the child forcibly; the
//! captured output up to that point is preserved.
//!
//! 此模块生成子进程并在运行限制下捕获其输出：
//! 存储输出的字节上限、可选的超时和可选的停止令牌。
//! 两种限制都会强制终止子进程；此前捕获的输出会被保留。

use crate::infra::t;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// An output accumulator with a byte limit. Lines past the limit are dropped
/// and the buffer is marked truncated; the cut always lands on a character
/// boundary.
///
/// 带字节上限的输出累加器。超出上限的行会被丢弃并将缓冲区标记为已截断；
/// 截断点总是落在字符边界上。
#[derive(Debug)]
pub struct CaptureBuffer {
    text: String,
    limit: usize,
    truncated: bool,
}

impl CaptureBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            truncated: false,
        }
    }

    /// Appends one line (plus a newline) while the buffer has room. The first
    /// line that does not fit is cut to the remaining space and everything
    /// after it is dropped.
    pub fn push_line(&mut self, line: &str) {
        if self.truncated {
            return;
        }
        let remaining = self.limit.saturating_sub(self.text.len());
        if line.len() < remaining {
            self.text.push_str(line);
            self.text.push('\n');
            return;
        }
        let mut cut = 0;
        for (idx, ch) in line.char_indices() {
            let end = idx + ch.len_utf8();
            if end > remaining {
                break;
            }
            cut = end;
        }
        self.text.push_str(&line[..cut]);
        self.text.push('\n');
        self.truncated = true;
    }

    pub fn contents(&self) -> &str {
        &self.text
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// The outcome of a captured child process.
/// 被捕获子进程的结果。
#[derive(Debug)]
pub struct Capture {
    /// The exit status, or the error that prevented the spawn.
    /// 退出状态，或阻止进程生成的错误。
    pub status: std::io::Result<ExitStatus>,
    /// Combined stdout and stderr, bounded by the byte limit.
    /// 合并的 stdout 和 stderr，受字节上限约束。
    pub output: String,
    /// `true` if output was cut off at the limit.
    /// 输出在上限处被截断时为 `true`。
    pub truncated: bool,
    /// `true` if the child was terminated by the timeout.
    /// 子进程因超时被终止时为 `true`。
    pub timed_out: bool,
    /// `true` if the child was terminated by the stop token.
    /// 子进程因停止令牌被终止时为 `true`。
    pub cancelled: bool,
}

impl Capture {
    fn spawn_failed(error: std::io::Error) -> Self {
        Self {
            status: Err(error),
            output: String::new(),
            truncated: false,
            timed_out: false,
            cancelled: false,
        }
    }
}

/// The outcome of a child process captured with separate streams, for callers
/// that parse stdout (JSON probes, regenerated documents) and only report
/// stderr.
///
/// 分流捕获的子进程结果，供解析 stdout（JSON 探测、重新生成的文档）
/// 而仅报告 stderr 的调用方使用。
#[derive(Debug)]
pub struct SplitCapture {
    pub status: std::io::Result<ExitStatus>,
    /// Standard output alone, bounded by the byte limit.
    /// 单独的标准输出，受字节上限约束。
    pub stdout: String,
    /// Standard error alone, bounded by the byte limit.
    /// 单独的标准错误，受字节上限约束。
    pub stderr: String,
    pub truncated: bool,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl SplitCapture {
    fn spawn_failed(error: std::io::Error) -> Self {
        Self {
            status: Err(error),
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
            timed_out: false,
            cancelled: false,
        }
    }
}

/// Spawns a task that drains one output stream line by line into a shared
/// bounded buffer. The task ends when the stream hits EOF, which the kill
/// paths guarantee.
/// 派生一个任务，将一个输出流逐行排入共享的有界缓冲区。
/// 流到达 EOF 时任务结束，kill 路径保证会发生这一点。
fn drain_lines<R>(stream: R, sink: Arc<Mutex<CaptureBuffer>>) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            sink.lock().await.push_line(&line);
        }
    })
}

/// Waits for the child within the given limits. When the timeout elapses or
/// the stop token fires, the child is killed and reaped before returning.
/// 在给定限制内等待子进程。超时或停止令牌触发时，
/// 子进程会在返回前被杀死并回收。
async fn wait_with_limits(
    child: &mut tokio::process::Child,
    timeout: Option<Duration>,
    stop: Option<&CancellationToken>,
) -> (std::io::Result<ExitStatus>, bool, bool) {
    let mut timed_out = false;
    let mut cancelled = false;

    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    let interrupted = async {
        match stop {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };

    let status = tokio::select! {
        status = child.wait() => Some(status),
        _ = deadline => {
            timed_out = true;
            None
        }
        _ = interrupted => {
            cancelled = true;
            None
        }
    };

    let status = match status {
        Some(status) => status,
        None => {
            if let Err(e) = child.start_kill() {
                eprintln!("Failed to kill child process: {}", e);
            }
            child.wait().await
        }
    };

    (status, timed_out, cancelled)
}

/// Spawns a command, captures its stdout and stderr combined.
/// The output streams are read concurrently into a single bounded buffer.
///
/// # Arguments
/// * `cmd` - The `tokio::process::Command` to execute.
/// * `output_limit` - The byte cap on stored output.
/// * `timeout` - An optional wall-clock limit for the child.
/// * `stop` - An optional token that terminates the child when fired.
///
/// 派生一个命令，合并捕获其 stdout 和 stderr。
/// 输出流被并发读取到同一个有界缓冲区中。
///
/// # Arguments
/// * `cmd` - 要执行的 `tokio::process::Command`。
/// * `output_limit` - 存储输出的字节上限。
/// * `timeout` - 子进程的可选挂钟时间限制。
/// * `stop` - 可选令牌，触发时终止子进程。
pub async fn spawn_and_capture(
    mut cmd: tokio::process::Command,
    output_limit: usize,
    timeout: Option<Duration>,
    stop: Option<&CancellationToken>,
) -> Capture {
    // Configure the command to capture stdout and stderr.
    // 配置命令以捕获 stdout 和 stderr。
    let mut child = match cmd
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return Capture::spawn_failed(e),
    };

    let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            return Capture::spawn_failed(std::io::Error::other(
                t!("run.capture_stdout_failed").to_string(),
            ));
        }
    };
    let stderr = match child.stderr.take() {
        Some(stderr) => stderr,
        None => {
            return Capture::spawn_failed(std::io::Error::other(
                t!("run.capture_stderr_failed").to_string(),
            ));
        }
    };

    // Use a shared bounded buffer so both streams land in one transcript.
    // 使用共享的有界缓冲区，使两个流写入同一份记录。
    let output = Arc::new(Mutex::new(CaptureBuffer::new(output_limit)));
    let stdout_handle = drain_lines(stdout, Arc::clone(&output));
    let stderr_handle = drain_lines(stderr, Arc::clone(&output));

    let (status, timed_out, cancelled) = wait_with_limits(&mut child, timeout, stop).await;

    // Wait for the reading tasks to complete to ensure all output is captured.
    // 等待读取任务完成，以确保所有输出都被捕获。
    if let Err(e) = stdout_handle.await {
        eprintln!("Failed to join stdout task: {}", e);
    }
    if let Err(e) = stderr_handle.await {
        eprintln!("Failed to join stderr task: {}", e);
    }

    let buffer = output.lock().await;
    Capture {
        status,
        output: buffer.contents().to_string(),
        truncated: buffer.is_truncated(),
        timed_out,
        cancelled,
    }
}

/// Spawns a command and captures stdout and stderr separately, under the same
/// limits as [`spawn_and_capture`]. Each stream gets its own bounded buffer.
///
/// 派生一个命令并分别捕获 stdout 和 stderr，限制与 [`spawn_and_capture`] 相同。
/// 每个流都有自己的有界缓冲区。
pub async fn spawn_and_capture_split(
    mut cmd: tokio::process::Command,
    output_limit: usize,
    timeout: Option<Duration>,
    stop: Option<&CancellationToken>,
) -> SplitCapture {
    let mut child = match cmd
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return SplitCapture::spawn_failed(e),
    };

    let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            return SplitCapture::spawn_failed(std::io::Error::other(
                t!("run.capture_stdout_failed").to_string(),
            ));
        }
    };
    let stderr = match child.stderr.take() {
        Some(stderr) => stderr,
        None => {
            return SplitCapture::spawn_failed(std::io::Error::other(
                t!("run.capture_stderr_failed").to_string(),
            ));
        }
    };

    let out_buffer = Arc::new(Mutex::new(CaptureBuffer::new(output_limit)));
    let err_buffer = Arc::new(Mutex::new(CaptureBuffer::new(output_limit)));
    let stdout_handle = drain_lines(stdout, Arc::clone(&out_buffer));
    let stderr_handle = drain_lines(stderr, Arc::clone(&err_buffer));

    let (status, timed_out, cancelled) = wait_with_limits(&mut child, timeout, stop).await;

    if let Err(e) = stdout_handle.await {
        eprintln!("Failed to join stdout task: {}", e);
    }
    if let Err(e) = stderr_handle.await {
        eprintln!("Failed to join stderr task: {}", e);
    }

    let out_buffer = out_buffer.lock().await;
    let err_buffer = err_buffer.lock().await;
    SplitCapture {
        status,
        stdout: out_buffer.contents().to_string(),
        stderr: err_buffer.contents().to_string(),
        truncated: out_buffer.is_truncated() || err_buffer.is_truncated(),
        timed_out,
        cancelled,
    }
}

/// A long-lived server child whose output is drained in the background. Used
/// for serve fixtures that stay up for the duration of a run.
///
/// 输出在后台被持续排出的长驻服务器子进程。
/// 用于在整个运行期间保持运行的 serve 夹具。
#[derive(Debug)]
pub struct ServerProcess {
    child: tokio::process::Child,
    output: Arc<Mutex<CaptureBuffer>>,
}

impl ServerProcess {
    /// Spawns the server with its output piped into a bounded buffer.
    /// 生成服务器，其输出被导入有界缓冲区。
    pub fn spawn(mut cmd: tokio::process::Command, output_limit: usize) -> std::io::Result<Self> {
        let mut child = cmd
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = Arc::new(Mutex::new(CaptureBuffer::new(output_limit)));
        if let Some(stdout) = child.stdout.take() {
            drain_lines(stdout, Arc::clone(&output));
        }
        if let Some(stderr) = child.stderr.take() {
            drain_lines(stderr, Arc::clone(&output));
        }

        Ok(Self { child, output })
    }

    /// A copy of everything the server has printed so far.
    /// 服务器到目前为止打印内容的副本。
    pub async fn output_snapshot(&self) -> String {
        self.output.lock().await.contents().to_string()
    }

    /// Checks whether the server has exited on its own.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Kills the server and reaps it. Safe to call after the child exited.
    /// 杀死并回收服务器。子进程已退出时调用也是安全的。
    pub async fn shutdown(&mut self) {
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                if let Err(e) = self.child.start_kill() {
                    eprintln!("Failed to kill server process: {}", e);
                }
            }
        }
        let _ = self.child.wait().await;
    }
}
