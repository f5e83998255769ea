//! # Command Execution Module / 命令执行模块
//!
//! The subprocess capability every pipeline step goes through. Steps never
//! spawn processes directly; they build a `CommandSpec` and hand it to an
//! injected `CommandExecutor`, so tests can substitute a scripted executor.
//!
//! 每个流水线步骤所使用的子进程能力。步骤从不直接派生进程，
//! 而是构建 `CommandSpec` 并交给注入的 `CommandExecutor`，以便测试替换为脚本化执行器。

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::core::error::{ConfigError, ExecutionError};
use crate::infra::t;

/// A fully specified command: program, arguments, working directory and extra environment.
/// 完整指定的命令：程序、参数、工作目录和附加环境变量。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Builds a spec from an argv vector. An empty vector yields an empty program.
    pub fn from_argv(argv: &[String]) -> Self {
        let mut spec = Self::new(argv.first().cloned().unwrap_or_default());
        spec.args = argv.iter().skip(1).cloned().collect();
        spec
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// A shell-like rendering for logs. / 用于日志的类 shell 表示。
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| shlex::try_quote(part).map(|q| q.into_owned()).unwrap_or_else(|_| part.to_string()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a finished command produced. A nonzero `exit_code` is data, not an error.
/// 已完成命令的产出。非零 `exit_code` 是数据，而不是错误。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    /// Interleaved stdout and stderr. / 交错的 stdout 与 stderr。
    pub output: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs commands on the invoking host.
/// 在调用主机上运行命令。
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs the command to completion. Returns `Err` only if it could not be
    /// dispatched or waited on. Dropping the future must stop the process.
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecutionError>;
}

pub type SharedExecutor = Arc<dyn CommandExecutor>;

/// The real executor backed by `tokio::process`.
/// 基于 `tokio::process` 的真实执行器。
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecutionError> {
        tracing::debug!(command = %spec.display(), cwd = ?spec.cwd, "dispatching command");

        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args).envs(&spec.env).kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        let start = Instant::now();
        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        let (status, output) = spawn_and_capture(child).await;
        let status = status.map_err(|source| ExecutionError::Wait {
            program: spec.program.clone(),
            source,
        })?;

        Ok(CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            output,
            duration: start.elapsed(),
        })
    }
}

/// Captures stdout and stderr of a spawned child until it exits.
/// The output streams are read concurrently and combined into a single string.
///
/// 捕获已派生子进程的 stdout 和 stderr，直到其退出。
/// 输出流被并发读取并合并到一个字符串中。
pub async fn spawn_and_capture(
    mut child: tokio::process::Child,
) -> (std::io::Result<std::process::ExitStatus>, String) {
    let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            return (
                Err(std::io::Error::other(t!("command.capture_stdout_failed").to_string())),
                String::new(),
            );
        }
    };
    let stderr = match child.stderr.take() {
        Some(stderr) => stderr,
        None => {
            return (
                Err(std::io::Error::other(t!("command.capture_stderr_failed").to_string())),
                String::new(),
            );
        }
    };

    // Both readers append to the same buffer so lines keep their arrival order.
    // 两个读取任务写入同一个缓冲区，使行保持到达顺序。
    let output = Arc::new(tokio::sync::Mutex::new(String::new()));

    let stdout_output = Arc::clone(&output);
    let stdout_handle = tokio::spawn(drain_lines(stdout, stdout_output));

    let stderr_output = Arc::clone(&output);
    let stderr_handle = tokio::spawn(drain_lines(stderr, stderr_output));

    let status = child.wait().await;

    if let Err(e) = stdout_handle.await {
        tracing::warn!("failed to join stdout reader: {e}");
    }
    if let Err(e) = stderr_handle.await {
        tracing::warn!("failed to join stderr reader: {e}");
    }

    let output = output.lock().await.clone();
    (status, output)
}

/// Appends every line of `stream` to `output` until EOF. Lines are read as
/// bytes so invalid UTF-8 is replaced instead of ending the read early.
///
/// 将 `stream` 的每一行追加到 `output` 直到 EOF。按字节读取，
/// 无效的 UTF-8 会被替换，而不会提前终止读取。
async fn drain_lines<R>(stream: R, output: Arc<tokio::sync::Mutex<String>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if line.last() == Some(&b'\n') {
                    line.pop();
                }
                let mut output = output.lock().await;
                output.push_str(&String::from_utf8_lossy(&line));
                output.push('\n');
            }
            Err(e) => {
                tracing::warn!("failed to read command output: {e}");
                break;
            }
        }
    }
}

/// Expands `~` and `$VARS` in a configured command line and splits it into argv.
/// 展开配置命令行中的 `~` 与 `$VARS`，并拆分为 argv。
pub fn parse_command_line(field: &str, command: &str) -> Result<Vec<String>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidCommand {
        field: field.to_string(),
        reason,
    };

    let expanded = shellexpand::full(command)
        .map_err(|e| invalid(e.to_string()))?
        .to_string();
    let parts = shlex::split(&expanded)
        .ok_or_else(|| invalid(format!("unbalanced quoting in '{expanded}'")))?;
    if parts.is_empty() {
        return Err(invalid("command is empty".to_string()));
    }
    Ok(parts)
}

/// Keeps the last `max_lines` lines of a log, noting how many were left out.
/// 保留日志的最后 `max_lines` 行，并注明省略了多少行。
pub fn log_excerpt(log: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = log.lines().collect();
    if lines.len() <= max_lines {
        return log.trim_end().to_string();
    }
    let omitted = lines.len() - max_lines;
    format!(
        "{}\n{}",
        t!("command.lines_omitted", count = omitted),
        lines[omitted..].join("\n")
    )
}
