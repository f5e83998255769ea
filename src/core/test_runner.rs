//! # Test Runner Module / 测试运行模块
//!
//! Executes the test command inside a provisioned environment and, for
//! reporting-eligible entries, copies the coverage artifact out of it before
//! the environment is torn down.
//!
//! 在已准备的环境中执行测试命令；对于需要上报的条目，
//! 在环境销毁前将覆盖率产物复制出来。

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::config::Settings;
use crate::core::error::ExecutionError;
use crate::core::models::{MatrixEntry, TestResult};
use crate::core::provision::EnvironmentHandle;
use crate::infra::command::SharedExecutor;
use crate::infra::{fs, t};

/// Exit code recorded for a test command killed by the timeout, as `timeout(1)` does.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(
        &self,
        handle: &EnvironmentHandle,
        entry: &MatrixEntry,
    ) -> Result<TestResult, ExecutionError>;
}

/// Runs the configured `commands.test` line.
pub struct CommandTestRunner {
    settings: Arc<Settings>,
    executor: SharedExecutor,
}

impl CommandTestRunner {
    pub fn new(settings: Arc<Settings>, executor: SharedExecutor) -> Self {
        Self { settings, executor }
    }

    fn test_argv(&self, entry: &MatrixEntry) -> Vec<String> {
        let mut argv = self.settings.test_command.clone();
        if entry.reporting_eligible {
            argv.extend(self.settings.coverage.args.iter().cloned());
        }
        argv
    }

    /// Best effort: a missing or uncopyable artifact is logged and yields `None`.
    async fn collect_coverage(
        &self,
        handle: &EnvironmentHandle,
        entry: &MatrixEntry,
    ) -> Option<PathBuf> {
        let artifact = &self.settings.coverage.artifact;
        let file_name = Path::new(artifact).file_name()?.to_owned();
        let dir = match fs::entry_artifact_dir(&self.settings.artifacts_dir, &entry.name) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(entry = %entry.name, "cannot store coverage artifact: {e:#}");
                return None;
            }
        };
        let dest = dir.join(file_name);

        match handle.fetch_artifact(&self.executor, artifact, &dest).await {
            Ok(true) => Some(dest),
            Ok(false) => {
                tracing::warn!(entry = %entry.name, %artifact, "test run produced no coverage artifact");
                None
            }
            Err(e) => {
                tracing::warn!(entry = %entry.name, %artifact, "failed to retrieve coverage artifact: {e:#}");
                None
            }
        }
    }
}

#[async_trait]
impl TestRunner for CommandTestRunner {
    async fn run(
        &self,
        handle: &EnvironmentHandle,
        entry: &MatrixEntry,
    ) -> Result<TestResult, ExecutionError> {
        handle.ensure_alive(&self.executor).await?;

        let spec = handle.command(&self.test_argv(entry));
        let command_log = format!("$ {}\n", spec.display());
        tracing::debug!(entry = %entry.name, command = %spec.display(), "running tests");

        let limit = entry.test_timeout.or(self.settings.test_timeout);
        let execution = self.executor.execute(&spec);
        let output = match limit {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(output) => output?,
                Err(_) => {
                    return Ok(TestResult {
                        exit_code: TIMEOUT_EXIT_CODE,
                        log: format!(
                            "{command_log}{}",
                            t!("run.test_timeout_message", secs = limit.as_secs())
                        ),
                        coverage_artifact: None,
                        timed_out: true,
                        duration_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => execution.await?,
        };

        let coverage_artifact = if entry.reporting_eligible {
            self.collect_coverage(handle, entry).await
        } else {
            None
        };

        Ok(TestResult {
            exit_code: output.exit_code,
            log: format!("{command_log}{}", output.output),
            coverage_artifact,
            timed_out: false,
            duration_ms: output.duration.as_millis() as u64,
        })
    }
}
