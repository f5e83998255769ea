//! # Installer Module / 安装模块
//!
//! Runs the install procedure for the software under test inside a
//! provisioned environment. The same argv is used for both strategies; the
//! `EnvironmentHandle` decides how it is dispatched (`conda run` or
//! `docker exec`).
//!
//! 在已准备的环境中运行被测软件的安装过程。两种策略使用相同的 argv，
//! 由 `EnvironmentHandle` 决定派发方式（`conda run` 或 `docker exec`）。

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::config::Settings;
use crate::core::error::ExecutionError;
use crate::core::models::{InstallResult, MatrixEntry};
use crate::core::provision::EnvironmentHandle;
use crate::infra::command::SharedExecutor;

#[async_trait]
pub trait Installer: Send + Sync {
    /// A nonzero exit is reported as `success = false`; only a command that
    /// could not be dispatched is an error.
    async fn install(
        &self,
        handle: &EnvironmentHandle,
        entry: &MatrixEntry,
    ) -> Result<InstallResult, ExecutionError>;
}

/// Installs with the configured `commands.install` line.
pub struct CommandInstaller {
    settings: Arc<Settings>,
    executor: SharedExecutor,
}

impl CommandInstaller {
    pub fn new(settings: Arc<Settings>, executor: SharedExecutor) -> Self {
        Self { settings, executor }
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn install(
        &self,
        handle: &EnvironmentHandle,
        entry: &MatrixEntry,
    ) -> Result<InstallResult, ExecutionError> {
        handle.ensure_alive(&self.executor).await?;

        let spec = handle.command(&self.settings.install_command);
        tracing::debug!(entry = %entry.name, command = %spec.display(), "installing");
        let output = self.executor.execute(&spec).await?;

        let log = format!("$ {}\n{}", spec.display(), output.output);
        Ok(InstallResult {
            success: output.success(),
            log,
            duration_ms: output.duration.as_millis() as u64,
        })
    }
}
