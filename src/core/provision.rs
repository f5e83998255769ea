//! # Environment Provisioning Module / 环境准备模块
//!
//! Creates the isolated runtime for one matrix entry and tears it down again.
//! The two strategies are a closed set: a conda prefix on the host, or a
//! running container. Both are represented by `EnvironmentHandle`, which is
//! consumed by `teardown` so it can only be released once.
//!
//! 为单个矩阵条目创建隔离的运行时并在结束时销毁。两种策略是封闭集合：
//! 主机上的 conda 前缀环境，或运行中的容器。二者都由 `EnvironmentHandle` 表示，
//! 它会被 `teardown` 消耗，因此只能被释放一次。

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::core::config::Settings;
use crate::core::error::{ExecutionError, ProvisionError};
use crate::core::models::{InstallStrategy, MatrixEntry};
use crate::infra::command::{CommandOutput, CommandSpec, SharedExecutor};
use crate::infra::container::{container_name, ContainerCli};
use crate::infra::fs;

/// A conda prefix living inside an entry-owned temporary workspace.
/// 位于条目专属临时工作区中的 conda 前缀环境。
pub struct LocalEnvironment {
    pub conda: Vec<String>,
    pub prefix: PathBuf,
    /// Working directory for commands: the software root or its private copy.
    pub workdir: PathBuf,
    pub env: BTreeMap<String, String>,
    /// Removed from disk when dropped.
    workspace: Option<TempDir>,
}

impl LocalEnvironment {
    pub fn new(conda: Vec<String>, prefix: PathBuf, workdir: PathBuf) -> Self {
        Self {
            conda,
            prefix,
            workdir,
            env: BTreeMap::new(),
            workspace: None,
        }
    }

    fn conda_command(&self) -> CommandSpec {
        CommandSpec::from_argv(&self.conda)
    }
}

/// A running container addressed by its entry-qualified name.
/// 通过条目限定名称寻址的运行中容器。
pub struct ContainerEnvironment {
    pub cli: ContainerCli,
    pub name: String,
    pub workdir: String,
    pub env: BTreeMap<String, String>,
    workspace: Option<TempDir>,
}

impl ContainerEnvironment {
    pub fn new(cli: ContainerCli, name: String, workdir: String) -> Self {
        Self {
            cli,
            name,
            workdir,
            env: BTreeMap::new(),
            workspace: None,
        }
    }
}

/// A live, provisioned environment. Owned by exactly one pipeline.
/// 一个已准备好的运行环境，仅由一个流水线拥有。
pub enum EnvironmentHandle {
    Local(LocalEnvironment),
    Container(ContainerEnvironment),
}

impl fmt::Debug for EnvironmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentHandle::Local(env) => f
                .debug_struct("Local")
                .field("prefix", &env.prefix)
                .field("workdir", &env.workdir)
                .finish_non_exhaustive(),
            EnvironmentHandle::Container(env) => f
                .debug_struct("Container")
                .field("name", &env.name)
                .field("workdir", &env.workdir)
                .finish_non_exhaustive(),
        }
    }
}

impl EnvironmentHandle {
    /// Identity of the underlying environment: prefix path or container name.
    pub fn id(&self) -> String {
        match self {
            EnvironmentHandle::Local(env) => env.prefix.display().to_string(),
            EnvironmentHandle::Container(env) => env.name.clone(),
        }
    }

    /// Wraps `argv` so that it runs inside this environment.
    /// 包装 `argv`，使其在此环境内运行。
    pub fn command(&self, argv: &[String]) -> CommandSpec {
        match self {
            EnvironmentHandle::Local(env) => env
                .conda_command()
                .arg("run")
                .arg("-p")
                .arg(env.prefix.display().to_string())
                .arg("--no-capture-output")
                .args(argv.iter().cloned())
                .current_dir(&env.workdir)
                .envs(&env.env),
            EnvironmentHandle::Container(env) => {
                env.cli.exec(&env.name, &env.workdir, &env.env, argv)
            }
        }
    }

    /// Fails with `EnvironmentGone` if the environment can no longer run commands.
    pub async fn ensure_alive(&self, executor: &SharedExecutor) -> Result<(), ExecutionError> {
        match self {
            EnvironmentHandle::Local(env) => {
                if env.prefix.exists() {
                    Ok(())
                } else {
                    Err(ExecutionError::EnvironmentGone(self.id()))
                }
            }
            EnvironmentHandle::Container(env) => {
                let output = executor.execute(&env.cli.inspect_running(&env.name)).await?;
                if output.success() && output.output.trim() == "true" {
                    Ok(())
                } else {
                    Err(ExecutionError::EnvironmentGone(self.id()))
                }
            }
        }
    }

    /// Copies a file produced relative to the working directory out to `dest`.
    /// Returns `Ok(false)` when the file does not exist.
    ///
    /// 将相对于工作目录生成的文件复制到 `dest`。文件不存在时返回 `Ok(false)`。
    pub async fn fetch_artifact(
        &self,
        executor: &SharedExecutor,
        relative: &str,
        dest: &Path,
    ) -> anyhow::Result<bool> {
        match self {
            EnvironmentHandle::Local(env) => {
                let source = env.workdir.join(relative);
                if !source.is_file() {
                    return Ok(false);
                }
                tokio::fs::copy(&source, dest).await?;
                Ok(true)
            }
            EnvironmentHandle::Container(env) => {
                let path = format!("{}/{}", env.workdir.trim_end_matches('/'), relative);
                let output = executor
                    .execute(&env.cli.copy_from(&env.name, &path, dest))
                    .await?;
                Ok(output.success())
            }
        }
    }
}

/// Creates and releases environments for matrix entries.
/// 为矩阵条目创建并释放环境。
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// On error nothing is left behind: partial environments are already removed.
    async fn provision(
        &self,
        entry: &MatrixEntry,
        cancel: &CancellationToken,
    ) -> Result<EnvironmentHandle, ProvisionError>;

    /// Releases the environment. Failures are logged, never raised.
    async fn teardown(&self, handle: EnvironmentHandle);
}

/// Provisions conda prefixes and containers through a `CommandExecutor`.
pub struct EnvironmentProvisioner {
    settings: Arc<Settings>,
    executor: SharedExecutor,
}

impl EnvironmentProvisioner {
    pub fn new(settings: Arc<Settings>, executor: SharedExecutor) -> Self {
        Self { settings, executor }
    }

    /// Runs one provisioning command, racing it against cancellation.
    async fn run_step(
        &self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ProvisionError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProvisionError::Cancelled),
            result = self.executor.execute(spec) => Ok(result?),
        }
    }

    fn source_dir(&self, workspace: &TempDir) -> Result<PathBuf, ProvisionError> {
        if !self.settings.isolate_source {
            return Ok(self.settings.software_root.clone());
        }
        let copy = workspace.path().join("src");
        fs::copy_dir_all(&self.settings.software_root, &copy)
            .map_err(|e| ProvisionError::Workspace(format!("{e:#}")))?;
        Ok(copy)
    }

    async fn provision_local(
        &self,
        entry: &MatrixEntry,
        cancel: &CancellationToken,
    ) -> Result<EnvironmentHandle, ProvisionError> {
        let workspace = fs::create_entry_workspace(&entry.name)
            .map_err(|e| ProvisionError::Workspace(format!("{e:#}")))?;
        let workdir = self.source_dir(&workspace)?;
        let prefix = workspace.path().join("env");

        let env = LocalEnvironment {
            conda: self.settings.conda.clone(),
            prefix: prefix.clone(),
            workdir,
            env: entry.env.clone(),
            workspace: Some(workspace),
        };

        let mut create = env
            .conda_command()
            .args(["create", "-y", "-q", "-p"])
            .arg(prefix.display().to_string())
            .arg(format!("python={}", entry.runtime_version));
        for channel in &self.settings.channels {
            create = create.arg("-c").arg(channel.clone());
        }

        tracing::debug!(entry = %entry.name, prefix = %prefix.display(), "creating conda prefix");
        match self.run_step(&create, cancel).await {
            Ok(output) if output.success() => {}
            Ok(output) => {
                self.teardown_local(env).await;
                return Err(ProvisionError::RuntimeUnavailable {
                    version: entry.runtime_version.clone(),
                    log: output.output,
                });
            }
            Err(e) => {
                self.teardown_local(env).await;
                return Err(e);
            }
        }

        if !entry.optional_dependencies.is_empty() {
            let mut install = env
                .conda_command()
                .args(["install", "-y", "-q", "-p"])
                .arg(prefix.display().to_string())
                .args(entry.optional_dependencies.iter().cloned());
            for channel in &self.settings.channels {
                install = install.arg("-c").arg(channel.clone());
            }

            match self.run_step(&install, cancel).await {
                Ok(output) if output.success() => {}
                Ok(output) => {
                    self.teardown_local(env).await;
                    return Err(ProvisionError::DependencyInstall { log: output.output });
                }
                Err(e) => {
                    self.teardown_local(env).await;
                    return Err(e);
                }
            }
        }

        Ok(EnvironmentHandle::Local(env))
    }

    async fn provision_container(
        &self,
        entry: &MatrixEntry,
        cancel: &CancellationToken,
    ) -> Result<EnvironmentHandle, ProvisionError> {
        let name = container_name(&entry.name);
        let cli = ContainerCli::new(&self.settings.container_runtime);
        let image = entry
            .param("image")
            .ok_or_else(|| ProvisionError::ContainerStart {
                name: name.clone(),
                log: "no 'image' parameter configured".to_string(),
            })?
            .to_string();

        if entry.param("pull") != Some("never") {
            tracing::debug!(entry = %entry.name, %image, "pulling image");
            let output = self.run_step(&cli.pull(&image), cancel).await?;
            if !output.success() {
                return Err(ProvisionError::ImagePull {
                    image,
                    log: output.output,
                });
            }
        }

        let keep_alive = match entry.param("command") {
            Some(command) => shlex::split(command).ok_or_else(|| ProvisionError::ContainerStart {
                name: name.clone(),
                log: format!("cannot parse container command '{command}'"),
            })?,
            None => self.settings.keep_alive.clone(),
        };

        let workspace = if self.settings.isolate_source {
            Some(
                fs::create_entry_workspace(&entry.name)
                    .map_err(|e| ProvisionError::Workspace(format!("{e:#}")))?,
            )
        } else {
            None
        };
        let mount_source = match &workspace {
            Some(workspace) => self.source_dir(workspace)?,
            None => self.settings.software_root.clone(),
        };
        let workdir = self.settings.container_workdir.clone();

        let run = cli.run_detached(&name, &image, &mount_source, &workdir, &keep_alive);
        tracing::debug!(entry = %entry.name, container = %name, "starting container");
        match self.run_step(&run, cancel).await {
            Ok(output) if output.success() => {}
            Ok(output) => {
                self.remove_container(&cli, &name).await;
                return Err(ProvisionError::ContainerStart {
                    name,
                    log: output.output,
                });
            }
            Err(e) => {
                // The container may exist even though `run` never returned.
                self.remove_container(&cli, &name).await;
                return Err(e);
            }
        }

        let probe = entry.param("readiness_probe").unwrap_or("true");
        let timeout = entry
            .param("readiness_timeout_secs")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.settings.readiness_timeout);

        if let Err(e) = self.wait_ready(&cli, &name, probe, timeout, cancel).await {
            self.remove_container(&cli, &name).await;
            return Err(e);
        }

        Ok(EnvironmentHandle::Container(ContainerEnvironment {
            cli,
            name,
            workdir,
            env: entry.env.clone(),
            workspace,
        }))
    }

    /// Polls the readiness probe until it exits 0, the timeout elapses, or the run is cancelled.
    /// 轮询就绪探针，直到其返回 0、超时或运行被取消。
    async fn wait_ready(
        &self,
        cli: &ContainerCli,
        name: &str,
        probe: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisionError> {
        let interval = self.settings.readiness_interval;
        let probe_loop = async {
            loop {
                let output = match self.executor.execute(&cli.probe(name, probe)).await {
                    Ok(output) => output,
                    Err(e) => return Err(ProvisionError::from(e)),
                };
                if output.success() {
                    return Ok::<(), ProvisionError>(());
                }
                tracing::trace!(container = %name, exit_code = output.exit_code, "not ready yet");
                tokio::time::sleep(interval).await;
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProvisionError::Cancelled),
            result = tokio::time::timeout(timeout, probe_loop) => match result {
                Ok(ready) => ready,
                Err(_) => Err(ProvisionError::ReadinessTimeout {
                    name: name.to_string(),
                    secs: timeout.as_secs(),
                }),
            },
        }
    }

    async fn remove_container(&self, cli: &ContainerCli, name: &str) {
        match self.executor.execute(&cli.remove(name)).await {
            Ok(output) if output.success() => {
                tracing::debug!(container = %name, "container removed");
            }
            Ok(output) => {
                tracing::warn!(container = %name, log = %output.output.trim(), "failed to remove container");
            }
            Err(e) => tracing::warn!(container = %name, "failed to remove container: {e}"),
        }
    }

    async fn teardown_local(&self, env: LocalEnvironment) {
        if env.prefix.exists() {
            let remove = env
                .conda_command()
                .args(["env", "remove", "-y", "-p"])
                .arg(env.prefix.display().to_string());
            match self.executor.execute(&remove).await {
                Ok(output) if output.success() => {}
                Ok(output) => {
                    tracing::warn!(prefix = %env.prefix.display(), log = %output.output.trim(), "conda env remove failed");
                }
                Err(e) => tracing::warn!(prefix = %env.prefix.display(), "conda env remove failed: {e}"),
            }
        }
        // Dropping the workspace deletes whatever conda left on disk.
        drop(env.workspace);
    }
}

#[async_trait]
impl Provisioner for EnvironmentProvisioner {
    async fn provision(
        &self,
        entry: &MatrixEntry,
        cancel: &CancellationToken,
    ) -> Result<EnvironmentHandle, ProvisionError> {
        if cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }
        match entry.install_strategy {
            InstallStrategy::Local => self.provision_local(entry, cancel).await,
            InstallStrategy::Containerized => self.provision_container(entry, cancel).await,
        }
    }

    async fn teardown(&self, handle: EnvironmentHandle) {
        match handle {
            EnvironmentHandle::Local(env) => self.teardown_local(env).await,
            EnvironmentHandle::Container(env) => {
                self.remove_container(&env.cli, &env.name).await;
                drop(env.workspace);
            }
        }
    }
}
