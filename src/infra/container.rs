//! # Container Control Module / 容器控制模块
//!
//! Builds the `docker` (or compatible runtime) invocations used by the
//! containerized strategy. Every container is addressed by an entry-qualified
//! name that also carries a per-process run id.
//!
//! 构建容器化策略使用的 `docker`（或兼容运行时）命令。
//! 每个容器都通过带条目限定且包含进程级运行 ID 的名称进行寻址。

use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::path::Path;

use crate::infra::command::CommandSpec;
use crate::infra::fs::entry_slug;

static RUN_ID: Lazy<String> = Lazy::new(|| {
    format!(
        "{}-{}",
        std::process::id(),
        chrono::Utc::now().format("%H%M%S")
    )
});

/// The container name for an entry in this process. Distinct entry names
/// always give distinct container names.
/// 本进程中某条目的容器名称。不同的条目名称总是得到不同的容器名称。
pub fn container_name(entry_name: &str) -> String {
    format!("env-matrix-{}-{}", entry_slug(entry_name), RUN_ID.as_str())
}

/// Command builder for one container runtime binary.
#[derive(Debug, Clone)]
pub struct ContainerCli {
    runtime: String,
}

impl ContainerCli {
    pub fn new(runtime: &str) -> Self {
        Self {
            runtime: runtime.to_string(),
        }
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(self.runtime.clone())
    }

    pub fn pull(&self, image: &str) -> CommandSpec {
        self.command().args(["pull", image])
    }

    /// `run -d` with the software root mounted at `workdir`.
    pub fn run_detached(
        &self,
        name: &str,
        image: &str,
        mount_source: &Path,
        workdir: &str,
        keep_alive: &[String],
    ) -> CommandSpec {
        self.command()
            .args(["run", "-d", "--name", name])
            .arg("-v")
            .arg(format!("{}:{}", mount_source.display(), workdir))
            .args(["-w", workdir, image])
            .args(keep_alive.iter().cloned())
    }

    pub fn exec(
        &self,
        name: &str,
        workdir: &str,
        env: &BTreeMap<String, String>,
        argv: &[String],
    ) -> CommandSpec {
        let mut spec = self.command().args(["exec", "-w", workdir]);
        for (key, value) in env {
            spec = spec.arg("-e").arg(format!("{key}={value}"));
        }
        spec.arg(name).args(argv.iter().cloned())
    }

    /// Runs the readiness probe through `sh -c` inside the container.
    pub fn probe(&self, name: &str, script: &str) -> CommandSpec {
        self.command().args(["exec", name, "sh", "-c", script])
    }

    /// Prints `true` when the container is running.
    pub fn inspect_running(&self, name: &str) -> CommandSpec {
        self.command()
            .args(["inspect", "-f", "{{.State.Running}}", name])
    }

    pub fn copy_from(&self, name: &str, container_path: &str, host_path: &Path) -> CommandSpec {
        self.command()
            .arg("cp")
            .arg(format!("{name}:{container_path}"))
            .arg(host_path.display().to_string())
    }

    /// Stops and removes in one call; succeeds on an already stopped container.
    pub fn remove(&self, name: &str) -> CommandSpec {
        self.command().args(["rm", "-f", name])
    }
}
