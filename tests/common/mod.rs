// Shared test helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tokio_util::sync::CancellationToken;

use env_matrix::core::aggregator::CoverageUploader;
use env_matrix::core::config::Settings;
use env_matrix::core::error::{ExecutionError, ProvisionError};
use env_matrix::core::install::Installer;
use env_matrix::core::models::{InstallResult, InstallStrategy, MatrixEntry, TestResult};
use env_matrix::core::provision::{EnvironmentHandle, LocalEnvironment, Provisioner};
use env_matrix::core::test_runner::TestRunner;
use env_matrix::infra::command::{CommandExecutor, CommandOutput, CommandSpec};

/// What the fake executor does when a rule matches.
#[derive(Debug, Clone)]
pub enum Reply {
    Exit(i32, String),
    /// Exits after sleeping, to observe concurrency and timeouts.
    Delayed(Duration, i32),
    /// Never completes; only dropping the future ends it.
    Hang,
    /// The command cannot be dispatched at all.
    SpawnError,
}

/// A scripted `CommandExecutor`. Rules are matched in insertion order against
/// the rendered command line; unmatched commands succeed with no output.
/// `conda create -p PREFIX` also creates the prefix directory, like conda does.
#[derive(Default)]
pub struct FakeExecutor {
    rules: Mutex<Vec<(Vec<String>, Reply)>>,
    calls: Mutex<Vec<CommandSpec>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Commands whose rendered line contains `pattern` get `reply`.
    pub fn on(self: &Arc<Self>, pattern: &str, reply: Reply) -> Arc<Self> {
        self.on_all(&[pattern], reply)
    }

    /// Like `on`, but the line must contain every one of `patterns`.
    pub fn on_all(self: &Arc<Self>, patterns: &[&str], reply: Reply) -> Arc<Self> {
        let patterns = patterns.iter().map(|p| p.to_string()).collect();
        self.rules.lock().unwrap().push((patterns, reply));
        Arc::clone(self)
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Rendered command lines in call order.
    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::display).collect()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines().iter().filter(|l| l.contains(needle)).count()
    }

    /// Highest number of commands that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn reply_for(&self, line: &str) -> Reply {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|(patterns, _)| patterns.iter().all(|p| line.contains(p.as_str())))
            .map(|(_, reply)| reply.clone())
            .unwrap_or(Reply::Exit(0, String::new()))
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecutionError> {
        self.calls.lock().unwrap().push(spec.clone());
        let line = spec.display();
        let reply = self.reply_for(&line);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let (exit_code, output) = match reply {
            Reply::Exit(code, output) => (code, output),
            Reply::Delayed(delay, code) => {
                tokio::time::sleep(delay).await;
                (code, String::new())
            }
            Reply::Hang => std::future::pending::<(i32, String)>().await,
            Reply::SpawnError => {
                return Err(ExecutionError::Spawn {
                    program: spec.program.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                });
            }
        };

        if exit_code == 0 && spec.args.first().map(String::as_str) == Some("create") {
            if let Some(pos) = spec.args.iter().position(|a| a == "-p") {
                if let Some(prefix) = spec.args.get(pos + 1) {
                    fs::create_dir_all(prefix).unwrap();
                }
            }
        }

        Ok(CommandOutput {
            exit_code,
            output,
            duration: Duration::from_millis(1),
        })
    }
}

/// Settings rooted at a fresh temporary software root, with artifacts kept inside it.
pub fn test_settings(root: &TempDir) -> Settings {
    let mut settings = Settings::with_root(root.path()).unwrap();
    settings.artifacts_dir = root.path().join("artifacts");
    settings.readiness_interval = Duration::from_millis(10);
    settings
}

pub fn local_entry(name: &str) -> MatrixEntry {
    MatrixEntry::new(name, "3.11", InstallStrategy::Local)
}

pub fn container_entry(name: &str, image: &str) -> MatrixEntry {
    let mut entry = MatrixEntry::new(name, "3.11", InstallStrategy::Containerized);
    entry.strategy_params.insert("image".to_string(), image.to_string());
    entry
}

// ---------------------------------------------------------------------------
// Stage doubles for pipeline-level tests
// ---------------------------------------------------------------------------

/// How a fake stage behaves for one entry.
#[derive(Debug, Clone, Default)]
pub enum Behavior {
    #[default]
    Succeed,
    Fail,
    Error,
    /// Blocks until the future is dropped.
    Hang,
    Sleep(Duration),
    /// Panics inside the stage.
    Panic,
}

/// A provisioner that hands out local handles without running anything and
/// counts every provision and teardown per entry.
#[derive(Default)]
pub struct FakeProvisioner {
    pub behavior: BTreeMap<String, Behavior>,
    pub provisioned: Mutex<Vec<String>>,
    pub torn_down: Mutex<Vec<String>>,
    pub in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    workspace: Option<TempDir>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self {
            workspace: Some(tempdir().unwrap()),
            ..Self::default()
        }
    }

    pub fn with(mut self, entry: &str, behavior: Behavior) -> Self {
        self.behavior.insert(entry.to_string(), behavior);
        self
    }

    pub fn teardowns(&self, entry: &str) -> usize {
        self.torn_down.lock().unwrap().iter().filter(|n| *n == entry).count()
    }

    fn root(&self) -> PathBuf {
        self.workspace.as_ref().map(|w| w.path().to_path_buf()).unwrap_or_default()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn provision(
        &self,
        entry: &MatrixEntry,
        cancel: &CancellationToken,
    ) -> Result<EnvironmentHandle, ProvisionError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        match self.behavior.get(&entry.name).cloned().unwrap_or_default() {
            Behavior::Fail | Behavior::Error => {
                return Err(ProvisionError::RuntimeUnavailable {
                    version: entry.runtime_version.clone(),
                    log: "PackagesNotFoundError".to_string(),
                });
            }
            Behavior::Hang => {
                cancel.cancelled().await;
                return Err(ProvisionError::Cancelled);
            }
            Behavior::Sleep(delay) => tokio::time::sleep(delay).await,
            Behavior::Panic => panic!("provisioner panicked for {}", entry.name),
            Behavior::Succeed => {}
        }

        self.provisioned.lock().unwrap().push(entry.name.clone());
        let prefix = self.root().join(&entry.name);
        fs::create_dir_all(&prefix).unwrap();
        Ok(EnvironmentHandle::Local(LocalEnvironment::new(
            vec!["conda".to_string()],
            prefix,
            self.root(),
        )))
    }

    async fn teardown(&self, handle: EnvironmentHandle) {
        let name = match &handle {
            EnvironmentHandle::Local(env) => env
                .prefix
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            EnvironmentHandle::Container(env) => env.name.clone(),
        };
        self.torn_down.lock().unwrap().push(name);
    }
}

/// An installer whose result is chosen per entry.
#[derive(Default)]
pub struct FakeInstaller {
    pub behavior: BTreeMap<String, Behavior>,
    pub calls: AtomicUsize,
}

impl FakeInstaller {
    pub fn with(mut self, entry: &str, behavior: Behavior) -> Self {
        self.behavior.insert(entry.to_string(), behavior);
        self
    }
}

#[async_trait]
impl Installer for FakeInstaller {
    async fn install(
        &self,
        _handle: &EnvironmentHandle,
        entry: &MatrixEntry,
    ) -> Result<InstallResult, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let success = match self.behavior.get(&entry.name).cloned().unwrap_or_default() {
            Behavior::Succeed => true,
            Behavior::Fail => false,
            Behavior::Error => return Err(ExecutionError::EnvironmentGone(entry.name.clone())),
            Behavior::Hang => std::future::pending().await,
            Behavior::Sleep(delay) => {
                tokio::time::sleep(delay).await;
                true
            }
            Behavior::Panic => panic!("installer panicked for {}", entry.name),
        };
        Ok(InstallResult {
            success,
            log: format!("installing into {}", entry.name),
            duration_ms: 1,
        })
    }
}

/// A test runner whose exit code is chosen per entry. Passing,
/// reporting-eligible entries get a coverage artifact path.
#[derive(Default)]
pub struct FakeTestRunner {
    pub behavior: BTreeMap<String, Behavior>,
    pub calls: AtomicUsize,
}

impl FakeTestRunner {
    pub fn with(mut self, entry: &str, behavior: Behavior) -> Self {
        self.behavior.insert(entry.to_string(), behavior);
        self
    }
}

#[async_trait]
impl TestRunner for FakeTestRunner {
    async fn run(
        &self,
        _handle: &EnvironmentHandle,
        entry: &MatrixEntry,
    ) -> Result<TestResult, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let exit_code = match self.behavior.get(&entry.name).cloned().unwrap_or_default() {
            Behavior::Succeed => 0,
            Behavior::Fail => 1,
            Behavior::Error => return Err(ExecutionError::EnvironmentGone(entry.name.clone())),
            Behavior::Hang => std::future::pending().await,
            Behavior::Sleep(delay) => {
                tokio::time::sleep(delay).await;
                0
            }
            Behavior::Panic => panic!("test runner panicked for {}", entry.name),
        };
        let coverage_artifact = (exit_code == 0 && entry.reporting_eligible)
            .then(|| PathBuf::from(format!("/artifacts/{}/coverage.xml", entry.name)));
        Ok(TestResult {
            exit_code,
            log: format!("{} tests, exit {exit_code}", entry.name),
            coverage_artifact,
            timed_out: false,
            duration_ms: 1,
        })
    }
}

/// Records uploads; fails for the entries listed in `failing`.
#[derive(Default)]
pub struct RecordingUploader {
    pub uploads: Mutex<Vec<(String, PathBuf)>>,
    pub failing: Vec<String>,
}

#[async_trait]
impl CoverageUploader for RecordingUploader {
    async fn upload(&self, entry_name: &str, artifact: &Path) -> anyhow::Result<()> {
        self.uploads
            .lock()
            .unwrap()
            .push((entry_name.to_string(), artifact.to_path_buf()));
        if self.failing.iter().any(|n| n == entry_name) {
            anyhow::bail!("collector rejected the report");
        }
        Ok(())
    }
}

/// Writes `content` to `name` inside `dir` and returns its path.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}
