//! # Entry Pipeline Module / 条目流水线模块
//!
//! Runs one matrix entry from start to finish:
//! provision → install → test → outcome. Steps are strictly sequential and
//! the first failure short-circuits to the outcome. Whatever happens, a
//! provisioned environment is torn down exactly once before returning,
//! even when a stage panics.
//!
//! 从头到尾运行单个矩阵条目：准备环境 → 安装 → 测试 → 结果。
//! 各步骤严格按顺序执行，首个失败会直接进入结果记录。
//! 无论发生什么，已准备的环境都会在返回前被销毁且仅销毁一次。

use colored::*;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::config::Settings;
use crate::core::error::ProvisionError;
use crate::core::install::{CommandInstaller, Installer};
use crate::core::models::{ErrorReason, InstallResult, MatrixEntry, OverallStatus, Outcome, TestResult};
use crate::core::provision::{EnvironmentHandle, EnvironmentProvisioner, Provisioner};
use crate::core::test_runner::{CommandTestRunner, TestRunner};
use crate::infra::command::SharedExecutor;
use crate::infra::t;

/// The three per-entry collaborators, shared by every pipeline of a run.
/// 每个条目的三个协作组件，由一次运行中的所有流水线共享。
#[derive(Clone)]
pub struct Pipeline {
    provisioner: Arc<dyn Provisioner>,
    installer: Arc<dyn Installer>,
    runner: Arc<dyn TestRunner>,
}

#[derive(Default)]
struct StageResults {
    install: Option<InstallResult>,
    test: Option<TestResult>,
    interruption: Option<ErrorReason>,
}

impl Pipeline {
    pub fn new(
        provisioner: Arc<dyn Provisioner>,
        installer: Arc<dyn Installer>,
        runner: Arc<dyn TestRunner>,
    ) -> Self {
        Self {
            provisioner,
            installer,
            runner,
        }
    }

    /// The production wiring: every step goes through the same executor.
    pub fn from_settings(settings: Arc<Settings>, executor: SharedExecutor) -> Self {
        Self::new(
            Arc::new(EnvironmentProvisioner::new(settings.clone(), executor.clone())),
            Arc::new(CommandInstaller::new(settings.clone(), executor.clone())),
            Arc::new(CommandTestRunner::new(settings, executor)),
        )
    }

    /// Runs one entry and returns its terminal outcome. Never fails: every
    /// error is folded into the outcome.
    ///
    /// 运行单个条目并返回其最终结果。此函数不会失败：所有错误都会被折叠进结果中。
    pub async fn run_entry(&self, entry: &MatrixEntry, cancel: &CancellationToken) -> Outcome {
        let start = Instant::now();
        if cancel.is_cancelled() {
            return Outcome::cancelled_before_start(&entry.name);
        }

        println!(
            "{}",
            t!("run.provisioning", name = &entry.name, strategy = entry.install_strategy.as_str()).blue()
        );

        let handle = match self.provisioner.provision(entry, cancel).await {
            Ok(handle) => handle,
            Err(e) => {
                let reason = match e {
                    ProvisionError::Cancelled => ErrorReason::Cancelled,
                    other => ErrorReason::Provision(other.to_string()),
                };
                let outcome = Outcome::new(&entry.name, false, None, None, Some(reason), start.elapsed());
                report_outcome(&outcome);
                return outcome;
            }
        };
        tracing::debug!(entry = %entry.name, environment = %handle.id(), "environment ready");

        // A panicking stage must not skip teardown.
        // 阶段发生 panic 时也不能跳过销毁。
        let stages = AssertUnwindSafe(self.run_stages(&handle, entry, cancel))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                tracing::error!(entry = %entry.name, "stage panicked");
                StageResults {
                    interruption: Some(ErrorReason::Execution(format!(
                        "stage panicked: {}",
                        panic_message(panic.as_ref())
                    ))),
                    ..StageResults::default()
                }
            });
        self.provisioner.teardown(handle).await;

        let outcome = Outcome::new(
            &entry.name,
            true,
            stages.install,
            stages.test,
            stages.interruption,
            start.elapsed(),
        );
        report_outcome(&outcome);
        outcome
    }

    async fn run_stages(
        &self,
        handle: &EnvironmentHandle,
        entry: &MatrixEntry,
        cancel: &CancellationToken,
    ) -> StageResults {
        let mut results = StageResults::default();

        println!("{}", t!("run.installing", name = &entry.name).blue());
        let install = match until_cancelled(cancel, self.installer.install(handle, entry)).await {
            None => {
                results.interruption = Some(ErrorReason::Cancelled);
                return results;
            }
            Some(Err(e)) => {
                results.interruption = Some(ErrorReason::Execution(e.to_string()));
                return results;
            }
            Some(Ok(install)) => install,
        };
        let installed = install.success;
        results.install = Some(install);
        if !installed {
            return results;
        }

        println!("{}", t!("run.testing", name = &entry.name).blue());
        match until_cancelled(cancel, self.runner.run(handle, entry)).await {
            None => results.interruption = Some(ErrorReason::Cancelled),
            Some(Err(e)) => results.interruption = Some(ErrorReason::Execution(e.to_string())),
            Some(Ok(test)) => results.test = Some(test),
        }
        results
    }
}

/// `None` if the token fires first; the step future is dropped, which kills its process.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, step: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = step => Some(output),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn report_outcome(outcome: &Outcome) {
    let secs = format!("{:.2}", outcome.duration().as_secs_f64());
    let line = match outcome.status {
        OverallStatus::Passed => {
            t!("run.entry_passed", name = &outcome.entry_name, duration = secs).green()
        }
        OverallStatus::Failed => {
            t!("run.entry_failed", name = &outcome.entry_name, duration = secs).red()
        }
        OverallStatus::Errored => {
            let reason = outcome.reason.as_ref().map(|r| r.to_string()).unwrap_or_default();
            t!("run.entry_errored", name = &outcome.entry_name, reason = reason).red()
        }
    };
    println!("{line}");
}
