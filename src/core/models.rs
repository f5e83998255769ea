//! # Data Models Module / 数据模型模块
//!
//! This module defines the core data structures that flow through the
//! orchestrator: matrix entries, per-step results, and the terminal
//! `Outcome` of an entry's pipeline.
//!
//! 此模块定义了编排器中流转的核心数据结构：矩阵条目、各步骤结果，
//! 以及条目流水线的最终 `Outcome`。

use crate::core::error::ConfigError;
use crate::infra::t;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// The mechanism used to get the software under test running.
/// 用于运行被测软件的安装机制。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallStrategy {
    /// An isolated conda prefix on the invoking host.
    /// 调用主机上的隔离 conda 前缀环境。
    Local,
    /// A running container started from an image that already carries the toolkit.
    /// 从已包含工具链的镜像启动的运行中容器。
    Containerized,
}

impl InstallStrategy {
    /// The `strategy_params` keys that must be present for this strategy.
    pub fn required_params(self) -> &'static [&'static str] {
        match self {
            InstallStrategy::Local => &[],
            InstallStrategy::Containerized => &["image"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstallStrategy::Local => "local",
            InstallStrategy::Containerized => "containerized",
        }
    }
}

impl fmt::Display for InstallStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(InstallStrategy::Local),
            "containerized" => Ok(InstallStrategy::Containerized),
            other => Err(other.to_string()),
        }
    }
}

/// One validated, immutable combination to run.
/// 一个经过验证的、不可变的矩阵组合。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntry {
    /// Unique across the matrix. / 在矩阵中唯一。
    pub name: String,
    pub runtime_version: String,
    pub optional_dependencies: Vec<String>,
    pub install_strategy: InstallStrategy,
    /// Whether a passing run should hand its coverage artifact to the uploader.
    /// 通过的运行是否应将覆盖率产物交给上传器。
    pub reporting_eligible: bool,
    pub strategy_params: BTreeMap<String, String>,
    /// Extra environment variables for every command run on behalf of this entry.
    /// 为此条目运行的每个命令附加的环境变量。
    pub env: BTreeMap<String, String>,
    /// Overrides the global test timeout. / 覆盖全局测试超时。
    pub test_timeout: Option<Duration>,
}

impl MatrixEntry {
    /// Creates an entry with no dependencies, parameters, or overrides.
    pub fn new(name: &str, runtime_version: &str, install_strategy: InstallStrategy) -> Self {
        Self {
            name: name.to_string(),
            runtime_version: runtime_version.to_string(),
            optional_dependencies: Vec::new(),
            install_strategy,
            reporting_eligible: false,
            strategy_params: BTreeMap::new(),
            env: BTreeMap::new(),
            test_timeout: None,
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.strategy_params.get(key).map(String::as_str)
    }

    /// Checks that every parameter required by the entry's strategy is present and non-empty.
    /// 检查条目策略所需的每个参数都存在且非空。
    pub fn validate_params(&self) -> Result<(), ConfigError> {
        for key in self.install_strategy.required_params() {
            if self.param(key).is_none_or(|v| v.trim().is_empty()) {
                return Err(ConfigError::MissingParam {
                    entry: self.name.clone(),
                    strategy: self.install_strategy.to_string(),
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// The result of running the install procedure inside an environment.
/// 在环境中运行安装过程的结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallResult {
    pub success: bool,
    pub log: String,
    pub duration_ms: u64,
}

/// The result of running the test command inside an environment.
/// 在环境中运行测试命令的结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub exit_code: i32,
    pub log: String,
    /// Host-side copy of the coverage artifact, when one was requested and produced.
    /// 覆盖率产物在主机上的副本（若请求且已生成）。
    pub coverage_artifact: Option<PathBuf>,
    #[serde(default)]
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverallStatus {
    Passed,
    Failed,
    Errored,
}

impl OverallStatus {
    /// Localized label for display. / 用于显示的本地化标签。
    pub fn label(self, locale: &str) -> String {
        match self {
            OverallStatus::Passed => t!("report.status_passed", locale = locale).to_string(),
            OverallStatus::Failed => t!("report.status_failed", locale = locale).to_string(),
            OverallStatus::Errored => t!("report.status_errored", locale = locale).to_string(),
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            OverallStatus::Passed => "status-Passed",
            OverallStatus::Failed => "status-Failed",
            OverallStatus::Errored => "status-Errored",
        }
    }
}

/// Why an entry ended up `Errored`.
/// 条目最终为 `Errored` 的原因。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ErrorReason {
    Provision(String),
    InstallFailed,
    Execution(String),
    Cancelled,
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorReason::Provision(msg) => write!(f, "provisioning failed: {msg}"),
            ErrorReason::InstallFailed => f.write_str("installation failed"),
            ErrorReason::Execution(msg) => write!(f, "execution error: {msg}"),
            ErrorReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// The terminal record of one entry's pipeline.
/// 单个条目流水线的最终记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub entry_name: String,
    pub provision_ok: bool,
    pub install_result: Option<InstallResult>,
    pub test_result: Option<TestResult>,
    pub status: OverallStatus,
    pub reason: Option<ErrorReason>,
    pub duration_ms: u64,
}

impl Outcome {
    /// Builds an outcome, deriving its status from what the pipeline reached.
    ///
    /// `interruption` carries a failure that stopped the pipeline early
    /// (provisioning error, dispatch error, cancellation). It always wins.
    ///
    /// 构建结果，并根据流水线到达的阶段推导其状态。
    /// `interruption` 表示提前终止流水线的失败，始终优先。
    pub fn new(
        entry_name: &str,
        provision_ok: bool,
        install_result: Option<InstallResult>,
        test_result: Option<TestResult>,
        interruption: Option<ErrorReason>,
        duration: Duration,
    ) -> Self {
        let (status, reason) = match interruption {
            Some(reason) => (OverallStatus::Errored, Some(reason)),
            None => derive_status(provision_ok, install_result.as_ref(), test_result.as_ref()),
        };
        Self {
            entry_name: entry_name.to_string(),
            provision_ok,
            install_result,
            test_result,
            status,
            reason,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// An entry that never got to run because the run was cancelled first.
    pub fn cancelled_before_start(entry_name: &str) -> Self {
        Self::new(
            entry_name,
            false,
            None,
            None,
            Some(ErrorReason::Cancelled),
            Duration::ZERO,
        )
    }

    pub fn is_passed(&self) -> bool {
        self.status == OverallStatus::Passed
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Concatenates every captured log, install first. / 拼接所有捕获的日志，安装日志在前。
    pub fn combined_log(&self) -> String {
        let mut parts = Vec::new();
        if let Some(install) = &self.install_result {
            parts.push(install.log.as_str());
        }
        if let Some(test) = &self.test_result {
            parts.push(test.log.as_str());
        }
        parts.join("\n")
    }
}

/// Errored if provisioning or installation failed, Failed if the tests
/// exited nonzero, Passed otherwise.
fn derive_status(
    provision_ok: bool,
    install: Option<&InstallResult>,
    test: Option<&TestResult>,
) -> (OverallStatus, Option<ErrorReason>) {
    if !provision_ok {
        return (
            OverallStatus::Errored,
            Some(ErrorReason::Provision("environment was not provisioned".to_string())),
        );
    }
    match (install, test) {
        (Some(install), _) if !install.success => {
            (OverallStatus::Errored, Some(ErrorReason::InstallFailed))
        }
        (None, _) => (OverallStatus::Errored, Some(ErrorReason::InstallFailed)),
        (Some(_), None) => (
            OverallStatus::Errored,
            Some(ErrorReason::Execution("test stage did not run".to_string())),
        ),
        (Some(_), Some(test)) if !test.passed() => (OverallStatus::Failed, None),
        (Some(_), Some(_)) => (OverallStatus::Passed, None),
    }
}
