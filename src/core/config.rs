//! # Configuration Module / 配置模块
//!
//! The on-disk matrix definition (`EnvMatrix.toml`) and the immutable
//! `Settings` resolved from it once at startup.
//!
//! 磁盘上的矩阵定义（`EnvMatrix.toml`），以及启动时从中一次性解析出的不可变 `Settings`。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::ConfigError;
use crate::infra::command::parse_command_line;

/// A single entry as written in the matrix file, before validation.
/// 矩阵文件中书写的单个条目（验证之前）。
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EntryDefinition {
    /// The unique name for the entry, used in logs, reports and environment names.
    /// 条目的唯一名称，用于日志、报告和环境名称。
    pub name: String,
    /// Interpreter version to pin (e.g. "3.9"). Required for local entries.
    /// 要固定的解释器版本（例如 "3.9"）。本地条目必填。
    #[serde(default)]
    pub runtime_version: String,
    #[serde(default)]
    pub optional_dependencies: Vec<String>,
    /// `"local"` or `"containerized"`.
    pub install_strategy: String,
    #[serde(default)]
    pub reporting_eligible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Strategy specific settings, e.g. `image` for containerized entries.
    /// 策略相关设置，例如容器化条目的 `image`。
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub strategy_params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Run inside the environment with the software root as working directory.
    /// Must be safe to re-run.
    pub install: String,
    pub test: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_timeout_secs: Option<u64>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            install: "python -m pip install --no-deps .".to_string(),
            test: "python -m pytest -v".to_string(),
            test_timeout_secs: None,
        }
    }
}

/// Extra test arguments for reporting-eligible entries.
/// `{rule_file}` and `{artifact}` are substituted in `args`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub rule_file: String,
    pub artifact: String,
    pub args: Vec<String>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            rule_file: ".coveragerc".to_string(),
            artifact: "coverage.xml".to_string(),
            args: vec![
                "--cov".to_string(),
                "--cov-config={rule_file}".to_string(),
                "--cov-report=xml:{artifact}".to_string(),
            ],
        }
    }
}

/// Host command used to hand a coverage artifact to an external collector.
/// `{artifact}` and `{entry}` are substituted.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Command line used to invoke conda. May carry leading arguments.
    pub conda: String,
    pub channels: Vec<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            conda: "conda".to_string(),
            channels: vec!["conda-forge".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub runtime: String,
    /// Mount point of the software root inside the container.
    pub workdir: String,
    pub readiness_timeout_secs: u64,
    pub readiness_interval_ms: u64,
    /// Command that keeps the container alive when the entry sets no `command` param.
    pub keep_alive: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            workdir: "/workspace".to_string(),
            readiness_timeout_secs: 60,
            readiness_interval_ms: 500,
            keep_alive: "tail -f /dev/null".to_string(),
        }
    }
}

/// Represents the entire matrix definition, loaded from a TOML file.
/// 代表从 TOML 文件加载的整个矩阵定义。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatrixDefinition {
    /// The language for the runner's output messages (e.g., "en", "zh-CN").
    /// 运行器输出消息的语言（例如 "en", "zh-CN"）。
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    /// Copy the software root into each local environment's workspace before installing.
    /// 安装前将软件根目录复制到每个本地环境的工作区。
    #[serde(default)]
    pub isolate_source: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts_dir: Option<PathBuf>,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub coverage: CoverageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub entries: Vec<EntryDefinition>,
}

impl Default for MatrixDefinition {
    fn default() -> Self {
        Self {
            language: default_language(),
            max_concurrency: None,
            isolate_source: false,
            artifacts_dir: None,
            commands: CommandsConfig::default(),
            coverage: CoverageConfig::default(),
            upload: UploadConfig::default(),
            local: LocalConfig::default(),
            container: ContainerConfig::default(),
            entries: Vec::new(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

/// Reads and parses a matrix definition file.
/// 读取并解析矩阵定义文件。
pub fn load_matrix_definition(path: &Path) -> Result<MatrixDefinition, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_matrix_definition(&content)
}

pub fn parse_matrix_definition(content: &str) -> Result<MatrixDefinition, ConfigError> {
    Ok(toml::from_str(content)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageSettings {
    pub rule_file: String,
    pub artifact: String,
    /// Arguments with placeholders already substituted.
    pub args: Vec<String>,
}

/// Fully resolved, immutable settings shared by every pipeline of a run.
/// No component reads the process environment after this is built.
///
/// 完全解析的不可变设置，由一次运行中的所有流水线共享。
/// 构建之后，任何组件都不再读取进程环境。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub software_root: PathBuf,
    pub artifacts_dir: PathBuf,
    pub isolate_source: bool,
    pub install_command: Vec<String>,
    pub test_command: Vec<String>,
    pub test_timeout: Option<Duration>,
    pub coverage: CoverageSettings,
    pub upload_command: Option<Vec<String>>,
    pub conda: Vec<String>,
    pub channels: Vec<String>,
    pub container_runtime: String,
    pub container_workdir: String,
    pub readiness_timeout: Duration,
    pub readiness_interval: Duration,
    pub keep_alive: Vec<String>,
}

impl Settings {
    /// Resolves command lines and defaults. `artifacts_dir` overrides the file's value.
    pub fn resolve(
        definition: &MatrixDefinition,
        software_root: &Path,
        artifacts_dir: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let coverage = &definition.coverage;
        let coverage_args = coverage
            .args
            .iter()
            .map(|arg| {
                arg.replace("{rule_file}", &coverage.rule_file)
                    .replace("{artifact}", &coverage.artifact)
            })
            .collect();

        let upload_command = definition
            .upload
            .command
            .as_deref()
            .map(|cmd| parse_command_line("upload.command", cmd))
            .transpose()?;

        let artifacts_dir = artifacts_dir
            .or_else(|| definition.artifacts_dir.clone())
            .unwrap_or_else(|| PathBuf::from("target").join("env-matrix"));

        Ok(Self {
            software_root: software_root.to_path_buf(),
            artifacts_dir,
            isolate_source: definition.isolate_source,
            install_command: parse_command_line("commands.install", &definition.commands.install)?,
            test_command: parse_command_line("commands.test", &definition.commands.test)?,
            test_timeout: definition.commands.test_timeout_secs.map(Duration::from_secs),
            coverage: CoverageSettings {
                rule_file: coverage.rule_file.clone(),
                artifact: coverage.artifact.clone(),
                args: coverage_args,
            },
            upload_command,
            conda: parse_command_line("local.conda", &definition.local.conda)?,
            channels: definition.local.channels.clone(),
            container_runtime: definition.container.runtime.clone(),
            container_workdir: definition.container.workdir.clone(),
            readiness_timeout: Duration::from_secs(definition.container.readiness_timeout_secs),
            readiness_interval: Duration::from_millis(definition.container.readiness_interval_ms.max(1)),
            keep_alive: parse_command_line("container.keep_alive", &definition.container.keep_alive)?,
        })
    }

    /// Default settings rooted at `software_root`.
    pub fn with_root(software_root: &Path) -> Result<Self, ConfigError> {
        Self::resolve(&MatrixDefinition::default(), software_root, None)
    }
}
