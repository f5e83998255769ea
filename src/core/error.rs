//! # Error Taxonomy Module / 错误分类模块
//!
//! Typed errors for the orchestration core. Only `ConfigError` is fatal for a
//! whole run; the other two are contained inside a single entry's `Outcome`.
//!
//! 编排核心的类型化错误。只有 `ConfigError` 会终止整个运行；
//! 其余两类错误只影响单个矩阵条目的 `Outcome`。

use std::path::PathBuf;
use thiserror::Error;

/// A malformed or ambiguous matrix definition. Raised before any entry runs.
/// 格式错误或有歧义的矩阵定义。在任何条目运行之前抛出。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read matrix definition '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse matrix definition: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("matrix entry at position {index} has an empty name")]
    EmptyName { index: usize },

    #[error("duplicate matrix entry name '{0}'")]
    DuplicateName(String),

    #[error("entry '{entry}': unknown install strategy '{value}' (expected 'local' or 'containerized')")]
    UnknownStrategy { entry: String, value: String },

    #[error("entry '{entry}': strategy '{strategy}' requires parameter '{key}'")]
    MissingParam {
        entry: String,
        strategy: String,
        key: String,
    },

    #[error("entry '{entry}': runtime_version must not be empty")]
    EmptyRuntimeVersion { entry: String },

    #[error("invalid command in '{field}': {reason}")]
    InvalidCommand { field: String, reason: String },

    #[error("no matrix entry named '{0}'")]
    UnknownEntry(String),
}

/// An environment could not be created for one entry.
/// 无法为某个条目创建环境。
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("runtime version '{version}' could not be provisioned:\n{log}")]
    RuntimeUnavailable { version: String, log: String },

    #[error("optional dependencies could not be installed:\n{log}")]
    DependencyInstall { log: String },

    #[error("failed to pull image '{image}':\n{log}")]
    ImagePull { image: String, log: String },

    #[error("failed to start container '{name}':\n{log}")]
    ContainerStart { name: String, log: String },

    #[error("container '{name}' was not ready after {secs}s")]
    ReadinessTimeout { name: String, secs: u64 },

    #[error("failed to prepare workspace: {0}")]
    Workspace(String),

    #[error(transparent)]
    Dispatch(#[from] ExecutionError),

    #[error("cancelled")]
    Cancelled,
}

/// A command could not be dispatched at all inside a live environment.
/// Nonzero exit codes are never represented by this type.
/// 命令根本无法在环境中派发。非零退出码不会使用此类型表示。
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to collect output of '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("environment '{0}' is no longer running")]
    EnvironmentGone(String),
}
