//! # Matrix Planning Module / 矩阵计划模块
//!
//! Expands a `MatrixDefinition` into validated, immutable `MatrixEntry`
//! values and resolves everything a run needs before any entry starts.
//! Pure: nothing here touches the host.
//!
//! 将 `MatrixDefinition` 展开为经过验证的不可变 `MatrixEntry`，
//! 并在任何条目开始之前解析运行所需的一切。纯函数：不触碰主机。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::config::{EntryDefinition, MatrixDefinition, Settings};
use crate::core::error::ConfigError;
use crate::core::models::{InstallStrategy, MatrixEntry};

#[derive(Debug)]
pub struct ExecutionPlan {
    pub entries: Vec<MatrixEntry>,
    pub settings: Settings,
    pub jobs: usize,
    /// Entries left out by `--only`.
    pub skipped_count: usize,
}

/// Command-line overrides applied on top of the matrix file.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub jobs: Option<usize>,
    pub only: Vec<String>,
    pub artifacts_dir: Option<PathBuf>,
}

/// Returns one entry per definition, in source order.
/// 按源顺序为每个定义返回一个条目。
///
/// # Errors
/// `ConfigError` on an empty or duplicate name, an unknown strategy, a local
/// entry without runtime version, or a missing strategy parameter.
pub fn expand(definition: &MatrixDefinition) -> Result<Vec<MatrixEntry>, ConfigError> {
    let mut seen = HashSet::new();
    definition
        .entries
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let entry = expand_entry(index, raw)?;
            if !seen.insert(entry.name.clone()) {
                return Err(ConfigError::DuplicateName(entry.name));
            }
            Ok(entry)
        })
        .collect()
}

fn expand_entry(index: usize, raw: &EntryDefinition) -> Result<MatrixEntry, ConfigError> {
    let name = raw.name.trim();
    if name.is_empty() {
        return Err(ConfigError::EmptyName { index });
    }

    let install_strategy: InstallStrategy =
        raw.install_strategy
            .parse()
            .map_err(|value| ConfigError::UnknownStrategy {
                entry: name.to_string(),
                value,
            })?;

    let runtime_version = raw.runtime_version.trim().to_string();
    if install_strategy == InstallStrategy::Local && runtime_version.is_empty() {
        return Err(ConfigError::EmptyRuntimeVersion {
            entry: name.to_string(),
        });
    }

    // Dependencies are a set: keep the first occurrence of each tag.
    let mut tags = HashSet::new();
    let optional_dependencies = raw
        .optional_dependencies
        .iter()
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty() && tags.insert(d.clone()))
        .collect();

    let entry = MatrixEntry {
        name: name.to_string(),
        runtime_version,
        optional_dependencies,
        install_strategy,
        reporting_eligible: raw.reporting_eligible,
        strategy_params: raw.strategy_params.clone(),
        env: raw.env.clone(),
        test_timeout: raw.test_timeout_secs.map(Duration::from_secs),
    };
    entry.validate_params()?;
    Ok(entry)
}

/// Restricts a run to the named entries, keeping matrix order.
/// An empty `only` selects everything.
pub fn select(entries: Vec<MatrixEntry>, only: &[String]) -> Result<Vec<MatrixEntry>, ConfigError> {
    if only.is_empty() {
        return Ok(entries);
    }
    if let Some(unknown) = only.iter().find(|name| !entries.iter().any(|e| &e.name == *name)) {
        return Err(ConfigError::UnknownEntry(unknown.clone()));
    }
    Ok(entries
        .into_iter()
        .filter(|e| only.contains(&e.name))
        .collect())
}

/// Expands, filters and resolves settings. Any error here aborts the run
/// before a single environment is created.
///
/// 展开、过滤并解析设置。此处的任何错误都会在创建任何环境之前中止运行。
pub fn plan_execution(
    definition: &MatrixDefinition,
    software_root: &Path,
    options: &PlanOptions,
) -> Result<ExecutionPlan, ConfigError> {
    let all = expand(definition)?;
    let total = all.len();
    let entries = select(all, &options.only)?;
    let settings = Settings::resolve(definition, software_root, options.artifacts_dir.clone())?;

    let jobs = options
        .jobs
        .or(definition.max_concurrency)
        .unwrap_or_else(|| num_cpus::get() / 2 + 1)
        .max(1);

    Ok(ExecutionPlan {
        skipped_count: total - entries.len(),
        entries,
        settings,
        jobs,
    })
}
