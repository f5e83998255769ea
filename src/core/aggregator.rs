//! # Result Aggregation Module / 结果汇总模块
//!
//! Collects one `Outcome` per matrix entry from concurrently running
//! pipelines and turns them into the final `Report`. Finalizing also hands
//! coverage artifacts of passing, reporting-eligible entries to an uploader.
//! Uploading is best effort and never changes an entry's status.
//!
//! 从并发运行的流水线中为每个矩阵条目收集一个 `Outcome`，并生成最终的 `Report`。
//! 汇总时还会把通过且需要上报的条目的覆盖率产物交给上传器。
//! 上传是尽力而为的，永远不会改变条目的状态。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::core::models::{ErrorReason, MatrixEntry, OverallStatus, Outcome};
use crate::infra::command::{CommandSpec, SharedExecutor};

/// Hands a coverage artifact to an external collector.
/// 将覆盖率产物交给外部收集器。
#[async_trait]
pub trait CoverageUploader: Send + Sync {
    async fn upload(&self, entry_name: &str, artifact: &Path) -> anyhow::Result<()>;
}

/// Runs the configured `upload.command` on the host, substituting `{artifact}` and `{entry}`.
pub struct CommandUploader {
    argv: Vec<String>,
    executor: SharedExecutor,
}

impl CommandUploader {
    pub fn new(argv: Vec<String>, executor: SharedExecutor) -> Self {
        Self { argv, executor }
    }
}

#[async_trait]
impl CoverageUploader for CommandUploader {
    async fn upload(&self, entry_name: &str, artifact: &Path) -> anyhow::Result<()> {
        let artifact = artifact.display().to_string();
        let argv: Vec<String> = self
            .argv
            .iter()
            .map(|part| part.replace("{artifact}", &artifact).replace("{entry}", entry_name))
            .collect();
        let output = self.executor.execute(&CommandSpec::from_argv(&argv)).await?;
        if !output.success() {
            anyhow::bail!(
                "upload command exited with code {}:\n{}",
                output.exit_code,
                output.output.trim()
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded,
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRecord {
    pub entry_name: String,
    pub artifact: Option<PathBuf>,
    pub status: UploadStatus,
}

/// The final, ordered result of a matrix run.
/// 矩阵运行的最终有序结果。
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    /// In matrix order. / 按矩阵顺序排列。
    pub outcomes: Vec<Outcome>,
    pub uploads: Vec<UploadRecord>,
}

impl Report {
    pub fn count(&self, status: OverallStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(Outcome::is_passed)
    }

    /// 0 if every entry passed, 1 otherwise. There is no partial exit code.
    /// 所有条目通过时为 0，否则为 1。不存在部分成功的退出码。
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() { 0 } else { 1 }
    }

    pub fn outcome(&self, entry_name: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.entry_name == entry_name)
    }

    pub fn non_passed(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.is_passed())
    }
}

/// Append-only outcome store shared by all pipelines of a run.
/// 一次运行中所有流水线共享的只追加结果存储。
#[derive(Debug)]
pub struct Aggregator {
    order: Vec<String>,
    reporting_eligible: HashSet<String>,
    outcomes: Mutex<Vec<Outcome>>,
}

impl Aggregator {
    pub fn new(entries: &[MatrixEntry]) -> Self {
        Self {
            order: entries.iter().map(|e| e.name.clone()).collect(),
            reporting_eligible: entries
                .iter()
                .filter(|e| e.reporting_eligible)
                .map(|e| e.name.clone())
                .collect(),
            outcomes: Mutex::new(Vec::with_capacity(entries.len())),
        }
    }

    /// Appends an outcome. The first outcome recorded for an entry wins; a
    /// second one is dropped and `false` is returned.
    pub fn record(&self, outcome: Outcome) -> bool {
        let mut outcomes = self.outcomes.lock().unwrap_or_else(PoisonError::into_inner);
        if outcomes.iter().any(|o| o.entry_name == outcome.entry_name) {
            tracing::warn!(entry = %outcome.entry_name, "outcome already recorded, ignoring duplicate");
            return false;
        }
        outcomes.push(outcome);
        true
    }

    pub fn recorded(&self) -> usize {
        self.outcomes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Orders the outcomes, fills in entries that never reported, and runs
    /// the coverage uploads. With no uploader, eligible uploads are skipped.
    ///
    /// Drains the store, so it is meant to be called once at the end of a run.
    ///
    /// 对结果排序，为从未上报的条目补充记录，并执行覆盖率上传。
    pub async fn finalize(&self, uploader: Option<&dyn CoverageUploader>) -> Report {
        let mut outcomes = std::mem::take(
            &mut *self.outcomes.lock().unwrap_or_else(PoisonError::into_inner),
        );

        let recorded: HashSet<String> = outcomes.iter().map(|o| o.entry_name.clone()).collect();
        for name in &self.order {
            if !recorded.contains(name) {
                outcomes.push(Outcome::new(
                    name,
                    false,
                    None,
                    None,
                    Some(ErrorReason::Execution("no outcome was recorded".to_string())),
                    Default::default(),
                ));
            }
        }

        let position: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        outcomes.sort_by_key(|o| position.get(o.entry_name.as_str()).copied().unwrap_or(usize::MAX));

        let mut uploads = Vec::new();
        for outcome in &outcomes {
            if !self.reporting_eligible.contains(&outcome.entry_name) || !outcome.is_passed() {
                continue;
            }
            let artifact = outcome
                .test_result
                .as_ref()
                .and_then(|t| t.coverage_artifact.clone());
            let status = match (&artifact, uploader) {
                (None, _) => UploadStatus::Skipped("no coverage artifact".to_string()),
                (Some(_), None) => UploadStatus::Skipped("no uploader configured".to_string()),
                (Some(path), Some(uploader)) => match uploader.upload(&outcome.entry_name, path).await {
                    Ok(()) => {
                        tracing::info!(entry = %outcome.entry_name, artifact = %path.display(), "coverage uploaded");
                        UploadStatus::Uploaded
                    }
                    Err(e) => {
                        tracing::warn!(entry = %outcome.entry_name, "coverage upload failed: {e:#}");
                        UploadStatus::Failed(format!("{e:#}"))
                    }
                },
            };
            uploads.push(UploadRecord {
                entry_name: outcome.entry_name.clone(),
                artifact,
                status,
            });
        }

        Report {
            generated_at: Utc::now(),
            outcomes,
            uploads,
        }
    }
}
