//! # Orchestration Module / 编排模块
//!
//! Runs every entry's pipeline as an independent tokio task, at most `jobs`
//! at a time, and records each outcome in a shared `Aggregator`.
//!
//! 将每个条目的流水线作为独立的 tokio 任务运行，最多同时运行 `jobs` 个，
//! 并将每个结果记录到共享的 `Aggregator` 中。

use futures::{stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::aggregator::Aggregator;
use crate::core::execution::Pipeline;
use crate::core::models::{ErrorReason, MatrixEntry, Outcome};

/// Runs all entries and returns the aggregator holding one outcome per entry.
///
/// Entries do not depend on each other and finish in any order. Cancelling
/// `cancel` stops in-flight pipelines (each tears down its own environment)
/// and marks entries that have not started as cancelled.
///
/// 运行所有条目并返回持有每个条目结果的汇总器。
/// 条目之间互不依赖，完成顺序任意。取消 `cancel` 会停止正在运行的流水线
/// （各自销毁自己的环境），并将尚未开始的条目标记为已取消。
pub async fn run_matrix(
    entries: Vec<MatrixEntry>,
    pipeline: Pipeline,
    jobs: usize,
    cancel: CancellationToken,
) -> Arc<Aggregator> {
    let aggregator = Arc::new(Aggregator::new(&entries));

    stream::iter(entries.into_iter().map(|entry| {
        let pipeline = pipeline.clone();
        let cancel = cancel.clone();
        let aggregator = Arc::clone(&aggregator);
        let name = entry.name.clone();

        async move {
            let task = {
                let aggregator = Arc::clone(&aggregator);
                tokio::spawn(async move {
                    let outcome = pipeline.run_entry(&entry, &cancel).await;
                    aggregator.record(outcome);
                })
            };

            if let Err(e) = task.await {
                tracing::error!(entry = %name, "pipeline task failed: {e}");
                aggregator.record(Outcome::new(
                    &name,
                    false,
                    None,
                    None,
                    Some(ErrorReason::Execution(format!("pipeline task failed: {e}"))),
                    Duration::ZERO,
                ));
            }
        }
    }))
    .buffer_unordered(jobs.max(1))
    .collect::<Vec<()>>()
    .await;

    aggregator
}
