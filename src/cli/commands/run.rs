//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command: it loads the matrix definition,
//! runs every selected entry through its pipeline, and presents the
//! aggregated report. The process fails when any entry did not pass.
//!
//! 此模块实现 `run` 命令：加载矩阵定义，让每个选定条目经过其流水线，
//! 并展示汇总报告。任何条目未通过时进程以失败退出。

use anyhow::{Context, Result};
use colored::*;
use std::{path::PathBuf, sync::Arc};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        aggregator::{CommandUploader, CoverageUploader},
        config::load_matrix_definition,
        execution::Pipeline,
        orchestrator::run_matrix,
        planner::{self, PlanOptions},
    },
    infra::{
        command::{ProcessExecutor, SharedExecutor},
        fs::absolute_path,
        t,
    },
    reporting::{generate_html_report, print_failure_details, print_summary, write_json_report},
};

/// Arguments of the `run` subcommand. / `run` 子命令的参数。
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub config: PathBuf,
    pub project_dir: PathBuf,
    pub jobs: Option<usize>,
    pub only: Vec<String>,
    pub artifacts_dir: Option<PathBuf>,
    pub html: Option<PathBuf>,
    pub json: Option<PathBuf>,
    /// Language given on the command line; overrides the file's `language`.
    pub lang: Option<String>,
}

/// Executes the run command.
///
/// # Errors
/// Fails on an invalid definition (before any environment is created) and
/// when at least one entry did not pass.
pub async fn execute(args: RunArgs) -> Result<()> {
    let definition = load_matrix_definition(&args.config).with_context(|| {
        t!("config_load_failed", path = args.config.display()).to_string()
    })?;
    let locale = crate::init_locale(Some(args.lang.as_deref().unwrap_or(&definition.language)));

    let project_root = absolute_path(&args.project_dir).with_context(|| {
        t!("project_dir_not_found", locale = &locale, path = args.project_dir.display()).to_string()
    })?;
    println!(
        "{}",
        t!("project_root_detected", locale = &locale, path = project_root.display())
    );
    println!(
        "{}",
        t!("loading_matrix", locale = &locale, path = args.config.display())
    );

    let options = PlanOptions {
        jobs: args.jobs,
        only: args.only.clone(),
        artifacts_dir: args.artifacts_dir.clone(),
    };
    let mut plan = planner::plan_execution(&definition, &project_root, &options)?;
    if plan.settings.artifacts_dir.is_relative() {
        plan.settings.artifacts_dir = project_root.join(&plan.settings.artifacts_dir);
    }

    if plan.skipped_count > 0 {
        println!(
            "{}",
            t!("entries_filtered", locale = &locale, count = plan.skipped_count).cyan()
        );
    }
    if plan.entries.is_empty() {
        println!("{}", t!("no_entries_to_run", locale = &locale).green());
        return Ok(());
    }
    println!(
        "{}",
        t!(
            "running_entries",
            locale = &locale,
            count = plan.entries.len(),
            jobs = plan.jobs
        )
        .bold()
    );

    let cancel = setup_signal_handler(&locale);
    let settings = Arc::new(plan.settings);
    let executor: SharedExecutor = Arc::new(ProcessExecutor);
    let pipeline = Pipeline::from_settings(Arc::clone(&settings), executor.clone());

    let aggregator = run_matrix(plan.entries, pipeline, plan.jobs, cancel).await;

    let uploader = settings
        .upload_command
        .clone()
        .map(|argv| CommandUploader::new(argv, executor));
    let report = aggregator
        .finalize(uploader.as_ref().map(|u| u as &dyn CoverageUploader))
        .await;

    print_summary(&report, &locale);
    let failures: Vec<_> = report.non_passed().collect();
    print_failure_details(&failures, &locale);

    if let Some(path) = &args.html {
        println!(
            "\n{}",
            t!("generating_html_report", locale = &locale, path = path.display())
        );
        if let Err(e) = generate_html_report(&report, path, &locale) {
            eprintln!("{} {:#}", t!("html_report_failed", locale = &locale).red(), e);
        }
    }
    if let Some(path) = &args.json {
        println!(
            "{}",
            t!("generating_json_report", locale = &locale, path = path.display())
        );
        if let Err(e) = write_json_report(&report, path) {
            eprintln!("{} {:#}", t!("json_report_failed", locale = &locale).red(), e);
        }
    }

    if report.all_passed() {
        println!("\n{}", t!("all_entries_passed", locale = &locale).green().bold());
        Ok(())
    } else {
        anyhow::bail!(t!("matrix_failed", locale = &locale, count = failures.len()).to_string())
    }
}

/// Cancels the returned token on Ctrl-C. In-flight entries tear down their
/// environments; entries not yet started are recorded as cancelled.
fn setup_signal_handler(locale: &str) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();
    let locale = locale.to_string();

    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl-C: {e}");
            return;
        }
        println!("\n{}", t!("shutdown_signal", locale = &locale).yellow());
        token_clone.cancel();
    });

    token
}
