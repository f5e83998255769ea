//! # Console Reporting Module / 控制台报告模块
//!
//! This module prints the run summary and the logs of every entry that did
//! not pass, with colors and internationalization support.
//!
//! 此模块打印运行摘要以及所有未通过条目的日志，支持彩色输出和国际化。

use colored::*;

use crate::core::aggregator::{Report, UploadStatus};
use crate::core::models::{OverallStatus, Outcome};
use crate::infra::command::log_excerpt;
use crate::infra::t;

/// Lines of each log shown on the console. The full logs go to the HTML/JSON reports.
const CONSOLE_LOG_LINES: usize = 80;

/// Prints a formatted summary of the matrix run to the console.
///
/// 在控制台打印格式化的矩阵运行摘要。
///
/// # Output Format / 输出格式
/// ```text
/// --- Matrix Summary ---
///   - Passed     | py39-local                               |      42.10s
///   - Errored    | py310-extras                             |       3.02s  installation failed
/// ```
pub fn print_summary(report: &Report, locale: &str) {
    println!("\n{}", t!("report.summary_banner", locale = locale).bold());

    for outcome in &report.outcomes {
        let label = outcome.status.label(locale);
        let status_colored = match outcome.status {
            OverallStatus::Passed => label.green(),
            OverallStatus::Failed => label.red(),
            OverallStatus::Errored => label.red().bold(),
        };
        let reason = outcome
            .reason
            .as_ref()
            .map(|r| format!("  {r}"))
            .unwrap_or_default();

        println!(
            "  - {:<10} | {:<40} | {:>10} {}",
            status_colored,
            outcome.entry_name,
            format!("{:.2}s", outcome.duration().as_secs_f64()),
            reason.dimmed()
        );
    }

    println!(
        "\n{}",
        t!(
            "report.counts",
            locale = locale,
            passed = report.count(OverallStatus::Passed),
            failed = report.count(OverallStatus::Failed),
            errored = report.count(OverallStatus::Errored)
        )
    );

    for upload in &report.uploads {
        let line = match &upload.status {
            UploadStatus::Uploaded => {
                t!("report.upload_done", locale = locale, name = &upload.entry_name).green()
            }
            UploadStatus::Failed(detail) => t!(
                "report.upload_failed",
                locale = locale,
                name = &upload.entry_name,
                detail = detail
            )
            .yellow(),
            UploadStatus::Skipped(detail) => t!(
                "report.upload_skipped",
                locale = locale,
                name = &upload.entry_name,
                detail = detail
            )
            .dimmed(),
        };
        println!("  {line}");
    }
}

/// Prints the captured logs of every entry that did not pass.
///
/// 打印所有未通过条目的捕获日志。
pub fn print_failure_details(failures: &[&Outcome], locale: &str) {
    if failures.is_empty() {
        return;
    }

    println!("\n{}", t!("report.failure_banner", locale = locale).red().bold());
    println!("{}", "-".repeat(80));

    for (i, outcome) in failures.iter().enumerate() {
        println!(
            "[{}/{}] {} '{}' ({})",
            i + 1,
            failures.len(),
            t!("report.failure_header", locale = locale).red(),
            outcome.entry_name.cyan(),
            outcome.status.label(locale)
        );

        if let Some(reason) = &outcome.reason {
            println!("{}", reason.to_string().yellow());
        }
        if let Some(install) = &outcome.install_result {
            println!("\n--- {} ---\n", t!("report.install_log", locale = locale).yellow());
            println!("{}", log_excerpt(&install.log, CONSOLE_LOG_LINES));
        }
        if let Some(test) = &outcome.test_result {
            println!("\n--- {} ---\n", t!("report.test_log", locale = locale).yellow());
            println!("{}", log_excerpt(&test.log, CONSOLE_LOG_LINES));
        }
        println!("\n{}", "-".repeat(80));
    }
}
