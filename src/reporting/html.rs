//! # HTML Reporting Module / HTML 报告模块
//!
//! Renders the report as a single self-contained HTML page: summary counts,
//! one row per entry, and collapsible logs for entries that did not pass.
//!
//! 将报告渲染为单个独立的 HTML 页面：汇总计数、每个条目一行，
//! 以及未通过条目的可折叠日志。

use anyhow::{Context, Result};
use maud::{html, Markup, PreEscaped, DOCTYPE};
use std::fs;
use std::path::Path;

use crate::core::aggregator::{Report, UploadStatus};
use crate::core::models::{OverallStatus, Outcome};
use crate::infra::t;

/// Embedded CSS styles for HTML reports / HTML 报告的嵌入式 CSS 样式
const HTML_STYLE: &str = include_str!("assets/report.css");

/// Writes the HTML report to `output_path`, creating parent directories.
///
/// 将 HTML 报告写入 `output_path`，并创建父目录。
///
/// # Errors / 错误
/// Returns an error if the file or its parent directory cannot be written.
pub fn generate_html_report(report: &Report, output_path: &Path, locale: &str) -> Result<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let markup = render_report(report, locale);
    fs::write(output_path, markup.into_string())
        .with_context(|| format!("Failed to write HTML report: {}", output_path.display()))?;
    Ok(())
}

/// Renders the report page. / 渲染报告页面。
pub fn render_report(report: &Report, locale: &str) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (t!("html_report.title", locale = locale)) }
                style { (PreEscaped(HTML_STYLE)) }
            }
            body {
                h1 { (t!("html_report.main_header", locale = locale)) }
                p class="generated" {
                    (t!("html_report.generated_at", locale = locale, time = report.generated_at.to_rfc3339()))
                }
                (summary(report, locale))
                (results_table(report, locale))
                @if !report.uploads.is_empty() {
                    (uploads_table(report, locale))
                }
            }
        }
    }
}

fn summary(report: &Report, locale: &str) -> Markup {
    let items = [
        ("", report.outcomes.len(), t!("html_report.summary.total", locale = locale)),
        ("passed-text", report.count(OverallStatus::Passed), t!("html_report.summary.passed", locale = locale)),
        ("failed-text", report.count(OverallStatus::Failed), t!("html_report.summary.failed", locale = locale)),
        ("errored-text", report.count(OverallStatus::Errored), t!("html_report.summary.errored", locale = locale)),
    ];
    html! {
        div class="summary-container" {
            @for (class, count, label) in &items {
                div class="summary-item" {
                    span class={ "count " (class) } { (count) }
                    span class="label" { (label) }
                }
            }
        }
    }
}

fn results_table(report: &Report, locale: &str) -> Markup {
    html! {
        table {
            thead {
                tr {
                    th { (t!("html_report.table.header.name", locale = locale)) }
                    th class="status-col" { (t!("html_report.table.header.status", locale = locale)) }
                    th class="duration-cell" { (t!("html_report.table.header.duration", locale = locale)) }
                    th { (t!("html_report.table.header.details", locale = locale)) }
                }
            }
            tbody {
                @for outcome in &report.outcomes {
                    (result_row(outcome, locale))
                }
            }
        }
    }
}

fn result_row(outcome: &Outcome, locale: &str) -> Markup {
    html! {
        tr {
            td { (outcome.entry_name) }
            td class={ "status-col " (outcome.status.css_class()) } { (outcome.status.label(locale)) }
            td class="duration-cell" { (format!("{:.2}s", outcome.duration().as_secs_f64())) }
            td {
                @if let Some(reason) = &outcome.reason {
                    div class="reason" { (reason.to_string()) }
                }
                @if !outcome.is_passed() {
                    @if let Some(install) = &outcome.install_result {
                        details {
                            summary { (t!("report.install_log", locale = locale)) }
                            pre { (install.log) }
                        }
                    }
                    @if let Some(test) = &outcome.test_result {
                        details {
                            summary { (t!("report.test_log", locale = locale)) }
                            pre { (test.log) }
                        }
                    }
                }
            }
        }
    }
}

fn uploads_table(report: &Report, locale: &str) -> Markup {
    html! {
        h2 { (t!("html_report.uploads_header", locale = locale)) }
        table {
            tbody {
                @for upload in &report.uploads {
                    tr {
                        td { (upload.entry_name) }
                        @match &upload.status {
                            UploadStatus::Uploaded => {
                                td class="status-Passed" { "uploaded" }
                            }
                            UploadStatus::Failed(detail) => {
                                td class="status-Failed" { "failed: " (detail) }
                            }
                            UploadStatus::Skipped(detail) => {
                                td class="status-Skipped" { "skipped: " (detail) }
                            }
                        }
                    }
                }
            }
        }
    }
}
