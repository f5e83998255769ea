//! # JSON Reporting Module / JSON 报告模块
//!
//! Serializes the full report, logs included, for consumption by other tools.
//!
//! 序列化完整报告（包括日志），供其他工具使用。

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::core::aggregator::Report;

/// Writes `report` as pretty-printed JSON to `output_path`.
///
/// 将 `report` 以格式化 JSON 写入 `output_path`。
pub fn write_json_report(report: &Report, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report: {}", output_path.display()))?;
    Ok(())
}
