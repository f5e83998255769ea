//! # env-matrix Library / env-matrix 库
//!
//! This library provides the core functionality for the env-matrix tool, a
//! configuration-driven orchestrator that provisions conda and container
//! environments, installs the software under test into each of them, runs
//! its suite, and aggregates the results into one report.
//!
//! 此库为 env-matrix 工具提供核心功能。这是一个配置驱动的编排器：
//! 它准备 conda 和容器环境，在每个环境中安装被测软件、运行其测试套件，
//! 并将结果汇总为一份报告。
//!
//! ## Modules / 模块
//!
//! - `core` - Matrix expansion, provisioning, installation, test execution and aggregation
//! - `infra` - Infrastructure services like command execution and file system operations
//! - `reporting` - Console, HTML and JSON reports
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 矩阵展开、环境准备、安装、测试执行与结果汇总
//! - `infra` - 基础设施服务，如命令执行和文件系统操作
//! - `reporting` - 控制台、HTML 和 JSON 报告
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use core::config;
pub use core::execution;
pub use core::models;

/// Selects the UI language.
///
/// An explicit `preferred` locale wins. Otherwise the system locale is
/// detected; the full locale (e.g. "zh-CN") is tried first, then the bare
/// language code (e.g. "en"), then the default "en".
pub fn init_locale(preferred: Option<&str>) -> String {
    let locale = preferred
        .map(str::to_string)
        .or_else(sys_locale::get_locale)
        .unwrap_or_else(|| "en".to_string());
    let available_locales = rust_i18n::available_locales!();

    let lang = if available_locales.contains(&locale.as_str()) {
        locale.as_str()
    } else {
        locale
            .split('-')
            .next()
            .filter(|lang_code| available_locales.contains(lang_code))
            .unwrap_or("en")
    };

    rust_i18n::set_locale(lang);
    lang.to_string()
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
