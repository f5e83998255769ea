//! # Matrix Initialization Module / 矩阵初始化模块
//!
//! This module provides an interactive wizard that writes a starter
//! `EnvMatrix.toml`. Users pick the runtime versions and which entry
//! templates (local, local with optional dependencies, containerized) to
//! include. `--non-interactive` writes the default matrix without prompting.
//!
//! 此模块提供一个交互式向导，用于生成初始的 `EnvMatrix.toml`。
//! 用户选择运行时版本以及要包含的条目模板（本地、带可选依赖的本地、容器化）。
//! `--non-interactive` 不提示直接写入默认矩阵。

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, MultiSelect, theme::ColorfulTheme};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::cli::CONFIG_FILE_NAME;
use crate::core::config::{EntryDefinition, MatrixDefinition};
use crate::core::models::InstallStrategy;
use crate::infra::t;

const DEFAULT_VERSIONS: &[&str] = &["3.10", "3.11", "3.12"];
const DEFAULT_IMAGE: &str = "python:3.12-slim";

#[derive(Deserialize)]
struct Project {
    name: String,
}

/// The `[project]` table of a `pyproject.toml`. / `pyproject.toml` 的 `[project]` 表。
#[derive(Deserialize)]
struct PyProject {
    project: Project,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Template {
    Local,
    LocalExtras,
    Containerized,
}

/// Runs the interactive wizard to generate `EnvMatrix.toml` in the current directory.
///
/// 运行交互式向导，在当前目录生成 `EnvMatrix.toml`。
pub fn run_init_wizard(language: &str, non_interactive: bool) -> Result<()> {
    let config_path = Path::new(CONFIG_FILE_NAME);
    let theme = ColorfulTheme::default();

    if non_interactive {
        let matrix = default_matrix(language, DEFAULT_VERSIONS);
        return write_config(config_path, &matrix, language);
    }

    println!("\n{}", t!("init_wizard_welcome", locale = language).cyan().bold());
    println!("{}", t!("init_wizard_description", locale = language));

    if config_path.exists() {
        let confirmation = Confirm::with_theme(&theme)
            .with_prompt(t!(
                "init_overwrite_prompt",
                locale = language,
                path = config_path.display()
            ))
            .default(false)
            .interact()
            .context(t!("init_user_confirmation_failed", locale = language).to_string())?;
        if !confirmation {
            println!("{}", t!("init_aborted", locale = language));
            return Ok(());
        }
    }

    if let Some(name) = detect_project_name() {
        println!(
            "{}",
            t!("init_detected_project_name", locale = language, name = name.green())
        );
    }

    let versions_input: String = Input::with_theme(&theme)
        .with_prompt(t!("init_versions_prompt", locale = language))
        .default(DEFAULT_VERSIONS.join(", "))
        .interact_text()?;
    let versions = parse_list(&versions_input);

    let options = [
        (Template::Local, t!("init_template_local", locale = language)),
        (Template::LocalExtras, t!("init_template_local_extras", locale = language)),
        (Template::Containerized, t!("init_template_containerized", locale = language)),
    ];
    let selections = MultiSelect::with_theme(&theme)
        .with_prompt(t!("init_template_selection_prompt", locale = language))
        .items(&options.iter().map(|o| o.1.clone()).collect::<Vec<_>>())
        .defaults(&[true, false, false])
        .interact()
        .context(t!("init_user_confirmation_failed", locale = language).to_string())?;

    if selections.is_empty() || versions.is_empty() {
        println!("{}", t!("init_no_templates_selected", locale = language).yellow());
        let matrix = default_matrix(language, DEFAULT_VERSIONS);
        return write_config(config_path, &matrix, language);
    }

    let mut entries = Vec::new();
    for i in selections {
        match options[i].0 {
            Template::Local => {
                entries.extend(versions.iter().map(|v| local_entry(v, Vec::new())));
            }
            Template::LocalExtras => {
                let extras: String = Input::with_theme(&theme)
                    .with_prompt(t!("init_extras_prompt", locale = language))
                    .interact_text()?;
                let newest = versions.last().map(String::as_str).unwrap_or("3.12");
                entries.push(local_entry(newest, parse_list(&extras)));
            }
            Template::Containerized => {
                let image: String = Input::with_theme(&theme)
                    .with_prompt(t!("init_image_prompt", locale = language))
                    .default(DEFAULT_IMAGE.to_string())
                    .interact_text()?;
                entries.push(container_entry(&image));
            }
        }
    }

    let matrix = build_matrix(language, entries);
    write_config(config_path, &matrix, language)
}

/// The matrix written by `--non-interactive`: one local entry per version.
/// 由 `--non-interactive` 写入的矩阵：每个版本一个本地条目。
pub fn default_matrix(language: &str, versions: &[&str]) -> MatrixDefinition {
    let entries = versions.iter().map(|v| local_entry(v, Vec::new())).collect();
    build_matrix(language, entries)
}

fn build_matrix(language: &str, mut entries: Vec<EntryDefinition>) -> MatrixDefinition {
    // Only the first entry uploads coverage; one report per run is enough.
    if let Some(first) = entries.first_mut() {
        first.reporting_eligible = true;
    }
    MatrixDefinition {
        language: language.to_string(),
        entries,
        ..MatrixDefinition::default()
    }
}

fn local_entry(version: &str, extras: Vec<String>) -> EntryDefinition {
    let compact = version.replace('.', "");
    let name = if extras.is_empty() {
        format!("py{compact}")
    } else {
        format!("py{compact}-extras")
    };
    EntryDefinition {
        name,
        runtime_version: version.to_string(),
        optional_dependencies: extras,
        install_strategy: InstallStrategy::Local.as_str().to_string(),
        ..EntryDefinition::default()
    }
}

fn container_entry(image: &str) -> EntryDefinition {
    let tag = image.rsplit(':').next().unwrap_or_default();
    EntryDefinition {
        name: "container".to_string(),
        runtime_version: tag.split('-').next().unwrap_or_default().to_string(),
        install_strategy: InstallStrategy::Containerized.as_str().to_string(),
        strategy_params: BTreeMap::from([("image".to_string(), image.to_string())]),
        ..EntryDefinition::default()
    }
}

fn parse_list(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn detect_project_name() -> Option<String> {
    let content = fs::read_to_string("pyproject.toml").ok()?;
    let manifest: PyProject = toml::from_str(&content).ok()?;
    Some(manifest.project.name)
}

fn write_config(path: &Path, matrix: &MatrixDefinition, language: &str) -> Result<()> {
    let toml_string = toml::to_string_pretty(matrix)
        .context(t!("init_serialize_failed", locale = language).to_string())?;

    fs::write(path, toml_string).with_context(|| {
        t!("init_write_failed", locale = language, path = path.display()).to_string()
    })?;

    println!(
        "\n{} {}",
        "✔".green(),
        t!("init_success_created", locale = language, path = path.display()).bold()
    );
    println!("{}", t!("init_usage_hint", locale = language));

    Ok(())
}
