//! # Command-Line Interface / 命令行接口
//!
//! Builds the localized clap command tree and dispatches to the `run` and
//! `init` commands.
//!
//! 构建本地化的 clap 命令树，并分派到 `run` 和 `init` 命令。

pub mod commands;

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::{env, path::PathBuf};

use crate::infra::t;

/// Default configuration file name. / 默认配置文件名。
pub const CONFIG_FILE_NAME: &str = "EnvMatrix.toml";

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
/// It looks for `--lang <VALUE>` or `--lang=<VALUE>`.
fn pre_parse_language() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    if let Some(value) = args.iter().find_map(|arg| arg.strip_prefix("--lang=")) {
        return Some(value.to_string());
    }
    args.iter()
        .position(|arg| arg == "--lang")
        .and_then(|pos| args.get(pos + 1))
        .cloned()
}

fn build_cli(locale: &str) -> Command {
    Command::new("env-matrix")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli_about", locale = locale).to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli_lang", locale = locale).to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help(t!("cli_log_level", locale = locale).to_string())
                .value_name("LEVEL")
                .global(true)
                .action(ArgAction::Set),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cmd_run_about", locale = locale).to_string())
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .help(t!("arg_config", locale = locale).to_string())
                        .value_name("CONFIG")
                        .default_value(CONFIG_FILE_NAME)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("project-dir")
                        .long("project-dir")
                        .help(t!("arg_project_dir", locale = locale).to_string())
                        .value_name("PROJECT_DIR")
                        .default_value(".")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .help(t!("arg_jobs", locale = locale).to_string())
                        .value_name("JOBS")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("only")
                        .long("only")
                        .help(t!("arg_only", locale = locale).to_string())
                        .value_name("ENTRY")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("artifacts-dir")
                        .long("artifacts-dir")
                        .help(t!("arg_artifacts_dir", locale = locale).to_string())
                        .value_name("DIR")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("html")
                        .long("html")
                        .help(t!("arg_html", locale = locale).to_string())
                        .value_name("HTML")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help(t!("arg_json", locale = locale).to_string())
                        .value_name("JSON")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("init")
                .about(t!("cmd_init_about", locale = locale).to_string())
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help(t!("arg_non_interactive", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
}

/// Diagnostics go to stderr so they never interleave with the report on stdout.
/// `RUST_LOG` takes precedence over `--log-level`.
fn init_tracing(level: Option<&str>) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.unwrap_or("warn")));

    // A subscriber may already be installed when running inside tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run() -> Result<()> {
    // Pre-parse language and initialize i18n first.
    let cli_language = pre_parse_language();
    let language = crate::init_locale(cli_language.as_deref());

    let matches = build_cli(&language).get_matches();
    init_tracing(matches.get_one::<String>("log-level").map(String::as_str));

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let args = commands::run::RunArgs {
                config: run_matches
                    .get_one::<PathBuf>("config")
                    .cloned()
                    .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME)),
                project_dir: run_matches
                    .get_one::<PathBuf>("project-dir")
                    .cloned()
                    .unwrap_or_else(|| PathBuf::from(".")),
                jobs: run_matches.get_one::<usize>("jobs").copied(),
                only: run_matches
                    .get_many::<String>("only")
                    .map(|values| values.cloned().collect())
                    .unwrap_or_default(),
                artifacts_dir: run_matches.get_one::<PathBuf>("artifacts-dir").cloned(),
                html: run_matches.get_one::<PathBuf>("html").cloned(),
                json: run_matches.get_one::<PathBuf>("json").cloned(),
                lang: cli_language,
            };
            commands::run::execute(args).await?;
        }
        Some(("init", init_matches)) => {
            let non_interactive = init_matches.get_flag("non-interactive");
            commands::init::run_init_wizard(&language, non_interactive)?;
        }
        // `subcommand_required` makes clap exit before reaching here.
        _ => {}
    }
    Ok(())
}
