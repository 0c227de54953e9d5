pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use cadence_core::config::{AppConfig, LoadOptions, LogFormat};
use clap::{Parser, Subcommand};
use tracing::Level;

#[derive(Debug, Parser)]
#[command(
    name = "cadence",
    about = "Cadence customer health operator CLI",
    long_about = "Apply migrations, load the demo dataset, inspect configuration, run health assessments, and inspect threshold rules.",
    after_help = "Examples:\n  cadence migrate\n  cadence assess --tenant-slug default\n  cadence thresholds resolve --tenant-id tenant-default --account-priority LOW"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a TOML config file (must exist when given)")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo tenant, replacing any previous copy")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Run the customer health assessment for one tenant")]
    Assess(commands::assess::AssessArgs),
    #[command(subcommand, about = "Inspect configured health thresholds")]
    Thresholds(commands::thresholds::ThresholdsCommand),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        ..LoadOptions::default()
    };

    if let Ok(config) = AppConfig::load(options.clone()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(&options) }
        }
        Command::Assess(args) => commands::assess::run(&options, &args),
        Command::Thresholds(command) => commands::thresholds::run(&options, &command),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout carries only the command's JSON result.
fn init_logging(config: &AppConfig) {
    let level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder =
        tracing_subscriber::fmt().with_target(false).with_max_level(level).with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
