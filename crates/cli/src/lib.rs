pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dealwatch_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "dealwatch",
    about = "Budget, search and notify for a purchase goal",
    long_about = "Suggest a budget for a purchase, watch for a listing at or under it, and notify \
                  when one turns up.",
    after_help = "Examples:\n  dealwatch run --goal \"buy an iPhone 15 in 3 months\"\n  \
                  dealwatch budget -p laptop -t \"in 2 months\" -f finances.csv\n  \
                  dealwatch search -p laptop -c 950 --once\n  dealwatch doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a dealwatch.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run budget, search and notification for one purchase goal")]
    Run(commands::run::RunArgs),
    #[command(about = "Suggest a budget capped at the product's typical retail price")]
    Budget(commands::budget::BudgetArgs),
    #[command(about = "Search for a listing at or below a price cap")]
    Search(commands::search::SearchArgs),
    #[command(about = "Send a deal notification from a JSON payload")]
    Notify(commands::notify::NotifyArgs),
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Check config, LLM credential, notification secret and email readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides { log_level: self.log_level.clone(), ..Default::default() },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();
    init_logging(&options);

    let result = match &cli.command {
        Command::Run(args) => commands::run::run(args, options),
        Command::Budget(args) => commands::budget::run(args, options),
        Command::Search(args) => commands::search::run(args, options),
        Command::Notify(args) => commands::notify::run(args, options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
        Command::Doctor { json } => {
            let output = commands::doctor::run(*json, options);
            commands::CommandResult { exit_code: 0, output }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr. Stdout carries command output and, for `notify`, the text notification.
fn init_logging(options: &LoadOptions) {
    let config = AppConfig::load(options.clone()).unwrap_or_default();
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(log_filter(&config.logging.level))
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Unknown levels fall back to `info`.
fn log_filter(level: &str) -> EnvFilter {
    let level = level.trim().parse::<Level>().unwrap_or(Level::INFO);
    EnvFilter::new(level.to_string().to_ascii_lowercase())
}
