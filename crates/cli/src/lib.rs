pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "insight",
    about = "Insight operator CLI",
    long_about = "Ask HR analytics questions and operate the Insight database, configuration and readiness checks.",
    after_help = "Examples:\n  insight doctor --json\n  insight seed\n  insight ask \"Why do employees leave?\" --hypotheses 3"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic HR attrition demo dataset")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database connectivity and language-model reachability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Answer one question and print the response envelope as JSON")]
    Ask {
        #[arg(help = "Question about the HR dataset")]
        question: String,
        #[arg(long, help = "Skip chart generation for descriptive questions")]
        no_viz: bool,
        #[arg(long, value_name = "N", help = "Number of hypotheses for causal questions")]
        hypotheses: Option<usize>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(filter)
        .compact()
        .try_init();
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Ask { question, no_viz, hypotheses } => {
            commands::ask::run(&question, !no_viz, hypotheses)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
