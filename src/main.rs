use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

mod assessment;
mod backend;
mod commands;
mod config;
mod emotion;
mod error;
mod lesson;
mod models;
mod report;
mod scheduler;
mod session;
#[cfg(test)]
mod testing;

use commands::Context;
use config::ConfigLoader;

#[derive(Parser)]
#[command(name = "learning-diagnostics")]
#[command(about = "Learning diagnostics and adaptive phonics lessons for Group Scholar", long_about = None)]
struct Cli {
    /// Config file to use instead of the user and project defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session token
    Login {
        email: String,
        /// Prompted for without echo when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session token
    Logout,
    /// Show the logged-in profile
    Whoami,
    /// Run the three-task diagnostic assessment
    Assess,
    /// Work through the adaptive phonics lessons
    Lesson,
    /// Summarize stored assessments
    History {
        /// Write a markdown report here
        #[arg(long)]
        out: Option<PathBuf>,
        /// Export every number comparison trial as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = ConfigLoader::load(cli.config.as_deref()).context("failed to load config")?;
    let ctx = Context::from_config(config)?;
    let stdin = BufReader::new(tokio::io::stdin());

    match cli.command {
        Commands::Login { email, password } => {
            let piped = (!std::io::stdin().is_terminal()).then_some(stdin);
            commands::auth::login(&ctx, &email, password, piped).await?;
        }
        Commands::Logout => commands::auth::logout(&ctx)?,
        Commands::Whoami => commands::auth::whoami(&ctx).await?,
        Commands::Assess => commands::assess::run(&ctx, stdin).await?,
        Commands::Lesson => commands::lesson::run(&ctx, stdin).await?,
        Commands::History { out, csv } => {
            commands::history::run(&ctx, out.as_deref(), csv.as_deref()).await?;
        }
    }

    Ok(())
}
