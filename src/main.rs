use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feedreact::cli::Cli;
use feedreact::error::{FeedReactError, Result};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // chromiumoxide logs unknown CDP events from newer browsers as errors; they are harmless
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(default_level)
            .add_directive("chromiumoxide::conn=warn".parse().unwrap())
            .add_directive("chromiumoxide::handler=warn".parse().unwrap())
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match dotenvy::from_path(&cli.env_file) {
        Ok(()) => tracing::debug!("Loaded {}", cli.env_file.display()),
        Err(e) if e.not_found() => {
            tracing::debug!("No env file at {}", cli.env_file.display())
        }
        Err(e) => {
            return Err(FeedReactError::ConfigError(format!(
                "{}: {}",
                cli.env_file.display(),
                e
            )))
        }
    }

    cli.run().await
}
