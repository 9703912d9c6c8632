use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands;
use crate::config::Config;
use crate::crawl::CrawlTarget;
use crate::error::Result;

/// Feedreact CLI - React to every post in a feed you have not reacted to yet
#[derive(Parser)]
#[command(name = "feedreact")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "FEEDREACT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Env file loaded before configuration is read
    #[arg(long, default_value = ".env", global = true)]
    pub env_file: PathBuf,

    /// Show the browser window instead of running headless
    #[arg(long, env = "FEEDREACT_HEADED", global = true)]
    pub headed: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in, walk a feed and react to posts until the target is reached
    React {
        /// Feed to walk
        #[arg(long, value_enum)]
        target: CrawlTarget,

        /// Reactions to make (overrides POST_COUNT_TO_PROCESS)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        count: Option<u32>,

        /// Wall-clock budget for the crawl in minutes
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        deadline_mins: Option<u64>,

        /// Leave the browser running after the crawl
        #[arg(long)]
        keep_open: bool,
    },

    /// Sign in and print what the feed currently shows, without reacting
    Feed {
        /// Feed to read
        #[arg(long, value_enum)]
        target: CrawlTarget,
    },

    /// Show detected browsers and the browser session
    Status,

    /// Close the browser session
    Close,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Print the config file path
    Path,
}

impl Cli {
    /// Load configuration with command-line overrides applied
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if self.headed {
            config.browser.headless = false;
        }
        Ok(config)
    }

    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::React {
                target,
                count,
                deadline_mins,
                keep_open,
            } => commands::react::run(self, *target, *count, *deadline_mins, *keep_open).await,
            Commands::Feed { target } => commands::feed::run(self, *target).await,
            Commands::Status => commands::status::run(self).await,
            Commands::Close => commands::close::run(self).await,
            Commands::Config { command } => commands::config::run(self, command).await,
        }
    }
}
