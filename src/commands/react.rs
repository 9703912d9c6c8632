use std::future::Future;
use std::time::{Duration, Instant};

use colored::Colorize;
use tokio_util::sync::CancellationToken;

use crate::browser::PageDriver;
use crate::cli::Cli;
use crate::config::Config;
use crate::crawl::{
    CrawlTarget, FeedWalker, RunAborted, RunResult, TargetProfile, Termination, WalkPolicy,
};
use crate::error::Result;

pub async fn run(
    cli: &Cli,
    target: CrawlTarget,
    count: Option<u32>,
    deadline_mins: Option<u64>,
    keep_open: bool,
) -> Result<()> {
    let mut config = cli.load_config()?;
    if count.is_some() {
        config.target_count = count;
    }
    if let Some(mins) = deadline_mins {
        config.run.deadline_mins = mins;
    }

    let target_count = config.target_count()?;
    let profile = TargetProfile::from_config(target, &config)?;
    let policy = WalkPolicy::from_config(&config, target_count);

    // Fail on missing credentials before a browser is launched
    config.credentials()?;
    let driver = super::attach_driver(&config).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, wrapping up");
            on_interrupt.cancel();
        }
    });

    let started = Instant::now();
    let session = driver.session_manager();
    let outcome = sign_in_and_walk(
        &driver,
        &config,
        FeedWalker::new(&driver, profile, policy).with_cancellation(cancel),
        keep_open,
        || session.close_session(),
    )
    .await?;
    let elapsed = started.elapsed();

    match outcome {
        Ok(result) => {
            print_summary(cli, target, target_count, &result, elapsed)?;
            Ok(())
        }
        Err(aborted) => {
            print_summary(cli, target, target_count, &aborted.partial, elapsed)?;
            Err(aborted.cause)
        }
    }
}

/// Sign in and walk the feed. Once attached, the browser is closed on every
/// path unless `keep_open` is set, a failed sign-in included.
async fn sign_in_and_walk<C, F>(
    driver: &dyn PageDriver,
    config: &Config,
    walker: FeedWalker<'_>,
    keep_open: bool,
    close: C,
) -> Result<std::result::Result<RunResult, RunAborted>>
where
    C: FnOnce() -> F,
    F: Future<Output = Result<()>>,
{
    let outcome = match super::sign_in_with(driver, config).await {
        Ok(()) => Ok(walker.run().await),
        Err(e) => Err(e),
    };

    if !keep_open {
        if let Err(e) = close().await {
            tracing::warn!("Could not close the browser: {}", e);
        }
    }

    outcome
}

fn print_summary(
    cli: &Cli,
    target: CrawlTarget,
    requested: u32,
    result: &RunResult,
    elapsed: Duration,
) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "target": target,
                "requested": requested,
                "elapsed_secs": elapsed.as_secs(),
                "result": result,
            }))?
        );
        return Ok(());
    }

    let marker = match result.termination {
        Termination::TargetReached => "✓".green(),
        Termination::Aborted => "✗".red(),
        _ => "!".yellow(),
    };
    println!(
        "{} Reacted to {}/{} posts on the {} ({})",
        marker,
        result.success_count,
        requested,
        target.name(),
        result.termination.describe()
    );
    println!(
        "  {}",
        format!(
            "Processed {} posts in {}m {}s",
            result.processed_urls.len(),
            elapsed.as_secs() / 60,
            elapsed.as_secs() % 60
        )
        .dimmed()
    );

    if !result.reacted_urls.is_empty() {
        println!();
        println!("{}", "Reacted:".bold());
        for url in &result.reacted_urls {
            println!("  {}", url);
        }
    }

    Ok(())
}
