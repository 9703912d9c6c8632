use colored::Colorize;

use crate::cli::Cli;
use crate::crawl::{CrawlTarget, FeedKind, TargetProfile};
use crate::error::Result;

/// Print the items the feed shows right after opening it
pub async fn run(cli: &Cli, target: CrawlTarget) -> Result<()> {
    let config = cli.load_config()?;
    let profile = TargetProfile::from_config(target, &config)?;

    let driver = super::open_signed_in_driver(&config).await?;
    profile.guard.open_feed(&driver).await?;
    let items = profile.reader.read(&driver).await?;

    if cli.json {
        let items: Vec<_> = items
            .iter()
            .map(|item| {
                serde_json::json!({
                    "id": item.id,
                    "kind": item.kind,
                    "reacted_by_viewer": item.reacted_by_viewer,
                    "url": profile.item_url(item.id),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "target": target,
                "items": items,
            }))?
        );
        return Ok(());
    }

    println!(
        "{} {} items on the {}",
        "Feed:".bold(),
        items.len(),
        target.name()
    );
    for item in &items {
        let marker = match (item.kind, item.reacted_by_viewer) {
            (FeedKind::Other, _) => "-".dimmed(),
            (FeedKind::Post, true) => "✓".green(),
            (FeedKind::Post, false) => "○".cyan(),
        };
        println!(
            "  {} {} {}",
            marker,
            item.id,
            profile.item_url(item.id).dimmed()
        );
    }

    Ok(())
}
