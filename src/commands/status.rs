use colored::Colorize;

use crate::browser::{discover_all_browsers, SessionManager, SessionStatus};
use crate::cli::Cli;
use crate::error::Result;

pub async fn run(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;
    let browsers = discover_all_browsers();
    let session_manager = SessionManager::new(config.browser);
    let status = session_manager.get_status().await;

    if cli.json {
        let browsers: Vec<_> = browsers
            .iter()
            .map(|b| {
                serde_json::json!({
                    "name": b.browser_type.name(),
                    "path": b.path.display().to_string(),
                    "version": b.version,
                })
            })
            .collect();
        let session = match &status {
            SessionStatus::Running {
                session,
                cdp_port,
                cdp_url,
                pid,
            } => serde_json::json!({
                "session": session,
                "state": "running",
                "cdp_port": cdp_port,
                "cdp_url": cdp_url,
                "pid": pid,
            }),
            SessionStatus::Stale { session } => {
                serde_json::json!({ "session": session, "state": "stale" })
            }
            SessionStatus::NotRunning { session } => {
                serde_json::json!({ "session": session, "state": "not_running" })
            }
        };
        println!(
            "{}",
            serde_json::json!({ "browsers": browsers, "session": session })
        );
        return Ok(());
    }

    println!("{}", "Detected Browsers:".bold());
    if browsers.is_empty() {
        println!("  {} No browsers found", "!".yellow());
    } else {
        for browser in browsers {
            println!(
                "  {} {} {}",
                "✓".green(),
                browser.browser_type.name(),
                browser
                    .version
                    .map(|v| format!("(v{})", v))
                    .unwrap_or_default()
                    .dimmed()
            );
            println!("    {}", browser.path.display().to_string().dimmed());
        }
    }

    println!();

    println!("{}", "Session Status:".bold());
    match status {
        SessionStatus::Running {
            session,
            cdp_port,
            cdp_url,
            pid,
        } => {
            println!("  {} Session: {}", "✓".green(), session.cyan());
            println!("  {} CDP Port: {}", "✓".green(), cdp_port);
            println!("  {} CDP URL: {}", "✓".green(), cdp_url.dimmed());
            if let Some(pid) = pid {
                println!("  {} PID: {}", "✓".green(), pid);
            }

            if let Ok(pages) = session_manager.get_pages().await {
                println!();
                println!("{}", "Open Pages:".bold());
                for (i, page) in pages.iter().enumerate() {
                    println!(
                        "  {}. {} {}",
                        (i + 1).to_string().cyan(),
                        page.title.bold(),
                        format!("({})", page.id).dimmed()
                    );
                    println!("     {}", page.url.dimmed());
                }
            }
        }
        SessionStatus::Stale { session } => {
            println!(
                "  {} Session: {} (stale session)",
                "!".yellow(),
                session.cyan()
            );
        }
        SessionStatus::NotRunning { session } => {
            println!(
                "  {} Session: {} (not running)",
                "○".dimmed(),
                session.cyan()
            );
        }
    }

    Ok(())
}
