use colored::Colorize;

use crate::browser::SessionManager;
use crate::cli::Cli;
use crate::error::Result;

pub async fn run(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;
    let session_manager = SessionManager::new(config.browser);
    session_manager.close_session().await?;

    if cli.json {
        println!("{}", serde_json::json!({ "success": true }));
    } else {
        println!("{} Browser closed", "✓".green());
    }

    Ok(())
}
