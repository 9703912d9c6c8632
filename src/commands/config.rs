use crate::cli::{Cli, ConfigCommands};
use crate::config::Config;
use crate::error::{FeedReactError, Result};

pub async fn run(cli: &Cli, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => show(cli),
        ConfigCommands::Path => path(cli),
    }
}

fn show(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| FeedReactError::ConfigError(e.to_string()))?;
        println!("{}", toml_str);
    }

    Ok(())
}

fn path(cli: &Cli) -> Result<()> {
    let path = cli.config.clone().unwrap_or_else(Config::config_path);

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "path": path.display().to_string(),
                "exists": path.exists()
            })
        );
    } else {
        println!("{}", path.display());
    }

    Ok(())
}
