pub mod close;
pub mod config;
pub mod feed;
pub mod react;
pub mod status;

use std::time::Duration;

use futures::StreamExt;

use crate::browser::{CdpPageDriver, PageDriver, SessionManager};
use crate::config::Config;
use crate::crawl::{sign_in, Diagnostics};
use crate::error::Result;

/// Attach to the session browser (launching it if needed)
async fn attach_driver(config: &Config) -> Result<CdpPageDriver> {
    let session_manager = SessionManager::new(config.browser.clone());
    let (browser, mut handler) = session_manager.get_or_create_session().await?;

    // Spawn handler in background
    tokio::spawn(async move { while handler.next().await.is_some() {} });

    session_manager.ensure_page(&browser).await?;

    let element_timeout = Duration::from_secs(config.run.element_timeout_secs);
    Ok(CdpPageDriver::new(session_manager, element_timeout))
}

/// Sign in with the configured account
async fn sign_in_with(driver: &dyn PageDriver, config: &Config) -> Result<()> {
    let (email, password) = config.credentials()?;

    sign_in(
        driver,
        &config.login,
        email,
        password,
        &Diagnostics::from_config(&config.diagnostics),
        Duration::from_secs(config.run.element_timeout_secs),
    )
    .await
}

/// Attach to the session browser and sign in
async fn open_signed_in_driver(config: &Config) -> Result<CdpPageDriver> {
    config.credentials()?;

    let driver = attach_driver(config).await?;
    sign_in_with(&driver, config).await?;
    Ok(driver)
}
