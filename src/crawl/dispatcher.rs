use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;

use crate::browser::PageDriver;
use crate::config::ReactionConfig;
use crate::error::{FeedReactError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionOutcome {
    Reacted,
    /// The page already shows the viewer's reaction; nothing was clicked
    AlreadyReacted,
}

/// Opens an item page and applies the approve reaction.
///
/// One call is one reaction: the page is loaded, the panel opened and the
/// choice clicked, retrying with a page reload in between.
#[derive(Debug, Clone)]
pub struct ReactionDispatcher {
    affordance: String,
    panel: String,
    choice: String,
    own_marker: Option<String>,
    max_attempts: u32,
    element_timeout: Duration,
    panel_settle: Duration,
    reaction_settle: Duration,
    recovery_settle: Duration,
}

impl ReactionDispatcher {
    pub fn from_config(config: &ReactionConfig, element_timeout: Duration) -> Self {
        let own_marker = Some(config.own_reaction_marker.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        Self {
            affordance: config.affordance_selector.clone(),
            panel: config.panel_selector.clone(),
            choice: config.choice_selector.clone(),
            own_marker,
            max_attempts: config.max_attempts.max(1),
            element_timeout,
            panel_settle: Duration::from_millis(config.panel_settle_ms),
            reaction_settle: Duration::from_millis(config.reaction_settle_ms),
            recovery_settle: Duration::from_millis(config.recovery_settle_ms),
        }
    }

    pub async fn dispatch(&self, driver: &dyn PageDriver, url: &str) -> Result<ReactionOutcome> {
        tracing::info!("Opening {}", url);
        self.open_item(driver, url)
            .await
            .map_err(|e| FeedReactError::PageLoadFailed(format!("{}: {}", url, e)))?;

        if self.already_reacted(driver).await {
            tracing::info!("Already reacted to {}, skipping", url);
            return Ok(ReactionOutcome::AlreadyReacted);
        }

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            tracing::debug!("Reaction attempt {}/{} on {}", attempt, self.max_attempts, url);

            match self.attempt(driver).await {
                Ok(()) => {
                    tracing::info!("Reacted to {}", url);
                    return Ok(ReactionOutcome::Reacted);
                }
                Err(e) => {
                    tracing::warn!(
                        "Reaction attempt {}/{} on {} failed: {}",
                        attempt,
                        self.max_attempts,
                        url,
                        e
                    );
                    last_error = Some(e);
                }
            }

            if attempt < self.max_attempts {
                self.recover(driver)
                    .await
                    .map_err(|e| FeedReactError::RecoveryFailed(format!("{}: {}", url, e)))?;
            }
        }

        Err(FeedReactError::ReactionFailed {
            attempts: self.max_attempts,
            source: Box::new(
                last_error.unwrap_or_else(|| FeedReactError::Other("no attempt made".into())),
            ),
        })
    }

    async fn open_item(&self, driver: &dyn PageDriver, url: &str) -> Result<()> {
        driver.navigate(url).await?;
        // The affordance is rendered lazily below the fold
        driver.scroll_to_bottom().await?;
        driver.wait_visible(&self.affordance, self.element_timeout).await
    }

    async fn already_reacted(&self, driver: &dyn PageDriver) -> bool {
        let Some(marker) = &self.own_marker else {
            return false;
        };

        let selector = serde_json::to_string(marker).unwrap_or_default();
        let script = format!("document.querySelector({}) !== null", selector);
        match driver.evaluate(&script).await {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(e) => {
                tracing::debug!("Own-reaction check failed, assuming not reacted: {}", e);
                false
            }
        }
    }

    async fn attempt(&self, driver: &dyn PageDriver) -> Result<()> {
        driver.click(&self.affordance).await?;
        driver.wait_visible(&self.panel, self.element_timeout).await?;
        sleep(self.panel_settle).await;

        driver.click(&self.choice).await?;
        sleep(self.reaction_settle).await;
        Ok(())
    }

    async fn recover(&self, driver: &dyn PageDriver) -> Result<()> {
        tracing::info!("Reloading before the next attempt");
        driver.reload().await?;
        driver.scroll_to_bottom().await?;
        driver.wait_visible(&self.affordance, self.element_timeout).await?;
        sleep(self.recovery_settle).await;
        Ok(())
    }
}
