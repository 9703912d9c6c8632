use std::time::Duration;

use crate::browser::PageDriver;
use crate::config::FeedConfig;
use crate::error::{FeedReactError, Result};

/// What "the feed has loaded" means for a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// The feed's root container is visible
    FeedRoot(String),
    /// Only the document body is required
    DocumentBody,
}

impl Readiness {
    fn selector(&self) -> &str {
        match self {
            Readiness::FeedRoot(selector) => selector,
            Readiness::DocumentBody => "body",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    AlreadyOnFeed,
    Renavigated,
}

/// Keeps the driver on the feed page between dispatches
#[derive(Debug, Clone)]
pub struct SessionGuard {
    feed_url: String,
    url_prefix: String,
    readiness: Readiness,
    timeout: Duration,
}

impl SessionGuard {
    pub fn new(
        feed_url: impl Into<String>,
        url_prefix: impl Into<String>,
        readiness: Readiness,
        timeout: Duration,
    ) -> Self {
        Self {
            feed_url: feed_url.into(),
            url_prefix: url_prefix.into(),
            readiness,
            timeout,
        }
    }

    pub fn from_config(feed: &FeedConfig, timeout: Duration) -> Self {
        let readiness = if feed.wait_for_root {
            Readiness::FeedRoot(feed.root_selector.clone())
        } else {
            Readiness::DocumentBody
        };
        Self::new(&feed.feed_url, &feed.url_prefix, readiness, timeout)
    }

    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }

    /// Return to the feed unless the driver is already on it.
    ///
    /// An unreadable URL counts as being off the feed. Failing to get back is
    /// `SessionLost`.
    pub async fn ensure_on(&self, driver: &dyn PageDriver) -> Result<GuardOutcome> {
        match driver.current_url().await {
            Ok(url) if url.starts_with(&self.url_prefix) => {
                return Ok(GuardOutcome::AlreadyOnFeed);
            }
            Ok(url) => tracing::info!("On {}, returning to the feed", url),
            Err(e) => {
                tracing::warn!("Could not read the current URL ({}), returning to the feed", e)
            }
        }

        self.open_feed(driver)
            .await
            .map_err(|e| FeedReactError::SessionLost(format!("{}: {}", self.feed_url, e)))?;

        Ok(GuardOutcome::Renavigated)
    }

    /// Navigate to the feed and wait until it is ready
    pub async fn open_feed(&self, driver: &dyn PageDriver) -> Result<()> {
        driver.navigate(&self.feed_url).await?;
        driver
            .wait_visible(self.readiness.selector(), self.timeout)
            .await
    }
}
