//! The page-control seam the crawler is written against.
//!
//! Every operation is a blocking round-trip to one browser tab and may fail;
//! callers decide whether a failure concerns a single item or the session.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::SessionManager;
use crate::error::{FeedReactError, Result};

#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load `url` in the tab and wait for the document to finish loading.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Wait until `selector` matches a rendered element.
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Evaluate `script` and return its result serialized by value.
    async fn evaluate(&self, script: &str) -> Result<Value>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn send_keys(&self, selector: &str, text: &str) -> Result<()>;

    async fn scroll_to_bottom(&self) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Scroll height of the document body.
    async fn page_height(&self) -> Result<i64>;

    async fn reload(&self) -> Result<()>;

    /// Full-page PNG.
    async fn screenshot(&self) -> Result<Vec<u8>>;
}

/// `PageDriver` over the active tab of a CDP session
pub struct CdpPageDriver {
    session_manager: SessionManager,
    load_timeout: Duration,
}

impl CdpPageDriver {
    pub fn new(session_manager: SessionManager, load_timeout: Duration) -> Self {
        Self {
            session_manager,
            load_timeout,
        }
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }
}

#[async_trait]
impl PageDriver for CdpPageDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        tracing::debug!("navigate: {}", url);
        self.session_manager.goto(url, self.load_timeout).await
    }

    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.session_manager.wait_for_element(selector, timeout).await
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.session_manager.eval_on_page(script).await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.session_manager.click_on_page(selector).await
    }

    async fn send_keys(&self, selector: &str, text: &str) -> Result<()> {
        self.session_manager.type_on_page(selector, text).await
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.session_manager
            .eval_on_page("window.scrollTo(0, document.body.scrollHeight)")
            .await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        // Straight from /json/list, so it works even while the page is busy
        Ok(self.session_manager.get_active_page_info().await?.url)
    }

    async fn page_height(&self) -> Result<i64> {
        let height = self
            .session_manager
            .eval_on_page("document.body.scrollHeight")
            .await?;
        page_height_from(&height)
    }

    async fn reload(&self) -> Result<()> {
        self.session_manager.reload(self.load_timeout).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.session_manager.screenshot_full_page().await
    }
}

/// `scrollHeight` must come back as an integer; anything else means the
/// document is not in a readable state
fn page_height_from(value: &Value) -> Result<i64> {
    value.as_i64().ok_or_else(|| {
        FeedReactError::JavaScriptError(format!("unexpected page height: {}", value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_height_is_accepted() {
        assert_eq!(page_height_from(&json!(2400)).unwrap(), 2400);
    }

    #[test]
    fn malformed_height_is_a_script_error() {
        for value in [json!(null), json!("2400"), json!(12.5)] {
            assert!(matches!(
                page_height_from(&value),
                Err(FeedReactError::JavaScriptError(_))
            ));
        }
    }
}
