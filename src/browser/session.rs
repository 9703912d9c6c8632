use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::Browser;
use chromiumoxide::handler::Handler;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::launcher::BrowserLauncher;
use crate::config::BrowserConfig;
use crate::error::{FeedReactError, Result};

/// Page info from CDP /json/list endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(rename = "type")]
    pub page_type: String,
    pub web_socket_debugger_url: Option<String>,
}

/// Session state persisted to disk
#[derive(Debug, Serialize, Deserialize)]
struct SessionState {
    session_name: String,
    cdp_port: u16,
    pid: Option<u32>,
    cdp_url: String,
}

/// Manages the crawler's browser across CLI invocations
pub struct SessionManager {
    config: BrowserConfig,
    sessions_dir: PathBuf,
}

impl SessionManager {
    pub fn new(config: BrowserConfig) -> Self {
        let sessions_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".feedreact")
            .join("sessions");

        Self {
            config,
            sessions_dir,
        }
    }

    pub fn session_name(&self) -> &str {
        let name = self.config.session_name.trim();
        if name.is_empty() {
            "default"
        } else {
            name
        }
    }

    /// Get the session state file path
    fn session_file(&self, session_name: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", session_name))
    }

    /// Load session state from disk
    fn load_session_state(&self) -> Option<SessionState> {
        let path = self.session_file(self.session_name());
        if path.exists() {
            let content = fs::read_to_string(&path).ok()?;
            serde_json::from_str(&content).ok()
        } else {
            None
        }
    }

    /// Save session state to disk
    fn save_session_state(&self, state: &SessionState) -> Result<()> {
        fs::create_dir_all(&self.sessions_dir)?;
        let path = self.session_file(&state.session_name);
        let content = serde_json::to_string_pretty(state)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Remove session state from disk
    fn remove_session_state(&self) -> Result<()> {
        let path = self.session_file(self.session_name());
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn local_client(timeout: Option<Duration>) -> reqwest::Client {
        let mut builder = reqwest::Client::builder().no_proxy();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        builder.build().unwrap_or_else(|_| reqwest::Client::new())
    }

    /// Check if a session is still alive
    async fn is_session_alive(&self, state: &SessionState) -> bool {
        let url = format!("http://127.0.0.1:{}/json/version", state.cdp_port);
        Self::local_client(Some(Duration::from_secs(5)))
            .get(&url)
            .send()
            .await
            .is_ok()
    }

    /// Fetch the current browser WebSocket URL from a CDP port via /json/version.
    /// Returns `None` if the port is unreachable or the response is malformed.
    async fn fetch_browser_ws_url(&self, cdp_port: u16) -> Option<String> {
        let url = format!("http://127.0.0.1:{}/json/version", cdp_port);
        let resp = Self::local_client(Some(Duration::from_secs(5)))
            .get(&url)
            .send()
            .await
            .ok()?;
        let info: serde_json::Value = resp.json().await.ok()?;
        info.get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    /// Reuse the remembered browser if it is still alive, otherwise launch one
    pub async fn get_or_create_session(&self) -> Result<(Browser, Handler)> {
        let session_name = self.session_name().to_string();

        if let Some(mut state) = self.load_session_state() {
            if self.is_session_alive(&state).await {
                // The browser may have restarted on the same port with a new session id.
                if let Some(fresh_url) = self.fetch_browser_ws_url(state.cdp_port).await {
                    if fresh_url != state.cdp_url {
                        tracing::debug!("CDP WebSocket URL changed, updating session");
                        state.cdp_url = fresh_url;
                        self.save_session_state(&state)?;
                    }
                }
                tracing::debug!("Reusing existing browser for session: {}", session_name);
                return self.connect_to_session(&state).await;
            } else {
                tracing::debug!("Session {} is dead, removing", session_name);
                self.remove_session_state()?;
            }
        }

        tracing::debug!("Launching a new browser for session: {}", session_name);
        self.create_session(&session_name).await
    }

    /// Launch a browser and remember it
    async fn create_session(&self, session_name: &str) -> Result<(Browser, Handler)> {
        let launcher = BrowserLauncher::from_config(session_name, &self.config)?;
        let (child, cdp_url) = launcher.launch_and_wait().await?;

        let state = SessionState {
            session_name: session_name.to_string(),
            cdp_port: launcher.get_cdp_port(),
            pid: Some(child.id()),
            cdp_url,
        };
        self.save_session_state(&state)?;

        self.connect_to_session(&state).await
    }

    /// Connect to an existing browser session
    async fn connect_to_session(&self, state: &SessionState) -> Result<(Browser, Handler)> {
        let (browser, handler) = Browser::connect(&state.cdp_url).await.map_err(|e| {
            FeedReactError::CdpConnectionFailed(format!("Failed to connect to browser: {}", e))
        })?;

        Ok((browser, handler))
    }

    /// Make sure the browser has a tab for the crawl to drive
    pub async fn ensure_page(&self, browser: &Browser) -> Result<()> {
        if !self.get_pages().await?.is_empty() {
            return Ok(());
        }

        browser
            .new_page("about:blank")
            .await
            .map_err(|e| FeedReactError::Other(format!("Failed to open a tab: {}", e)))?;
        Ok(())
    }

    /// Close the browser and forget the session
    pub async fn close_session(&self) -> Result<()> {
        if let Some(state) = self.load_session_state() {
            if let Ok((mut browser, mut handler)) = self.connect_to_session(&state).await {
                tokio::spawn(async move { while handler.next().await.is_some() {} });

                let _ = browser.close().await;
            }

            self.remove_session_state()?;
        }

        Ok(())
    }

    /// Get list of pages from the browser
    pub async fn get_pages(&self) -> Result<Vec<PageInfo>> {
        let state = self
            .load_session_state()
            .ok_or(FeedReactError::BrowserNotRunning)?;

        let url = format!("http://127.0.0.1:{}/json/list", state.cdp_port);
        let response = Self::local_client(None).get(&url).send().await.map_err(|e| {
            FeedReactError::CdpConnectionFailed(format!("Failed to get pages: {}", e))
        })?;

        let pages: Vec<PageInfo> = response.json().await.map_err(|e| {
            FeedReactError::CdpConnectionFailed(format!("Failed to parse pages: {}", e))
        })?;

        // Only actual pages, not extensions or service workers
        Ok(pages
            .into_iter()
            .filter(|p| p.page_type == "page")
            .collect())
    }

    /// Get the active page info (first page in the list)
    pub async fn get_active_page_info(&self) -> Result<PageInfo> {
        self.get_pages()
            .await?
            .into_iter()
            .next()
            .ok_or(FeedReactError::BrowserNotRunning)
    }

    /// Send one CDP command to the active page and return its `result`
    async fn send_cdp_command(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let page_info = self.get_active_page_info().await?;
        let ws_url = page_info
            .web_socket_debugger_url
            .ok_or_else(|| FeedReactError::CdpConnectionFailed("No WebSocket URL".to_string()))?;

        let (mut ws, _) = connect_async(&ws_url).await.map_err(|e| {
            FeedReactError::CdpConnectionFailed(format!("WebSocket connection failed: {}", e))
        })?;

        let cmd = serde_json::json!({
            "id": 1,
            "method": method,
            "params": params
        });

        ws.send(Message::Text(cmd.to_string().into()))
            .await
            .map_err(|e| FeedReactError::Other(format!("Failed to send command: {}", e)))?;

        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let response: serde_json::Value = serde_json::from_str(text.as_str())?;
                    if response.get("id") == Some(&serde_json::json!(1)) {
                        if let Some(error) = response.get("error") {
                            return Err(FeedReactError::Other(format!("CDP error: {}", error)));
                        }
                        return Ok(response
                            .get("result")
                            .cloned()
                            .unwrap_or(serde_json::Value::Null));
                    }
                }
                Ok(_) => continue,
                Err(e) => return Err(FeedReactError::Other(format!("WebSocket error: {}", e))),
            }
        }

        Err(FeedReactError::Other("No response received".to_string()))
    }

    /// Execute JavaScript on the active page and return the value by value
    pub async fn eval_on_page(&self, expression: &str) -> Result<serde_json::Value> {
        let result = self
            .send_cdp_command(
                "Runtime.evaluate",
                serde_json::json!({
                    "expression": expression,
                    "returnByValue": true
                }),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let msg = exception
                .get("exception")
                .and_then(|e| e.get("description"))
                .or_else(|| exception.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or("JavaScript exception");
            return Err(FeedReactError::JavaScriptError(msg.to_string()));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }

    /// Returns JavaScript that defines `__findElement(selector)` and
    /// `__isRendered(el)`. Selectors starting with `//` are XPath.
    fn find_element_js() -> &'static str {
        r#"
        function __findElement(selector) {
            if (selector.startsWith('//') || selector.startsWith('(//')) {
                const result = document.evaluate(selector, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null);
                return result.singleNodeValue;
            }
            return document.querySelector(selector);
        }
        function __isRendered(el) {
            if (!el) return false;
            const style = getComputedStyle(el);
            if (style.display === 'none' || style.visibility === 'hidden') return false;
            const rect = el.getBoundingClientRect();
            return rect.width > 0 && rect.height > 0;
        }
        "#
    }

    /// Click an element on the active page
    pub async fn click_on_page(&self, selector: &str) -> Result<()> {
        // Find the element, scroll it into view, and get its center coordinates
        let selector_json = serde_json::to_string(selector)?;
        let js = [
            "(function() {",
            Self::find_element_js(),
            &format!("const el = __findElement({selector_json});"),
            "if (!el) return null;",
            "el.scrollIntoView({ behavior: 'instant', block: 'center', inline: 'center' });",
            "const rect = el.getBoundingClientRect();",
            "return { x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 };",
            "})()",
        ]
        .join("\n");

        let coords = self.eval_on_page(&js).await?;

        if coords.is_null() {
            return Err(FeedReactError::ElementNotFound(selector.to_string()));
        }

        let x = coords
            .get("x")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| FeedReactError::Other("Invalid coordinates".to_string()))?;
        let y = coords
            .get("y")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| FeedReactError::Other("Invalid coordinates".to_string()))?;

        // Without mouseMoved first, CDP may not dispatch the click to the
        // element under the pointer.
        for event in ["mouseMoved", "mousePressed", "mouseReleased"] {
            let mut params = serde_json::json!({ "type": event, "x": x, "y": y });
            if event != "mouseMoved" {
                params["button"] = serde_json::json!("left");
                params["clickCount"] = serde_json::json!(1);
            }
            self.send_cdp_command("Input.dispatchMouseEvent", params)
                .await?;
        }

        Ok(())
    }

    /// Type text into an element on the active page
    pub async fn type_on_page(&self, selector: &str, text: &str) -> Result<()> {
        let selector_json = serde_json::to_string(selector)?;
        let js = [
            "(function() {",
            Self::find_element_js(),
            &format!("const el = __findElement({selector_json});"),
            "if (!el) return false;",
            "el.focus();",
            "return true;",
            "})()",
        ]
        .join("\n");

        let focused = self.eval_on_page(&js).await?;
        if !focused.as_bool().unwrap_or(false) {
            return Err(FeedReactError::ElementNotFound(selector.to_string()));
        }

        for c in text.chars() {
            for event in ["keyDown", "keyUp"] {
                self.send_cdp_command(
                    "Input.dispatchKeyEvent",
                    serde_json::json!({
                        "type": event,
                        "text": c.to_string()
                    }),
                )
                .await?;
            }
        }

        Ok(())
    }

    /// Take a full-page screenshot
    pub async fn screenshot_full_page(&self) -> Result<Vec<u8>> {
        let metrics = self
            .send_cdp_command("Page.getLayoutMetrics", serde_json::json!({}))
            .await?;

        let content_size = metrics
            .get("contentSize")
            .ok_or_else(|| FeedReactError::Other("No content size".to_string()))?;

        let width = content_size
            .get("width")
            .and_then(|v| v.as_f64())
            .unwrap_or(1920.0);
        let height = content_size
            .get("height")
            .and_then(|v| v.as_f64())
            .unwrap_or(1080.0);

        let result = self
            .send_cdp_command(
                "Page.captureScreenshot",
                serde_json::json!({
                    "format": "png",
                    "clip": {
                        "x": 0,
                        "y": 0,
                        "width": width,
                        "height": height,
                        "scale": 1
                    },
                    "captureBeyondViewport": true
                }),
            )
            .await?;

        let data = result
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FeedReactError::Other("No screenshot data".to_string()))?;

        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| FeedReactError::Other(format!("Failed to decode screenshot: {}", e)))
    }

    /// Navigate the active page and wait for the new document to load
    pub async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        let result = self
            .send_cdp_command("Page.navigate", serde_json::json!({ "url": url }))
            .await?;

        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            return Err(FeedReactError::NavigationFailed(format!(
                "{}: {}",
                url, error_text
            )));
        }

        self.wait_for_document_complete(timeout).await
    }

    /// Reload current page
    pub async fn reload(&self, timeout: Duration) -> Result<()> {
        self.send_cdp_command("Page.reload", serde_json::json!({}))
            .await?;
        self.wait_for_document_complete(timeout).await
    }

    async fn wait_for_document_complete(&self, timeout: Duration) -> Result<()> {
        let start = tokio::time::Instant::now();

        loop {
            // The old document can still answer right after Page.navigate.
            tokio::time::sleep(Duration::from_millis(100)).await;

            match self.eval_on_page("document.readyState").await {
                Ok(state) if state.as_str() == Some("complete") => return Ok(()),
                Ok(_) => {}
                // The execution context is torn down while the page swaps documents.
                Err(FeedReactError::JavaScriptError(e)) => {
                    tracing::debug!("readyState probe failed during navigation: {}", e)
                }
                Err(e) => return Err(e),
            }

            if start.elapsed() > timeout {
                return Err(FeedReactError::Timeout(format!(
                    "Page did not reach complete state within {}ms",
                    timeout.as_millis()
                )));
            }
        }
    }

    /// Wait for an element to be rendered
    pub async fn wait_for_element(&self, selector: &str, timeout: Duration) -> Result<()> {
        let start = tokio::time::Instant::now();
        let selector_json = serde_json::to_string(selector)?;
        let js = [
            "(function() {",
            Self::find_element_js(),
            &format!("return __isRendered(__findElement({selector_json}));"),
            "})()",
        ]
        .join("\n");

        loop {
            let visible = self.eval_on_page(&js).await?;

            if visible.as_bool().unwrap_or(false) {
                return Ok(());
            }

            if start.elapsed() > timeout {
                return Err(FeedReactError::Timeout(format!(
                    "Element '{}' not visible within {}ms",
                    selector,
                    timeout.as_millis()
                )));
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Get browser status for the configured session
    pub async fn get_status(&self) -> SessionStatus {
        let session = self.session_name().to_string();

        if let Some(state) = self.load_session_state() {
            if self.is_session_alive(&state).await {
                SessionStatus::Running {
                    session,
                    cdp_port: state.cdp_port,
                    cdp_url: state.cdp_url,
                    pid: state.pid,
                }
            } else {
                SessionStatus::Stale { session }
            }
        } else {
            SessionStatus::NotRunning { session }
        }
    }
}

#[derive(Debug)]
pub enum SessionStatus {
    Running {
        session: String,
        cdp_port: u16,
        cdp_url: String,
        pid: Option<u32>,
    },
    Stale {
        session: String,
    },
    NotRunning {
        session: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a SessionManager with a temp directory for isolation
    fn test_session_manager(dir: &std::path::Path, session_name: &str) -> SessionManager {
        SessionManager {
            config: BrowserConfig {
                session_name: session_name.to_string(),
                ..BrowserConfig::default()
            },
            sessions_dir: dir.to_path_buf(),
        }
    }

    fn state(session_name: &str, cdp_port: u16, cdp_url: &str) -> SessionState {
        SessionState {
            session_name: session_name.to_string(),
            cdp_port,
            pid: Some(4242),
            cdp_url: cdp_url.to_string(),
        }
    }

    #[test]
    fn save_and_load_session_state() {
        let dir = tempfile::tempdir().unwrap();
        let sm = test_session_manager(dir.path(), "crawl");

        sm.save_session_state(&state(
            "crawl",
            9222,
            "ws://127.0.0.1:9222/devtools/browser/abc",
        ))
        .unwrap();

        let loaded = sm.load_session_state().unwrap();
        assert_eq!(loaded.session_name, "crawl");
        assert_eq!(loaded.cdp_port, 9222);
        assert_eq!(loaded.cdp_url, "ws://127.0.0.1:9222/devtools/browser/abc");
        assert_eq!(loaded.pid, Some(4242));
    }

    #[test]
    fn save_creates_sessions_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sessions_dir = dir.path().join("nested").join("sessions");
        let sm = SessionManager {
            config: BrowserConfig::default(),
            sessions_dir: sessions_dir.clone(),
        };

        assert!(!sessions_dir.exists());
        sm.save_session_state(&state("default", 9222, "ws://localhost:9222"))
            .unwrap();
        assert!(sessions_dir.join("default.json").exists());
    }

    #[test]
    fn remove_session_state_deletes_file_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let sm = test_session_manager(dir.path(), "removeme");

        sm.save_session_state(&state("removeme", 9222, "ws://localhost:9222"))
            .unwrap();
        assert!(sm.session_file("removeme").exists());

        sm.remove_session_state().unwrap();
        assert!(!sm.session_file("removeme").exists());
        sm.remove_session_state().unwrap();
    }

    #[test]
    fn blank_session_name_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let sm = test_session_manager(dir.path(), "   ");

        assert_eq!(sm.session_name(), "default");
    }

    #[tokio::test]
    async fn dead_session_reports_stale() {
        let dir = tempfile::tempdir().unwrap();
        let sm = test_session_manager(dir.path(), "dead");

        // Nothing listens on this port
        sm.save_session_state(&state("dead", 19999, "ws://127.0.0.1:19999"))
            .unwrap();

        let status = sm.get_status().await;
        assert!(matches!(status, SessionStatus::Stale { .. }));
    }

    #[tokio::test]
    async fn missing_session_reports_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let sm = test_session_manager(dir.path(), "nothing-here");

        let status = sm.get_status().await;
        assert!(matches!(
            status,
            SessionStatus::NotRunning { session } if session == "nothing-here"
        ));
    }

    #[tokio::test]
    async fn get_pages_without_session_is_browser_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let sm = test_session_manager(dir.path(), "absent");

        let result = sm.get_pages().await;
        assert!(matches!(result, Err(FeedReactError::BrowserNotRunning)));
    }

    #[tokio::test]
    async fn fetch_browser_ws_url_returns_none_for_unreachable_port() {
        let dir = tempfile::tempdir().unwrap();
        let sm = test_session_manager(dir.path(), "default");

        assert!(sm.fetch_browser_ws_url(19998).await.is_none());
    }
}
