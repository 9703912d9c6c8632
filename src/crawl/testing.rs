//! Scripted `PageDriver` shared by the crawl tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::browser::PageDriver;
use crate::error::{FeedReactError, Result};

/// Default own-reaction marker, see `ReactionConfig`
pub const MARKER: &str = ".emoji-reaction--viewer-reacted";

/// Repeat a failure forever
pub const ALWAYS: u32 = u32::MAX;

/// Timeline state entries for `(id, reacted_by_viewer)` pairs
pub fn feed_json(items: &[(i64, bool)]) -> Value {
    Value::Array(
        items
            .iter()
            .map(|(id, reacted)| {
                json!({
                    "feedable_type": "Activity",
                    "activity": {
                        "id": id,
                        "emoji_reactions": [{ "viewer_has_reacted": reacted }]
                    }
                })
            })
            .collect(),
    )
}

#[derive(Default)]
struct State {
    url: String,
    snapshots: VecDeque<std::result::Result<Value, String>>,
    last_snapshot: Option<Value>,
    heights: VecDeque<i64>,
    last_height: i64,
    click_failures: HashMap<String, u32>,
    wait_failures: HashMap<String, u32>,
    failing_items: HashSet<String>,
    hanging_items: HashSet<String>,
    unreachable: HashSet<String>,
    reacted_items: HashSet<String>,
    reload_fails: bool,
    scroll_fails: bool,
    height_fails: bool,
    url_fails: bool,
    eval_delay: Duration,
    log: Vec<String>,
}

/// In-memory page whose behaviour is scripted up front.
///
/// Snapshots are served in order and the last one repeats once the script
/// runs out; heights behave the same way.
pub struct ScriptedDriver {
    state: Mutex<State>,
}

impl ScriptedDriver {
    pub fn new(url: &str) -> Self {
        Self {
            state: Mutex::new(State {
                url: url.to_string(),
                last_height: 1000,
                ..State::default()
            }),
        }
    }

    fn edit(self, f: impl FnOnce(&mut State)) -> Self {
        f(&mut *self.state.lock().unwrap());
        self
    }

    pub fn snapshot(self, value: Value) -> Self {
        self.edit(|s| s.snapshots.push_back(Ok(value)))
    }

    pub fn snapshot_error(self) -> Self {
        self.edit(|s| s.snapshots.push_back(Err("ReferenceError".into())))
    }

    pub fn heights(self, heights: &[i64]) -> Self {
        self.edit(|s| s.heights.extend(heights))
    }

    pub fn fail_clicks(self, selector: &str, times: u32) -> Self {
        self.edit(|s| {
            s.click_failures.insert(selector.to_string(), times);
        })
    }

    pub fn fail_waits(self, selector: &str, times: u32) -> Self {
        self.edit(|s| {
            s.wait_failures.insert(selector.to_string(), times);
        })
    }

    /// Every click fails while this page is open
    pub fn failing_item(self, url: &str) -> Self {
        self.edit(|s| {
            s.failing_items.insert(url.to_string());
        })
    }

    /// Navigating here never completes
    pub fn hanging_item(self, url: &str) -> Self {
        self.edit(|s| {
            s.hanging_items.insert(url.to_string());
        })
    }

    pub fn unreachable(self, url: &str) -> Self {
        self.edit(|s| {
            s.unreachable.insert(url.to_string());
        })
    }

    /// The own-reaction marker is present on this page
    pub fn reacted_item(self, url: &str) -> Self {
        self.edit(|s| {
            s.reacted_items.insert(url.to_string());
        })
    }

    pub fn reload_fails(self) -> Self {
        self.edit(|s| s.reload_fails = true)
    }

    pub fn scroll_fails(self) -> Self {
        self.edit(|s| s.scroll_fails = true)
    }

    pub fn height_fails(self) -> Self {
        self.edit(|s| s.height_fails = true)
    }

    pub fn url_fails(self) -> Self {
        self.edit(|s| s.url_fails = true)
    }

    pub fn eval_delay(self, delay: Duration) -> Self {
        self.edit(|s| s.eval_delay = delay)
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Number of log entries equal to `entry`
    pub fn count(&self, entry: &str) -> usize {
        self.log().iter().filter(|e| *e == entry).count()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.log()
            .iter()
            .filter_map(|e| e.strip_prefix("navigate ").map(str::to_string))
            .collect()
    }

    fn record(&self, entry: String) {
        self.state.lock().unwrap().log.push(entry);
    }

    fn take_failure(map: &mut HashMap<String, u32>, key: &str) -> bool {
        match map.get_mut(key) {
            Some(0) | None => false,
            Some(n) => {
                if *n != ALWAYS {
                    *n -= 1;
                }
                true
            }
        }
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.record(format!("navigate {}", url));
        let (hangs, unreachable) = {
            let s = self.state.lock().unwrap();
            (s.hanging_items.contains(url), s.unreachable.contains(url))
        };
        if hangs {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        }
        if unreachable {
            return Err(FeedReactError::NavigationFailed(format!(
                "net::ERR_NAME_NOT_RESOLVED at {}",
                url
            )));
        }
        self.state.lock().unwrap().url = url.to_string();
        Ok(())
    }

    async fn wait_visible(&self, selector: &str, _timeout: Duration) -> Result<()> {
        self.record(format!("wait {}", selector));
        let mut s = self.state.lock().unwrap();
        if Self::take_failure(&mut s.wait_failures, selector) {
            return Err(FeedReactError::Timeout(format!(
                "Element '{}' not visible",
                selector
            )));
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.record("eval".to_string());
        let delay = self.state.lock().unwrap().eval_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut s = self.state.lock().unwrap();
        if script.contains(MARKER) {
            return Ok(Value::Bool(s.reacted_items.contains(&s.url)));
        }
        if script.contains(".click()") {
            return Ok(Value::Bool(true));
        }
        match s.snapshots.pop_front() {
            Some(Ok(value)) => {
                s.last_snapshot = Some(value.clone());
                Ok(value)
            }
            Some(Err(message)) => Err(FeedReactError::JavaScriptError(message)),
            None => Ok(s.last_snapshot.clone().unwrap_or(Value::Null)),
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.record(format!("click {}", selector));
        let mut s = self.state.lock().unwrap();
        if s.failing_items.contains(&s.url) || Self::take_failure(&mut s.click_failures, selector)
        {
            return Err(FeedReactError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    async fn send_keys(&self, selector: &str, text: &str) -> Result<()> {
        self.record(format!("keys {} {}", selector, text));
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.record("scroll".to_string());
        if self.state.lock().unwrap().scroll_fails {
            return Err(FeedReactError::JavaScriptError("scroll blocked".into()));
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let s = self.state.lock().unwrap();
        if s.url_fails {
            return Err(FeedReactError::CdpConnectionFailed("tab gone".into()));
        }
        Ok(s.url.clone())
    }

    async fn page_height(&self) -> Result<i64> {
        self.record("height".to_string());
        let mut s = self.state.lock().unwrap();
        if s.height_fails {
            return Err(FeedReactError::JavaScriptError("document.body is null".into()));
        }
        if let Some(height) = s.heights.pop_front() {
            s.last_height = height;
        }
        Ok(s.last_height)
    }

    async fn reload(&self) -> Result<()> {
        self.record("reload".to_string());
        if self.state.lock().unwrap().reload_fails {
            return Err(FeedReactError::Timeout("reload".into()));
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.record("screenshot".to_string());
        Ok(b"\x89PNG".to_vec())
    }
}
