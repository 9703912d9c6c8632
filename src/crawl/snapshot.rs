//! Reading the feed's current contents out of the page.
//!
//! The feed is read from whatever the page already holds: a hydration state
//! object, the same object serialized into an inline script, or the post
//! links rendered into the DOM.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::diagnostics::{Diagnostics, FAILED_FEED_FILE};
use crate::browser::PageDriver;
use crate::config::{FeedConfig, StrategyKind};
use crate::error::{FeedReactError, Result};

const OUTER_HTML: &str = "document.documentElement.outerHTML";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    /// A post that can be reacted to
    Post,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub id: i64,
    pub kind: FeedKind,
    pub reacted_by_viewer: bool,
}

impl FeedItem {
    pub fn post(id: i64, reacted_by_viewer: bool) -> Self {
        Self {
            id,
            kind: FeedKind::Post,
            reacted_by_viewer,
        }
    }
}

/// Where the feed is read from
#[derive(Debug, Clone)]
pub enum SnapshotStrategy {
    /// `window.<global>` walked along `path`
    StateObject { global: String, path: Vec<String> },
    /// The `window.<global> = {...};` inline script in the page markup
    EmbeddedScript { pattern: Regex, path: Vec<String> },
    /// Post links in the DOM; the id is the trailing numeric path segment
    AnchorHarvest { link_selector: String },
}

impl SnapshotStrategy {
    pub fn from_config(feed: &FeedConfig) -> Result<Self> {
        let strategy = match feed.strategy {
            StrategyKind::StateObject => SnapshotStrategy::StateObject {
                global: feed.state_global.clone(),
                path: feed.state_path_segments(),
            },
            StrategyKind::EmbeddedScript => SnapshotStrategy::EmbeddedScript {
                pattern: embedded_state_pattern(&feed.state_global)?,
                path: feed.state_path_segments(),
            },
            StrategyKind::AnchorHarvest => {
                if feed.link_selector.trim().is_empty() {
                    return Err(FeedReactError::ConfigError(
                        "anchor_harvest needs a link_selector".to_string(),
                    ));
                }
                SnapshotStrategy::AnchorHarvest {
                    link_selector: feed.link_selector.clone(),
                }
            }
        };
        Ok(strategy)
    }
}

/// Reads the feed items currently present on the page
#[derive(Debug, Clone)]
pub struct FeedSnapshotReader {
    strategy: SnapshotStrategy,
    diagnostics: Diagnostics,
}

impl FeedSnapshotReader {
    pub fn new(strategy: SnapshotStrategy, diagnostics: Diagnostics) -> Self {
        Self {
            strategy,
            diagnostics,
        }
    }

    /// Read every item the page currently holds, in feed order.
    ///
    /// `NoFeedData` means the state is not there (yet); `DecodeFailed` means it
    /// is there but malformed, and the raw payload is saved for inspection.
    pub async fn read(&self, driver: &dyn PageDriver) -> Result<Vec<FeedItem>> {
        let result = match &self.strategy {
            SnapshotStrategy::StateObject { global, path } => {
                read_state_object(driver, global, path).await
            }
            SnapshotStrategy::EmbeddedScript { pattern, path } => {
                read_embedded_script(driver, pattern, path).await
            }
            SnapshotStrategy::AnchorHarvest { link_selector } => {
                read_anchors(driver, link_selector).await
            }
        };

        if let Err(FeedReactError::DecodeFailed { payload, .. }) = &result {
            self.diagnostics.save(FAILED_FEED_FILE, payload.as_bytes());
        }

        result
    }
}

async fn read_state_object(
    driver: &dyn PageDriver,
    global: &str,
    path: &[String],
) -> Result<Vec<FeedItem>> {
    let value = driver.evaluate(&state_object_script(global, path)).await?;
    if value.is_null() {
        return Err(FeedReactError::NoFeedData(format!(
            "window.{}.{} is not set",
            global,
            path.join(".")
        )));
    }
    decode_feed(&value)
}

fn state_object_script(global: &str, path: &[String]) -> String {
    let global = serde_json::to_string(global).unwrap_or_default();
    let path = serde_json::to_string(path).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"(function() {{
    let node = window[{global}];
    for (const key of {path}) {{
        if (node === null || node === undefined) return null;
        node = node[key];
    }}
    return node === undefined ? null : node;
}})()"#
    )
}

async fn read_embedded_script(
    driver: &dyn PageDriver,
    pattern: &Regex,
    path: &[String],
) -> Result<Vec<FeedItem>> {
    let html = driver.evaluate(OUTER_HTML).await?;
    let html = html
        .as_str()
        .ok_or_else(|| FeedReactError::NoFeedData("page markup unavailable".to_string()))?;

    let raw = extract_embedded_state(pattern, html).ok_or_else(|| {
        FeedReactError::NoFeedData("no inline state assignment in page".to_string())
    })?;

    let state: Value = serde_json::from_str(raw).map_err(|e| FeedReactError::DecodeFailed {
        reason: e.to_string(),
        payload: raw.to_string(),
    })?;

    match walk_path(&state, path) {
        Some(feed) if !feed.is_null() => decode_feed(feed),
        _ => Err(FeedReactError::NoFeedData(format!(
            "inline state has no {}",
            path.join(".")
        ))),
    }
}

/// `<script>window.<global> = {...};</script>`, capturing the object literal
pub fn embedded_state_pattern(global: &str) -> Result<Regex> {
    let pattern = format!(
        r"(?s)<script[^>]*>\s*window\.{}\s*=\s*(\{{.*?\}});?\s*</script>",
        regex::escape(global)
    );
    Regex::new(&pattern).map_err(|e| FeedReactError::ConfigError(e.to_string()))
}

pub fn extract_embedded_state<'a>(pattern: &Regex, html: &'a str) -> Option<&'a str> {
    pattern
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn walk_path<'a>(mut node: &'a Value, path: &[String]) -> Option<&'a Value> {
    for key in path {
        node = match node {
            Value::Object(map) => map.get(key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

async fn read_anchors(driver: &dyn PageDriver, link_selector: &str) -> Result<Vec<FeedItem>> {
    let selector = serde_json::to_string(link_selector).unwrap_or_default();
    let script = format!(
        "Array.from(document.querySelectorAll({})).map(a => a.getAttribute('href') || '')",
        selector
    );

    let value = driver.evaluate(&script).await?;
    let hrefs: Vec<String> =
        Vec::deserialize(&value).map_err(|e| FeedReactError::DecodeFailed {
            reason: e.to_string(),
            payload: value.to_string(),
        })?;

    let items = harvest_ids(&hrefs);
    if items.is_empty() {
        return Err(FeedReactError::NoFeedData(format!(
            "no links match {}",
            link_selector
        )));
    }
    Ok(items)
}

/// One post per distinct trailing numeric id, first occurrence wins
fn harvest_ids(hrefs: &[String]) -> Vec<FeedItem> {
    let mut seen = HashSet::new();
    hrefs
        .iter()
        .filter_map(|href| trailing_id(href))
        .filter(|id| *id != 0 && seen.insert(*id))
        .map(|id| FeedItem::post(id, false))
        .collect()
}

fn trailing_id(href: &str) -> Option<i64> {
    let path = href.split(['?', '#']).next()?;
    path.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(default)]
    feedable_type: Option<String>,
    #[serde(default)]
    activity: Option<RawActivity>,
}

#[derive(Deserialize)]
struct RawActivity {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    emoji_reactions: Option<Vec<Option<RawReaction>>>,
}

#[derive(Deserialize)]
struct RawReaction {
    #[serde(default)]
    viewer_has_reacted: Option<bool>,
}

/// Decode the feed entries array.
///
/// Entries without an activity, or with a zero id, are skipped.
pub fn decode_feed(value: &Value) -> Result<Vec<FeedItem>> {
    let entries: Vec<Option<RawEntry>> =
        Vec::deserialize(value).map_err(|e| FeedReactError::DecodeFailed {
            reason: e.to_string(),
            payload: value.to_string(),
        })?;

    let items = entries
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let activity = entry.activity?;
            let id = activity.id.filter(|id| *id != 0)?;
            let kind = match entry.feedable_type.as_deref() {
                None => FeedKind::Post,
                Some(t) if t.eq_ignore_ascii_case("activity") => FeedKind::Post,
                Some(_) => FeedKind::Other,
            };
            let reacted_by_viewer = activity
                .emoji_reactions
                .unwrap_or_default()
                .into_iter()
                .flatten()
                .any(|r| r.viewer_has_reacted.unwrap_or(false));

            Some(FeedItem {
                id,
                kind,
                reacted_by_viewer,
            })
        })
        .collect();

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::testing::{feed_json, ScriptedDriver};
    use serde_json::json;
    use tempfile::TempDir;

    fn reader(strategy: SnapshotStrategy, dir: &TempDir) -> FeedSnapshotReader {
        FeedSnapshotReader::new(strategy, Diagnostics::new(dir.path()))
    }

    fn timeline_strategy() -> SnapshotStrategy {
        SnapshotStrategy::from_config(&FeedConfig::timeline()).unwrap()
    }

    #[test]
    fn decode_skips_missing_activity_and_zero_ids() {
        let value = json!([
            { "activity": { "id": 11, "emoji_reactions": [] } },
            { "journal": { "id": 3 } },
            { "activity": null },
            { "activity": { "id": 0 } },
            null,
            { "activity": { "id": 12, "emoji_reactions": [
                { "viewer_has_reacted": false },
                { "viewer_has_reacted": true }
            ] } },
            { "feedable_type": "Journal", "activity": { "id": 13 } }
        ]);

        let items = decode_feed(&value).unwrap();

        assert_eq!(
            items,
            vec![
                FeedItem::post(11, false),
                FeedItem::post(12, true),
                FeedItem {
                    id: 13,
                    kind: FeedKind::Other,
                    reacted_by_viewer: false
                },
            ]
        );
    }

    #[test]
    fn decode_rejects_non_array_state() {
        let err = decode_feed(&json!({ "feeds": [] })).unwrap_err();
        match err {
            FeedReactError::DecodeFailed { payload, .. } => assert_eq!(payload, r#"{"feeds":[]}"#),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn state_object_script_walks_the_path() {
        let script = state_object_script("__NUXT__", &["state".into(), "timeline".into()]);
        assert!(script.contains(r#"window["__NUXT__"]"#));
        assert!(script.contains(r#"["state","timeline"]"#));
    }

    #[tokio::test]
    async fn state_object_read_returns_items_in_order() {
        let dir = TempDir::new().unwrap();
        let driver = ScriptedDriver::new("https://yamap.com/timeline")
            .snapshot(feed_json(&[(3, false), (1, true), (2, false)]));

        let items = reader(timeline_strategy(), &dir).read(&driver).await.unwrap();

        let ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert!(items[1].reacted_by_viewer);
    }

    #[tokio::test]
    async fn missing_state_is_no_feed_data() {
        let dir = TempDir::new().unwrap();
        let driver = ScriptedDriver::new("https://yamap.com/timeline").snapshot(Value::Null);

        let err = reader(timeline_strategy(), &dir).read(&driver).await.unwrap_err();
        assert!(matches!(err, FeedReactError::NoFeedData(_)));
    }

    #[tokio::test]
    async fn malformed_state_is_saved_for_inspection() {
        let dir = TempDir::new().unwrap();
        let driver = ScriptedDriver::new("https://yamap.com/timeline")
            .snapshot(json!("not a feed"));

        let err = reader(timeline_strategy(), &dir).read(&driver).await.unwrap_err();

        assert!(matches!(err, FeedReactError::DecodeFailed { .. }));
        let saved = std::fs::read_to_string(dir.path().join(FAILED_FEED_FILE)).unwrap();
        assert_eq!(saved, r#""not a feed""#);
    }

    #[test]
    fn embedded_state_is_extracted_from_markup() {
        let pattern = embedded_state_pattern("__NUXT__").unwrap();
        let html = r#"<html><script src="/a.js"></script>
<script>window.__NUXT__={"state":{"timeline":{"feeds":[]}}};</script></html>"#;

        assert_eq!(
            extract_embedded_state(&pattern, html),
            Some(r#"{"state":{"timeline":{"feeds":[]}}}"#)
        );
        assert_eq!(extract_embedded_state(&pattern, "<html></html>"), None);
    }

    #[tokio::test]
    async fn embedded_script_strategy_decodes_inline_state() {
        let dir = TempDir::new().unwrap();
        let feed = FeedConfig {
            strategy: StrategyKind::EmbeddedScript,
            ..FeedConfig::timeline()
        };
        let html = format!(
            "<body><script>window.__NUXT__ = {};</script></body>",
            json!({ "state": { "timeline": { "feeds": feed_json(&[(8, false)]) } } })
        );
        let driver = ScriptedDriver::new("https://yamap.com/timeline").snapshot(json!(html));

        let strategy = SnapshotStrategy::from_config(&feed).unwrap();
        let items = reader(strategy, &dir).read(&driver).await.unwrap();

        assert_eq!(items, vec![FeedItem::post(8, false)]);
    }

    #[tokio::test]
    async fn embedded_script_with_broken_json_is_decode_failure() {
        let dir = TempDir::new().unwrap();
        let feed = FeedConfig {
            strategy: StrategyKind::EmbeddedScript,
            ..FeedConfig::timeline()
        };
        let driver = ScriptedDriver::new("https://yamap.com/timeline")
            .snapshot(json!("<script>window.__NUXT__ = {state: oops};</script>"));

        let strategy = SnapshotStrategy::from_config(&feed).unwrap();
        let err = reader(strategy, &dir).read(&driver).await.unwrap_err();

        assert!(matches!(err, FeedReactError::DecodeFailed { .. }));
        assert!(dir.path().join(FAILED_FEED_FILE).exists());
    }

    #[test]
    fn anchors_yield_distinct_trailing_ids() {
        let hrefs: Vec<String> = [
            "/activities/42",
            "/activities/42#comments",
            "/activities/7/",
            "/activities/9?from=search",
            "/activities/new",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let ids: Vec<i64> = harvest_ids(&hrefs).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![42, 7, 9]);
    }

    #[tokio::test]
    async fn anchor_harvest_reads_posts_from_links() {
        let dir = TempDir::new().unwrap();
        let driver = ScriptedDriver::new("https://yamap.com/search/activities").snapshot(json!([
            "/activities/42",
            "/activities/42#comments",
            "",
            "/activities/7",
        ]));

        let strategy = SnapshotStrategy::from_config(&FeedConfig::activities()).unwrap();
        let items = reader(strategy, &dir).read(&driver).await.unwrap();

        assert_eq!(items, vec![FeedItem::post(42, false), FeedItem::post(7, false)]);
        assert_eq!(driver.count("eval"), 1);
    }

    #[tokio::test]
    async fn anchor_harvest_rejects_non_string_hrefs() {
        let dir = TempDir::new().unwrap();
        let driver =
            ScriptedDriver::new("https://yamap.com/search/activities").snapshot(json!({"a": 1}));

        let strategy = SnapshotStrategy::from_config(&FeedConfig::activities()).unwrap();
        let err = reader(strategy, &dir).read(&driver).await.unwrap_err();

        assert!(matches!(err, FeedReactError::DecodeFailed { .. }));
    }

    #[tokio::test]
    async fn anchor_harvest_without_links_is_no_feed_data() {
        let dir = TempDir::new().unwrap();
        let driver = ScriptedDriver::new("https://yamap.com/search/activities").snapshot(json!([]));

        let strategy = SnapshotStrategy::from_config(&FeedConfig::activities()).unwrap();
        let err = reader(strategy, &dir).read(&driver).await.unwrap_err();

        assert!(matches!(err, FeedReactError::NoFeedData(_)));
    }

    #[test]
    fn anchor_harvest_requires_a_selector() {
        let feed = FeedConfig {
            link_selector: String::new(),
            ..FeedConfig::activities()
        };
        assert!(matches!(
            SnapshotStrategy::from_config(&feed),
            Err(FeedReactError::ConfigError(_))
        ));
    }
}
