use serde::{Deserialize, Serialize};

/// How a feed snapshot is pulled out of the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Evaluate the in-memory state object directly
    StateObject,
    /// Parse the state assignment out of the rendered markup
    EmbeddedScript,
    /// Collect item links from the rendered listing
    AnchorHarvest,
}

/// Feed page settings for one crawl target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Canonical feed URL
    pub feed_url: String,

    /// The driver counts as "on the feed" while its URL starts with this
    pub url_prefix: String,

    /// Feed root container, waited for after (re)navigation
    pub root_selector: String,

    /// When false only `document.body` is waited for
    #[serde(default = "default_true")]
    pub wait_for_root: bool,

    pub strategy: StrategyKind,

    /// Global variable holding the client-side state
    #[serde(default = "default_state_global")]
    pub state_global: String,

    /// Dotted path from the global to the feed array
    #[serde(default)]
    pub state_path: String,

    /// Item links, for `anchor_harvest`
    #[serde(default)]
    pub link_selector: String,

    /// Stagnant rounds with unchanged height before the feed counts as exhausted
    pub stagnant_threshold: u32,

    /// Wait after each scroll for lazy content
    pub scroll_settle_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_state_global() -> String {
    "__NUXT__".to_string()
}

impl FeedConfig {
    pub fn timeline() -> Self {
        Self {
            feed_url: "https://yamap.com/timeline".to_string(),
            url_prefix: "https://yamap.com/timeline".to_string(),
            root_selector: ".TimelineList__Feed".to_string(),
            wait_for_root: true,
            strategy: StrategyKind::StateObject,
            state_global: default_state_global(),
            state_path: "state.timeline.feeds".to_string(),
            link_selector: String::new(),
            stagnant_threshold: 3,
            scroll_settle_ms: 5_000,
        }
    }

    pub fn activities() -> Self {
        Self {
            feed_url: "https://yamap.com/search/activities".to_string(),
            url_prefix: "https://yamap.com/search/activities".to_string(),
            root_selector: r#"[data-testid="activity-entry"]"#.to_string(),
            wait_for_root: true,
            strategy: StrategyKind::AnchorHarvest,
            state_global: default_state_global(),
            state_path: String::new(),
            link_selector: r#"[data-testid="activity-entry"] a[href^="/activities/"]"#
                .to_string(),
            stagnant_threshold: 5,
            scroll_settle_ms: 3_000,
        }
    }

    /// `state_path` split into its segments
    pub fn state_path_segments(&self) -> Vec<String> {
        self.state_path
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
