use std::time::Duration;

use clap::ValueEnum;
use serde::Serialize;

use super::diagnostics::Diagnostics;
use super::dispatcher::ReactionDispatcher;
use super::guard::SessionGuard;
use super::snapshot::{FeedSnapshotReader, SnapshotStrategy};
use crate::config::{Config, FeedConfig};
use crate::error::Result;

/// Which feed to crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlTarget {
    /// The followed-users timeline
    #[value(alias = "react-timeline")]
    Timeline,
    /// The public activity listing
    #[value(alias = "react-activities")]
    Activities,
}

impl CrawlTarget {
    pub fn name(&self) -> &'static str {
        match self {
            CrawlTarget::Timeline => "timeline",
            CrawlTarget::Activities => "activities",
        }
    }

    pub fn feed_config<'a>(&self, config: &'a Config) -> &'a FeedConfig {
        match self {
            CrawlTarget::Timeline => &config.timeline,
            CrawlTarget::Activities => &config.activities,
        }
    }
}

/// Everything target-specific the walker needs, resolved from config
#[derive(Debug, Clone)]
pub struct TargetProfile {
    pub target: CrawlTarget,
    pub reader: FeedSnapshotReader,
    pub guard: SessionGuard,
    pub dispatcher: ReactionDispatcher,
    pub item_url_template: String,
    pub stagnant_threshold: u32,
    pub scroll_settle: Duration,
}

impl TargetProfile {
    pub fn from_config(target: CrawlTarget, config: &Config) -> Result<Self> {
        let feed = target.feed_config(config);
        let element_timeout = Duration::from_secs(config.run.element_timeout_secs);
        let diagnostics = Diagnostics::from_config(&config.diagnostics);

        Ok(Self {
            target,
            reader: FeedSnapshotReader::new(SnapshotStrategy::from_config(feed)?, diagnostics),
            guard: SessionGuard::from_config(feed, element_timeout),
            dispatcher: ReactionDispatcher::from_config(&config.reaction, element_timeout),
            item_url_template: config.reaction.item_url_template.clone(),
            stagnant_threshold: feed.stagnant_threshold.max(1),
            scroll_settle: Duration::from_millis(feed.scroll_settle_ms),
        })
    }

    pub fn item_url(&self, id: i64) -> String {
        self.item_url_template.replace("{id}", &id.to_string())
    }
}
