//! The crawl loop.
//!
//! The walker alternates between reading the feed, reacting to the items it
//! has not queued before, and scrolling for more. It stops when the target is
//! reached, the feed stops growing, scrolling breaks, or the run deadline
//! passes. Reaching the deadline is a normal end: whatever was done so far is
//! returned.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use super::dedup::DedupTracker;
use super::dispatcher::ReactionOutcome;
use super::guard::GuardOutcome;
use super::snapshot::{FeedItem, FeedKind};
use super::target::TargetProfile;
use crate::browser::PageDriver;
use crate::config::{Config, GuardTiming};
use crate::error::FeedReactError;

/// Run-wide limits for one crawl
#[derive(Debug, Clone)]
pub struct WalkPolicy {
    /// Stop after this many successful reactions
    pub target: u32,
    pub run_deadline: Duration,
    pub item_timeout: Duration,
    pub dispatch_pause: Duration,
    pub guard_timing: GuardTiming,
}

impl WalkPolicy {
    pub fn from_config(config: &Config, target: u32) -> Self {
        Self {
            target,
            run_deadline: Duration::from_secs(config.run.deadline_mins * 60),
            item_timeout: Duration::from_secs(config.run.item_timeout_secs),
            dispatch_pause: Duration::from_millis(config.run.dispatch_pause_ms),
            guard_timing: config.run.guard_timing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    TargetReached,
    /// No new items for the stagnation threshold and the page stopped growing
    FeedExhausted,
    DeadlineExpired,
    ScrollFailed,
    /// Stopped from outside (Ctrl-C)
    Interrupted,
    /// The feed page could not be recovered
    Aborted,
}

impl Termination {
    pub fn describe(&self) -> &'static str {
        match self {
            Termination::TargetReached => "target reached",
            Termination::FeedExhausted => "feed exhausted",
            Termination::DeadlineExpired => "deadline expired",
            Termination::ScrollFailed => "scrolling failed",
            Termination::Interrupted => "interrupted",
            Termination::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub success_count: u32,
    /// Every item a dispatch was started for, in order
    pub processed_urls: Vec<String>,
    pub reacted_urls: Vec<String>,
    pub termination: Termination,
}

/// A fatal error, with everything done before it
#[derive(Debug, Error)]
#[error("crawl aborted after {} reactions: {cause}", .partial.success_count)]
pub struct RunAborted {
    pub partial: RunResult,
    #[source]
    pub cause: FeedReactError,
}

#[derive(Debug, Default)]
struct ScrollState {
    last_height: Option<i64>,
    stagnant_rounds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingItem {
    pub id: i64,
    pub url: String,
}

pub type PendingQueue = VecDeque<PendingItem>;

#[derive(Debug, Default)]
struct Progress {
    success_count: u32,
    processed_urls: Vec<String>,
    reacted_urls: Vec<String>,
}

impl Progress {
    fn finish(self, termination: Termination) -> RunResult {
        RunResult {
            success_count: self.success_count,
            processed_urls: self.processed_urls,
            reacted_urls: self.reacted_urls,
            termination,
        }
    }
}

enum WalkState {
    Discovering,
    Dispatching(PendingQueue),
    Scrolling { discovered: usize },
    Terminated(Termination),
}

/// Why a phase stopped the walk early
enum Halt {
    Stop(Termination),
    Abort(FeedReactError),
}

/// Queue the unreacted posts in `items` that have not been queued before.
///
/// Queued ids are recorded in `seen` in feed order.
pub fn select_pending(
    items: &[FeedItem],
    seen: &mut DedupTracker,
    item_url: impl Fn(i64) -> String,
) -> PendingQueue {
    items
        .iter()
        .filter(|item| item.kind == FeedKind::Post && !item.reacted_by_viewer)
        .filter(|item| seen.insert(item.id))
        .map(|item| PendingItem {
            id: item.id,
            url: item_url(item.id),
        })
        .collect()
}

pub struct FeedWalker<'d> {
    driver: &'d dyn PageDriver,
    profile: TargetProfile,
    policy: WalkPolicy,
    cancel: CancellationToken,
}

impl<'d> FeedWalker<'d> {
    pub fn new(driver: &'d dyn PageDriver, profile: TargetProfile, policy: WalkPolicy) -> Self {
        Self {
            driver,
            profile,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the walk when `cancel` fires, as if the deadline had passed
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(&self) -> Result<RunResult, RunAborted> {
        let deadline = Instant::now() + self.policy.run_deadline;
        let mut seen = DedupTracker::new();
        let mut scroll = ScrollState::default();
        let mut progress = Progress::default();

        tracing::info!(
            "Crawling {} for {} reactions",
            self.profile.target.name(),
            self.policy.target
        );

        let mut state = if self.policy.target == 0 {
            WalkState::Terminated(Termination::TargetReached)
        } else {
            WalkState::Discovering
        };

        loop {
            let step = match state {
                WalkState::Discovering => self.discover(deadline, &mut seen, &mut scroll).await,
                WalkState::Dispatching(queue) => {
                    self.dispatch_all(deadline, queue, &mut scroll, &mut progress)
                        .await
                }
                WalkState::Scrolling { discovered } => {
                    self.scroll(deadline, discovered, &mut scroll).await
                }
                WalkState::Terminated(termination) => {
                    tracing::info!(
                        "Crawl finished ({}): {} reactions, {} items processed, {} ids seen",
                        termination.describe(),
                        progress.success_count,
                        progress.processed_urls.len(),
                        seen.len()
                    );
                    return Ok(progress.finish(termination));
                }
            };

            state = match step {
                Ok(next) => next,
                Err(Halt::Stop(termination)) => WalkState::Terminated(termination),
                Err(Halt::Abort(cause)) => {
                    tracing::error!("Crawl aborted: {}", cause);
                    return Err(RunAborted {
                        partial: progress.finish(Termination::Aborted),
                        cause,
                    });
                }
            };
        }
    }

    /// Run `fut` unless the run deadline passes or the walk is cancelled first
    async fn bounded<F: Future>(&self, deadline: Instant, fut: F) -> Result<F::Output, Halt> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Halt::Stop(Termination::Interrupted)),
            res = timeout_at(deadline, fut) => {
                res.map_err(|_| Halt::Stop(Termination::DeadlineExpired))
            }
        }
    }

    async fn ensure_on_feed(&self, deadline: Instant, scroll: &mut ScrollState) -> Result<(), Halt> {
        match self
            .bounded(deadline, self.profile.guard.ensure_on(self.driver))
            .await?
        {
            Ok(GuardOutcome::AlreadyOnFeed) => Ok(()),
            Ok(GuardOutcome::Renavigated) => {
                // Fresh page, heights from before are meaningless
                scroll.last_height = None;
                Ok(())
            }
            Err(e) => Err(Halt::Abort(e)),
        }
    }

    async fn discover(
        &self,
        deadline: Instant,
        seen: &mut DedupTracker,
        scroll: &mut ScrollState,
    ) -> Result<WalkState, Halt> {
        self.ensure_on_feed(deadline, scroll).await?;

        let items = match self
            .bounded(deadline, self.profile.reader.read(self.driver))
            .await?
        {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("Could not read the feed, scrolling for more: {}", e);
                return Ok(WalkState::Scrolling { discovered: 0 });
            }
        };

        let queue = select_pending(&items, seen, |id| self.profile.item_url(id));
        tracing::info!(
            "Feed shows {} items, {} new to react to",
            items.len(),
            queue.len()
        );

        if queue.is_empty() {
            Ok(WalkState::Scrolling { discovered: 0 })
        } else {
            Ok(WalkState::Dispatching(queue))
        }
    }

    async fn dispatch_all(
        &self,
        deadline: Instant,
        queue: PendingQueue,
        scroll: &mut ScrollState,
        progress: &mut Progress,
    ) -> Result<WalkState, Halt> {
        let discovered = queue.len();
        let mut queue = queue.into_iter().peekable();

        while let Some(item) = queue.next() {
            if self.policy.guard_timing == GuardTiming::BeforeEachDispatch {
                self.ensure_on_feed(deadline, scroll).await?;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let budget = self.policy.item_timeout.min(remaining);
            let dispatched = self
                .bounded(
                    deadline,
                    timeout(budget, self.profile.dispatcher.dispatch(self.driver, &item.url)),
                )
                .await?;

            progress.processed_urls.push(item.url.clone());
            match dispatched {
                Ok(Ok(ReactionOutcome::Reacted)) => {
                    progress.success_count += 1;
                    progress.reacted_urls.push(item.url);
                    tracing::info!(
                        "Reactions: {}/{}",
                        progress.success_count,
                        self.policy.target
                    );
                    if progress.success_count >= self.policy.target {
                        return Err(Halt::Stop(Termination::TargetReached));
                    }
                }
                Ok(Ok(ReactionOutcome::AlreadyReacted)) => {}
                Ok(Err(e)) => tracing::warn!("Skipping {}: {}", item.url, e),
                Err(_) => tracing::warn!("Skipping {}: no result after {:?}", item.url, budget),
            }

            if self.policy.guard_timing == GuardTiming::AfterEachDispatch {
                self.ensure_on_feed(deadline, scroll).await?;
            }

            if queue.peek().is_some() {
                self.bounded(deadline, sleep(self.policy.dispatch_pause))
                    .await?;
            }
        }

        Ok(WalkState::Scrolling { discovered })
    }

    async fn scroll(
        &self,
        deadline: Instant,
        discovered: usize,
        scroll: &mut ScrollState,
    ) -> Result<WalkState, Halt> {
        if discovered == 0 {
            scroll.stagnant_rounds += 1;
        } else {
            scroll.stagnant_rounds = 0;
        }

        let height = match self.bounded(deadline, self.driver.page_height()).await? {
            Ok(height) => height,
            Err(e) => {
                tracing::warn!("Could not measure the page: {}", e);
                return Ok(WalkState::Terminated(Termination::ScrollFailed));
            }
        };

        if scroll.last_height == Some(height)
            && scroll.stagnant_rounds >= self.profile.stagnant_threshold
        {
            tracing::info!(
                "Nothing new for {} rounds and the page stopped growing",
                scroll.stagnant_rounds
            );
            return Ok(WalkState::Terminated(Termination::FeedExhausted));
        }

        tracing::debug!(
            "Scrolling (height {}, {} stagnant rounds)",
            height,
            scroll.stagnant_rounds
        );
        if let Err(e) = self
            .bounded(deadline, self.driver.scroll_to_bottom())
            .await?
        {
            tracing::warn!("Could not scroll: {}", e);
            return Ok(WalkState::Terminated(Termination::ScrollFailed));
        }

        self.bounded(deadline, sleep(self.profile.scroll_settle))
            .await?;
        scroll.last_height = Some(height);

        Ok(WalkState::Discovering)
    }
}
