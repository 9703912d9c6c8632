//! Feed crawling: read the feed, react to what is new, scroll, repeat.

mod dedup;
mod diagnostics;
mod dispatcher;
mod guard;
mod login;
mod snapshot;
mod target;
mod walker;

#[cfg(test)]
pub(crate) mod testing;

pub use dedup::DedupTracker;
pub use diagnostics::Diagnostics;
pub use dispatcher::{ReactionDispatcher, ReactionOutcome};
pub use guard::{GuardOutcome, Readiness, SessionGuard};
pub use login::sign_in;
pub use snapshot::{FeedItem, FeedKind, FeedSnapshotReader, SnapshotStrategy};
pub use target::{CrawlTarget, TargetProfile};
pub use walker::{FeedWalker, RunAborted, RunResult, Termination, WalkPolicy};
