use std::collections::HashSet;

/// Ids already queued for a reaction during this run.
///
/// Membership is permanent: an id is never queued twice, whatever the
/// outcome of its first dispatch.
#[derive(Debug, Default)]
pub struct DedupTracker {
    seen: HashSet<i64>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`. Returns `true` the first time it is seen.
    pub fn insert(&mut self, id: i64) -> bool {
        self.seen.insert(id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.seen.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
