//! Bounded history of recently shown verses.

use super::{Verse, VerseId};
use std::collections::VecDeque;

/// Number of identifiers kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Remembers the last few verse identifiers to avoid immediate repetition.
///
/// Lives for the process lifetime only.
#[derive(Debug, Clone)]
pub struct UsageTracker {
    history: VecDeque<VerseId>,
    limit: usize,
}

impl UsageTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }

    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            history: VecDeque::with_capacity(limit + 1),
            limit,
        }
    }

    /// Record `verse` as shown, evicting the oldest entries beyond the limit.
    pub fn record(&mut self, verse: &Verse) {
        let id = verse.id();
        self.history.retain(|existing| *existing != id);
        self.history.push_back(id);
        while self.history.len() > self.limit {
            self.history.pop_front();
        }
        tracing::debug!(
            verse = %self.history.back().map(VerseId::as_str).unwrap_or_default(),
            tracked = self.history.len(),
            "verse usage recorded"
        );
    }

    /// `true` iff `verse` is the most recently recorded one.
    #[must_use]
    pub fn is_repeat(&self, verse: &Verse) -> bool {
        self.history.back().is_some_and(|last| *last == verse.id())
    }

    /// Tracked identifiers, oldest first.
    pub fn ids(&self) -> impl Iterator<Item = &VerseId> {
        self.history.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}
