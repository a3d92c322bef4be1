// Server-side stream aggregation: merge partial indicators per identity, then finalize
// closed buckets and cascade them into the next coarser tier.

pub mod ingest;
pub mod worker;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::indicator::Indicator;

/// In-progress indicators of one kind keyed by identity.
///
/// `DashMap` shards give exclusive access per entry during `combine`, so two records of
/// the same identity never merge concurrently while unrelated identities proceed in
/// parallel. Flushing removes one entry at a time; a record arriving after its entry was
/// removed opens a fresh entry instead of being lost.
pub struct StreamAggregator<I: Indicator> {
    entries: DashMap<String, I>,
}

impl<I: Indicator> Default for StreamAggregator<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Indicator> StreamAggregator<I> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn receive(&self, indicator: I) {
        match self.entries.entry(indicator.id()) {
            Entry::Occupied(mut existing) => existing.get_mut().combine(&indicator),
            Entry::Vacant(slot) => {
                slot.insert(indicator);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current merged state for an identity, if open.
    pub fn get(&self, id: &str) -> Option<I> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    /// Finalizes every entry whose bucket closed before `now - grace`.
    ///
    /// Each finalized record is removed, calculated, and its coarser copy is fed back
    /// into this aggregator. Copies created during this call are not flushed by it.
    pub fn flush(&self, now: DateTime<Utc>, grace: TimeDelta) -> Vec<I> {
        let closed: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().time_bucket().is_closed(now, grace))
            .map(|e| e.key().clone())
            .collect();

        let mut finalized = Vec::with_capacity(closed.len());
        for id in closed {
            let Some((_, indicator)) = self
                .entries
                .remove_if(&id, |_, v| v.time_bucket().is_closed(now, grace))
            else {
                continue;
            };
            finalized.push(self.finalize(indicator));
        }
        finalized
    }

    /// Finalizes everything regardless of bucket state, cascading tier by tier until
    /// the map is empty. Used on shutdown.
    pub fn drain(&self) -> Vec<I> {
        let mut finalized = Vec::new();
        while !self.entries.is_empty() {
            let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
            for id in ids {
                if let Some((_, indicator)) = self.entries.remove(&id) {
                    finalized.push(self.finalize(indicator));
                }
            }
        }
        finalized
    }

    fn finalize(&self, mut indicator: I) -> I {
        indicator.calculate();
        if let Some(coarser) = indicator.to_coarser() {
            self.receive(coarser);
        }
        indicator
    }
}
