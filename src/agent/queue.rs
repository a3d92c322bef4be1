// Fixed-capacity drop-oldest buffer between the producer and dispatcher ticks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::MetricSample;

/// Bounded FIFO that never blocks and never rejects: when full, `offer` evicts the
/// oldest entry so the most recent `capacity` items are retained.
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    evicted_total: AtomicU64,
}

pub type BoundedSampleQueue = BoundedQueue<MetricSample>;

impl<T> BoundedQueue<T> {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            evicted_total: AtomicU64::new(0),
        }
    }

    // Every critical section leaves the deque consistent, so a poisoned lock is usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn offer(&self, item: T) {
        let mut items = self.lock();
        if items.len() >= self.capacity {
            items.pop_front();
            self.evicted_total.fetch_add(1, Ordering::Relaxed);
        }
        items.push_back(item);
    }

    /// Removes and returns everything queued, oldest first.
    pub fn drain_all(&self) -> Vec<T> {
        let mut items = self.lock();
        items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries dropped by overflow since creation.
    pub fn evicted_total(&self) -> u64 {
        self.evicted_total.load(Ordering::Relaxed)
    }
}
