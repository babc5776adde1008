use super::SamplePoint;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// What happens when a sample arrives at a full queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Ring buffer: discard the oldest queued sample to make room.
    #[default]
    EvictOldest,
    /// Refuse the incoming sample.
    DropNewest,
}

/// Bounded FIFO shared between producers and the writer loop.
#[derive(Debug)]
pub struct SampleQueue {
    items: Mutex<VecDeque<SamplePoint>>,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: AtomicU64,
}

impl SampleQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        SampleQueue {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            policy,
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SamplePoint>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Never blocks. Returns whether the sample was queued.
    pub fn enqueue(&self, point: SamplePoint) -> bool {
        let mut items = self.lock();
        Self::push(&mut items, point, self.capacity, self.policy, &self.dropped)
    }

    /// Queue many samples under one lock. Returns how many were queued.
    pub fn enqueue_many<I>(&self, points: I) -> usize
    where
        I: IntoIterator<Item = SamplePoint>,
    {
        let mut items = self.lock();
        let mut queued = 0;
        for point in points {
            if Self::push(&mut items, point, self.capacity, self.policy, &self.dropped) {
                queued += 1;
            }
        }
        queued
    }

    fn push(
        items: &mut VecDeque<SamplePoint>,
        point: SamplePoint,
        capacity: usize,
        policy: OverflowPolicy,
        dropped: &AtomicU64,
    ) -> bool {
        if capacity == 0 {
            dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if items.len() >= capacity {
            dropped.fetch_add(1, Ordering::Relaxed);
            match policy {
                OverflowPolicy::DropNewest => return false,
                OverflowPolicy::EvictOldest => {
                    items.pop_front();
                }
            }
        }
        items.push_back(point);
        true
    }

    /// Take up to `max` samples from the front.
    pub fn dequeue_batch(&self, max: usize) -> Vec<SamplePoint> {
        let mut items = self.lock();
        let n = max.min(items.len());
        items.drain(..n).collect()
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

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Samples discarded by the overflow policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
