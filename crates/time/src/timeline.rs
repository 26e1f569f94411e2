use std::collections::VecDeque;
use std::sync::Arc;

use chronosta_kernel::World;
use serde::{Deserialize, Serialize};

use crate::TimeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Snapshots kept for rewinding; 600 is ten seconds at 60 Hz.
    pub capacity: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self { capacity: 600 }
    }
}

/// Bounded history of recent snapshots, oldest first.
///
/// Snapshots are shared `Arc`s, so pushing the live world costs a pointer
/// copy once the session has wrapped it.
#[derive(Debug, Clone)]
pub struct TimelineBuffer {
    entries: VecDeque<Arc<World>>,
    capacity: usize,
}

impl TimelineBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn with_config(config: &TimelineConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Append a snapshot. Returns the evicted oldest entry when full.
    ///
    /// Entries at or after the new snapshot's tick belong to an abandoned
    /// branch (the player rewound and moved on) and are dropped first.
    pub fn push(&mut self, snapshot: Arc<World>) -> Option<Arc<World>> {
        let tick = snapshot.tick();
        let mut truncated = 0usize;
        while self.entries.back().is_some_and(|w| w.tick() >= tick) {
            self.entries.pop_back();
            truncated += 1;
        }
        if truncated > 0 {
            tracing::debug!(truncated, tick, "timeline branch truncated");
        }

        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(snapshot);
        evicted
    }

    /// Drop the `n` most recent snapshots and return the new head, which
    /// stays stored.
    ///
    /// Fails without touching the buffer unless at least `n + 1` snapshots
    /// are stored.
    pub fn rewind(&mut self, n: usize) -> Result<Arc<World>, TimeError> {
        let len = self.entries.len();
        let empty = TimeError::Empty {
            requested: n,
            available: len.saturating_sub(1),
        };
        if n >= len {
            return Err(empty);
        }
        self.entries.truncate(len - n);
        self.entries.back().cloned().ok_or(empty)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent snapshot.
    pub fn head(&self) -> Option<&Arc<World>> {
        self.entries.back()
    }

    pub fn oldest_tick(&self) -> Option<u64> {
        self.entries.front().map(|w| w.tick())
    }

    /// Snapshots from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<World>> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::history;
    use proptest::prelude::*;

    fn ticks(buf: &TimelineBuffer) -> Vec<u64> {
        buf.iter().map(|w| w.tick()).collect()
    }

    #[test]
    fn capacity_three_keeps_latest_three() {
        let snaps = history(4);
        let mut buf = TimelineBuffer::new(3);
        let evicted: Vec<_> = snaps.iter().filter_map(|s| buf.push(s.clone())).collect();
        assert_eq!(ticks(&buf), vec![2, 3, 4]);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].tick(), 1);

        let head = buf.rewind(2).unwrap();
        assert_eq!(head.tick(), 2);
        assert_eq!(ticks(&buf), vec![2]);
    }

    #[test]
    fn rewind_past_start_leaves_buffer_alone() {
        let mut buf = TimelineBuffer::new(10);
        for s in history(3) {
            buf.push(s);
        }
        assert_eq!(
            buf.rewind(3).unwrap_err(),
            TimeError::Empty {
                requested: 3,
                available: 2
            }
        );
        assert_eq!(buf.len(), 3);
        assert!(TimelineBuffer::new(4).rewind(0).is_err());
    }

    #[test]
    fn rewind_zero_returns_head() {
        let mut buf = TimelineBuffer::new(4);
        for s in history(2) {
            buf.push(s);
        }
        assert_eq!(buf.rewind(0).unwrap().tick(), 2);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn push_behind_head_truncates_branch() {
        let snaps = history(5);
        let mut buf = TimelineBuffer::new(10);
        for s in &snaps {
            buf.push(s.clone());
        }
        buf.push(snaps[2].clone());
        assert_eq!(ticks(&buf), vec![1, 2, 3]);
        assert_eq!(buf.head().map(|w| w.tick()), Some(3));
    }

    #[test]
    fn clear_empties() {
        let mut buf = TimelineBuffer::new(4);
        for s in history(3) {
            buf.push(s);
        }
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.oldest_tick(), None);
        assert!(buf.head().is_none());
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(capacity in 1usize..16, pushes in 0usize..48) {
            let mut buf = TimelineBuffer::new(capacity);
            let mut evicted = Vec::new();
            for s in history(pushes) {
                prop_assert!(buf.len() <= capacity);
                if let Some(old) = buf.push(s) {
                    evicted.push(old.tick());
                }
            }
            prop_assert_eq!(buf.len(), pushes.min(capacity));
            let expected: Vec<u64> = (1..=pushes.saturating_sub(capacity) as u64).collect();
            prop_assert_eq!(evicted, expected);
            if pushes > 0 {
                prop_assert_eq!(buf.oldest_tick(), Some((pushes.saturating_sub(capacity) + 1) as u64));
            }
            let t = ticks(&buf);
            prop_assert!(t.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn rewind_lands_on_expected_tick(pushes in 1usize..30, n in 0usize..40) {
            let mut buf = TimelineBuffer::new(32);
            for s in history(pushes) {
                buf.push(s);
            }
            match buf.rewind(n) {
                Ok(head) => {
                    prop_assert!(n < pushes);
                    prop_assert_eq!(head.tick(), (pushes - n) as u64);
                    prop_assert_eq!(buf.len(), pushes - n);
                }
                Err(_) => {
                    prop_assert!(n >= pushes);
                    prop_assert_eq!(buf.len(), pushes);
                }
            }
        }
    }
}
