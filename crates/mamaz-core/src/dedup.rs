//! Bounded set of processed message keys with oldest-first eviction.

use std::collections::{HashSet, VecDeque};

/// Insertion-ordered set capped at `capacity` entries.
///
/// When an insert pushes the size over the cap, the oldest keys are evicted
/// until only the newest half remains.
#[derive(Debug)]
pub struct ProcessedSet {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl ProcessedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record `key`. Returns `false` if it was already present.
    pub fn insert(&mut self, key: String) -> bool {
        if self.members.contains(&key) {
            return false;
        }
        self.members.insert(key.clone());
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            self.trim();
        }
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.members.contains(key)
    }

    /// Evict oldest entries down to half the capacity, if over capacity.
    ///
    /// Returns the number of evicted keys.
    pub fn trim(&mut self) -> usize {
        if self.order.len() <= self.capacity {
            return 0;
        }
        // Never zero, or a cap of 1 would evict the key just inserted.
        let keep = (self.capacity / 2).max(1);
        let mut evicted = 0;
        while self.order.len() > keep {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
                evicted += 1;
            }
        }
        evicted
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut set = ProcessedSet::new(10);
        assert!(set.insert("a_1".into()));
        assert!(!set.insert("a_1".into()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_overflow_keeps_newest_half() {
        let mut set = ProcessedSet::new(4);
        for i in 0..5 {
            assert!(set.insert(format!("m{i}")));
        }
        // Over capacity at 5 entries -> trimmed to the newest 2.
        assert_eq!(set.len(), 2);
        assert!(set.contains("m3"));
        assert!(set.contains("m4"));
        assert!(!set.contains("m0"));
        assert!(!set.contains("m2"));
    }

    #[test]
    fn test_evicted_key_can_be_reinserted() {
        let mut set = ProcessedSet::new(2);
        set.insert("old".into());
        set.insert("b".into());
        set.insert("c".into());
        assert!(!set.contains("old"));
        assert!(set.insert("old".into()));
    }

    #[test]
    fn test_capacity_one_keeps_latest_key() {
        let mut set = ProcessedSet::new(1);
        assert!(set.insert("a_1".into()));
        assert!(set.insert("b_1".into()));
        assert_eq!(set.len(), 1);
        assert!(!set.insert("b_1".into()));
        assert!(!set.contains("a_1"));
    }

    #[test]
    fn test_trim_under_capacity_is_noop() {
        let mut set = ProcessedSet::new(8);
        set.insert("x".into());
        assert_eq!(set.trim(), 0);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let mut set = ProcessedSet::new(7);
        for i in 0..100 {
            set.insert(format!("k{i}"));
            assert!(set.len() <= 7);
        }
    }
}
