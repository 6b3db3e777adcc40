use std::collections::VecDeque;

/// Fixed-capacity circular log. Pushing beyond capacity evicts the oldest
/// entry, so the buffer always holds the most recent `capacity` items.
#[derive(Debug, Clone)]
pub struct RingLog<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> RingLog<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
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

    /// Oldest-to-newest iteration.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Drops entries that no longer satisfy the predicate. Used by the engine
    /// to expire stale attack records by age.
    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) {
        self.entries.retain(keep);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: Clone> RingLog<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut log = RingLog::new(3);
        for n in 0..5 {
            log.push(n);
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.to_vec(), vec![2, 3, 4]);
        assert_eq!(log.latest(), Some(&4));
    }

    #[test]
    fn retain_drops_matching_entries() {
        let mut log = RingLog::new(10);
        for n in 0..6 {
            log.push(n);
        }

        log.retain(|n| *n % 2 == 0);
        assert_eq!(log.to_vec(), vec![0, 2, 4]);
    }

    #[test]
    fn zero_capacity_still_holds_one_entry() {
        let mut log = RingLog::new(0);
        log.push("only");
        assert_eq!(log.latest(), Some(&"only"));
    }
}
