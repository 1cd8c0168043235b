use std::collections::HashMap;

/// Assigns stable integer indices to message keys.
///
/// Generated code refers to messages by these indices, so an index is never reused or
/// compacted for the lifetime of the tracker.
#[derive(Debug, Clone, Default)]
pub struct IndexTracker {
    indices: HashMap<String, u32>,
    next: u32,
}

impl IndexTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `key`, assigning the next free one on first sight
    pub fn get(&mut self, key: &str) -> u32 {
        if let Some(index) = self.indices.get(key) {
            return *index;
        }
        let index = self.next;
        self.indices.insert(key.to_string(), index);
        self.next += 1;
        index
    }

    /// Index of `key` if it was already assigned
    pub fn lookup(&self, key: &str) -> Option<u32> {
        self.indices.get(key).copied()
    }

    /// Forget every assignment and reseed in the order of `keys`.
    ///
    /// Used when a catalog is loaded before extraction so that indices match the order a
    /// previously compiled artifact was built with.
    pub fn reload<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.indices.clear();
        self.next = 0;
        for key in keys {
            self.get(key.as_ref());
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Keys in index order
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<(&str, u32)> = self
            .indices
            .iter()
            .map(|(key, index)| (key.as_str(), *index))
            .collect();
        keys.sort_by_key(|(_, index)| *index);
        keys.into_iter().map(|(key, _)| key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_is_stable_and_increasing() {
        let mut tracker = IndexTracker::new();
        assert_eq!(tracker.get("a"), 0);
        assert_eq!(tracker.get("b"), 1);
        assert_eq!(tracker.get("a"), 0);
        assert_eq!(tracker.get("c"), 2);
        assert_eq!(tracker.get("b"), 1);
        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.keys(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_lookup_does_not_assign() {
        let mut tracker = IndexTracker::new();
        assert_eq!(tracker.lookup("a"), None);
        assert!(tracker.is_empty());
        tracker.get("a");
        assert_eq!(tracker.lookup("a"), Some(0));
    }

    #[test]
    fn test_reload_reseeds_in_order() {
        let mut tracker = IndexTracker::new();
        tracker.get("x");
        tracker.get("y");
        tracker.reload(["b", "a", "b", "c"]);
        assert_eq!(tracker.lookup("x"), None);
        assert_eq!(tracker.get("b"), 0);
        assert_eq!(tracker.get("a"), 1);
        assert_eq!(tracker.get("c"), 2);
        assert_eq!(tracker.get("new"), 3);
    }
}
