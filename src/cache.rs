use std::collections::HashSet;

/// Default number of notification ids remembered before the cache is flushed.
pub const DEDUP_CAPACITY: usize = 1000;

/// Set of notification ids that were already delivered.
///
/// Memory is bounded by flushing the whole set once it grows past its
/// capacity, not by evicting single entries. Right after a flush, ids that
/// are still in the tracker's feed are seen as new and delivered again;
/// this is accepted behavior.
#[derive(Debug)]
pub struct DedupCache {
    capacity: usize,
    seen: HashSet<String>,
}

impl DedupCache {
    /// Creates the cache with a maximum capacity
    pub fn new(capacity: usize) -> Self {
        DedupCache {
            capacity,
            seen: HashSet::new(),
        }
    }

    /// Records `id`, returning `true` if it was not seen before.
    ///
    /// This is the only place where a notification is judged new.
    pub fn add(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string())
    }

    /// Flushes the whole cache if it holds more than `capacity` ids.
    ///
    /// Returns `true` if the cache was flushed.
    pub fn evict_if_full(&mut self) -> bool {
        if self.seen.len() > self.capacity {
            tracing::info!(
                "dedup cache holds {} ids (capacity {}), flushing",
                self.seen.len(),
                self.capacity
            );
            self.seen.clear();
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEDUP_CAPACITY)
    }
}

#[test]
fn add_is_idempotent() {
    let mut cache = DedupCache::default();
    assert!(cache.add("n-1"));
    assert!(!cache.add("n-1"));
    assert!(cache.add("n-2"));
    assert_eq!(cache.len(), 2);
}

#[test]
fn flushes_only_past_capacity() {
    let mut cache = DedupCache::new(3);
    for id in ["a", "b", "c"] {
        assert!(cache.add(id));
    }
    assert!(!cache.evict_if_full());
    assert_eq!(cache.len(), 3);

    assert!(cache.add("d"));
    assert!(cache.evict_if_full());
    assert!(cache.is_empty());

    // Previously delivered ids are new again after a flush.
    assert!(cache.add("a"));
    assert!(!cache.add("a"));
}

#[test]
fn default_capacity() {
    let mut cache = DedupCache::default();
    for i in 0..DEDUP_CAPACITY {
        cache.add(&format!("n-{i}"));
    }
    assert!(!cache.evict_if_full());
    cache.add("one-more");
    assert!(cache.evict_if_full());
    assert!(cache.add("n-0"));
}
