use crate::geometry::Point;
use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};

pub const DEFAULT_ALPHA_CACHE_CAPACITY: usize = 100;

pub type Fingerprint = u64;

/// Order-independent fingerprint of a point set.
pub fn fingerprint(points: &[Point]) -> Fingerprint {
    let mut sorted = points.to_vec();
    sorted.sort_by(Point::total_cmp);
    let mut hasher = DefaultHasher::new();
    sorted.len().hash(&mut hasher);
    for point in sorted {
        point.x.to_bits().hash(&mut hasher);
        point.y.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

#[derive(Debug)]
pub struct AlphaCache {
    capacity: usize,
    tick: u64,
    entries: HashMap<Fingerprint, (f64, u64)>,
    /// Last-access tick to key, oldest first.
    recency: BTreeMap<u64, Fingerprint>,
}

impl AlphaCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::with_capacity(capacity),
            recency: BTreeMap::new(),
        }
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

    pub fn get(&mut self, key: Fingerprint) -> Option<f64> {
        let tick = self.next_tick();
        let (alpha, last_used) = self.entries.get_mut(&key)?;
        self.recency.remove(last_used);
        *last_used = tick;
        self.recency.insert(tick, key);
        Some(*alpha)
    }

    pub fn set(&mut self, key: Fingerprint, alpha: f64) {
        let tick = self.next_tick();
        if let Some((_, previous)) = self.entries.insert(key, (alpha, tick)) {
            self.recency.remove(&previous);
        } else if self.entries.len() > self.capacity
            && let Some((_, oldest)) = self.recency.pop_first()
        {
            self.entries.remove(&oldest);
        }
        self.recency.insert(tick, key);
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

impl Default for AlphaCache {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_order() {
        let a = vec![Point::new(1.0, 2.0), Point::new(3.0, 4.0), Point::new(5.0, 0.0)];
        let mut b = a.clone();
        b.reverse();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_differs_for_different_sets() {
        let a = vec![Point::new(1.0, 2.0), Point::new(3.0, 4.0)];
        let b = vec![Point::new(1.0, 2.0), Point::new(3.0, 4.5)];
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn miss_then_hit() {
        let mut cache = AlphaCache::new(2);
        assert_eq!(cache.get(7), None);
        cache.set(7, 0.25);
        assert_eq!(cache.get(7), Some(0.25));
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = AlphaCache::new(2);
        cache.set(1, 0.1);
        cache.set(2, 0.2);
        // touch 1 so 2 becomes the oldest
        assert_eq!(cache.get(1), Some(0.1));
        cache.set(3, 0.3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(2), None);
        assert_eq!(cache.get(1), Some(0.1));
        assert_eq!(cache.get(3), Some(0.3));
    }

    #[test]
    fn overwrite_does_not_evict() {
        let mut cache = AlphaCache::new(2);
        cache.set(1, 0.1);
        cache.set(2, 0.2);
        cache.set(1, 0.15);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(1), Some(0.15));
        assert_eq!(cache.get(2), Some(0.2));
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut cache = AlphaCache::new(0);
        cache.set(1, 0.1);
        cache.set(2, 0.2);
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(2), Some(0.2));
    }
}
