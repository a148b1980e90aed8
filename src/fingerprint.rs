use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Content hash used as a memoization key. Stable for the lifetime of the
/// process, which is all the recompute cache needs.
pub fn fingerprint_with(f: impl FnOnce(&mut DefaultHasher)) -> u64 {
    let mut hasher = DefaultHasher::new();
    f(&mut hasher);
    hasher.finish()
}

pub fn fingerprint_of<T: Hash + ?Sized>(value: &T) -> u64 {
    fingerprint_with(|hasher| value.hash(hasher))
}

/// Feeds a float by bit pattern so `-0.0` and `0.0` stay distinct, like any
/// other change in content.
pub fn feed_f64(hasher: &mut DefaultHasher, value: f64) {
    value.to_bits().hash(hasher);
}

pub fn feed_slice<T>(hasher: &mut DefaultHasher, items: &[T], mut feed: impl FnMut(&mut DefaultHasher, &T)) {
    items.len().hash(hasher);
    for item in items {
        feed(hasher, item);
    }
}
