//! Ordering and equality capabilities supplied by the caller.
//!
//! The index never requires `K: Ord` or `V: PartialEq` directly. Instead the
//! caller hands it a [`KeyComparator`] and a [`ValueEquality`] at construction,
//! which lets storage engines index encoded key forms whose byte order differs
//! from their natural Rust ordering. [`OrdComparator`] and [`DirectEquality`]
//! cover the common case where the natural ordering is the right one.

/// A strict weak order plus an equality relation over keys.
///
/// Implementations must be pure and thread-safe, and the two relations must
/// agree: `equal(a, b)` exactly when neither `less(a, b)` nor `less(b, a)`.
/// Violating that consistency leaves the index in an unspecified (but memory
/// safe) state.
pub trait KeyComparator<K>: Send + Sync {
    /// Returns `true` when `a` orders strictly before `b`.
    fn less(&self, a: &K, b: &K) -> bool;

    /// Returns `true` when `a` and `b` are equivalent under the order.
    fn equal(&self, a: &K, b: &K) -> bool;
}

/// An equality relation over stored values.
///
/// Values are typically pointer-sized row references, so this is usually a
/// plain identity comparison.
pub trait ValueEquality<V>: Send + Sync {
    /// Returns `true` when `a` and `b` refer to the same logical value.
    fn equal(&self, a: &V, b: &V) -> bool;
}

/// Compares keys through their `Ord` implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrdComparator;

impl<K: Ord> KeyComparator<K> for OrdComparator {
    fn less(&self, a: &K, b: &K) -> bool {
        a < b
    }

    fn equal(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Compares values through their `PartialEq` implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectEquality;

impl<V: PartialEq> ValueEquality<V> for DirectEquality {
    fn equal(&self, a: &V, b: &V) -> bool {
        a == b
    }
}
