#![doc = include_str!("../README.md")]
//! The core, concurrent, lock-free skip list implementation.
//!
//! This module provides `SkipList`, an ordered multi-map index over opaque
//! `(key, value)` entries, built for concurrent mutation without locks.
//!
//! # Internals
//!
//! -   **Nodes:** every entry lives in a heap `Node` carrying a tower of
//!     atomic forward pointers, one per level the node participates in, plus a
//!     `deleted` tombstone flag. Two keyless sentinel nodes (`head`, `tail`)
//!     terminate every level's chain uniformly.
//! -   **Insertion:** a new node is spliced in bottom-up, one CAS per level.
//!     The level-0 CAS is the commit point; admission (duplicate detection) is
//!     re-checked there, so two racing inserters of the same entry resolve to
//!     exactly one winner.
//! -   **Deletion:** two-phase. The winner of a CAS on the `deleted` flag owns
//!     the node's physical unlink, which proceeds top-down one CAS per level;
//!     the node is then retired to the [`epoch`] manager, which frees it once
//!     no reader that could still observe it remains active.
//! -   **Contention:** CAS losses and tombstoned predecessors are never
//!     surfaced; each splice attempt reports an outcome tag internally and the
//!     operation rebuilds its predecessor vector and retries.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

pub mod cmp;
pub mod epoch;
pub mod mem;
pub mod metrics;

pub use crate::cmp::{DirectEquality, KeyComparator, OrdComparator, ValueEquality};
pub use crate::mem::MemSize;

use crate::epoch::{EpochGuard, EpochManager};
use crate::metrics::{LABEL_OPERATION_TYPE, OPERATIONS_TOTAL};

/// Fixed ceiling on node height. Node levels range over `[1, MAX_LEVEL]`.
const MAX_LEVEL: usize = 16;
/// Slots in a predecessor vector: one per level index `0..=MAX_LEVEL`.
const LEVELS: usize = MAX_LEVEL + 1;
/// Probability of promoting a new node one more level.
const P: f64 = 0.5;

/// A node in the skip list.
///
/// `entry` is `None` exactly for the two sentinels, which also never carry a
/// tombstone. Interior nodes are born with `deleted == false`; the flag is
/// monotonic and flips to `true` at most once.
struct Node<K, V> {
    entry: Option<(K, V)>,
    /// Highest level this node participates in, fixed at allocation.
    level: usize,
    /// Forward pointers for levels `0..=level`, null until spliced.
    forward: Box<[AtomicPtr<Node<K, V>>]>,
    deleted: AtomicBool,
}

impl<K, V> Node<K, V> {
    fn alloc(key: K, value: V, level: usize) -> *mut Self {
        Box::into_raw(Box::new(Node {
            entry: Some((key, value)),
            level,
            forward: (0..=level).map(|_| AtomicPtr::new(ptr::null_mut())).collect(),
            deleted: AtomicBool::new(false),
        }))
    }

    fn sentinel() -> *mut Self {
        Box::into_raw(Box::new(Node {
            entry: None,
            level: MAX_LEVEL,
            forward: (0..=MAX_LEVEL)
                .map(|_| AtomicPtr::new(ptr::null_mut()))
                .collect(),
            deleted: AtomicBool::new(false),
        }))
    }

    /// # Safety
    ///
    /// Must not be called on a sentinel.
    unsafe fn key(&self) -> &K {
        unsafe { &self.entry.as_ref().unwrap_unchecked().0 }
    }

    /// # Safety
    ///
    /// Must not be called on a sentinel.
    unsafe fn value(&self) -> &V {
        unsafe { &self.entry.as_ref().unwrap_unchecked().1 }
    }

    /// Estimated bytes held by this node, tower and entry heap included.
    fn footprint(&self) -> usize
    where
        K: MemSize,
        V: MemSize,
    {
        let entry_bytes = self
            .entry
            .as_ref()
            .map_or(0, |(key, value)| key.mem_size() + value.mem_size());
        std::mem::size_of::<Self>()
            + self.forward.len() * std::mem::size_of::<AtomicPtr<Self>>()
            + entry_bytes
    }
}

/// Result of one single-level splice attempt. The caller loops on everything
/// except `Ok`.
enum SpliceOutcome {
    /// A conflicting live entry was admitted first; the insert fails.
    Duplicate,
    /// The chosen predecessor was tombstoned between search and CAS.
    PredecessorTombstoned,
    /// The predecessor's forward pointer moved; the vector is stale.
    PredecessorMoved,
    Ok,
}

/// A concurrent ordered multi-map index backed by a lock-free skip list.
///
/// With `unique_keys`, at most one live entry may exist per key; without it,
/// any number of values may share a key but no two live entries may share both
/// key and value. Ordering and equality are supplied by the caller through
/// [`KeyComparator`] and [`ValueEquality`].
///
/// All operations are synchronous and lock-free: contention on the same
/// predecessor causes internal retries, never blocking. Unlinked nodes are
/// reclaimed through the [`epoch`] manager; callers drive reclamation with
/// [`perform_garbage_collection`](SkipList::perform_garbage_collection).
pub struct SkipList<K, V, C = OrdComparator, E = DirectEquality> {
    head: *mut Node<K, V>,
    tail: *mut Node<K, V>,
    /// Highest level at which a non-sentinel node currently appears. Advisory:
    /// a stale value only costs a search a few redundant levels.
    cur_level: CachePadded<AtomicUsize>,
    len: CachePadded<AtomicUsize>,
    unique_keys: bool,
    key_cmp: C,
    value_eq: E,
    epoch: EpochManager<Node<K, V>>,
}

// SAFETY: nodes are shared across threads through raw pointers, but all
// mutable node state (`forward`, `deleted`) is atomic, and node lifetime is
// governed by the epoch manager, which requires every access to happen under
// an epoch guard. Keys and values therefore only need the usual marker bounds.
unsafe impl<K: Send, V: Send, C: Send, E: Send> Send for SkipList<K, V, C, E> {}
unsafe impl<K: Send + Sync, V: Send + Sync, C: Sync, E: Sync> Sync for SkipList<K, V, C, E> {}

impl<K, V, C, E> SkipList<K, V, C, E> {
    /// A node counts as "tail or null" when it is null or the tail sentinel.
    /// Sentinels are recognized by identity, never by key comparison: they
    /// have no key to compare.
    fn is_tail_or_null(&self, node: *mut Node<K, V>) -> bool {
        node.is_null() || node == self.tail
    }
}

impl<K, V> SkipList<K, V>
where
    K: Ord + MemSize,
    V: PartialEq + Clone + MemSize,
{
    /// Creates an empty index ordered by `K: Ord`, comparing values with
    /// `V: PartialEq`.
    pub fn new(unique_keys: bool) -> Self {
        Self::with_comparators(unique_keys, OrdComparator, DirectEquality)
    }
}

impl<K, V> Default for SkipList<K, V>
where
    K: Ord + MemSize,
    V: PartialEq + Clone + MemSize,
{
    fn default() -> Self {
        Self::new(false)
    }
}

impl<K, V, C, E> SkipList<K, V, C, E>
where
    K: MemSize,
    V: Clone + MemSize,
    C: KeyComparator<K>,
    E: ValueEquality<V>,
{
    /// Creates an empty index with caller-supplied ordering and equality.
    pub fn with_comparators(unique_keys: bool, key_cmp: C, value_eq: E) -> Self {
        let head = Node::sentinel();
        let tail = Node::sentinel();
        // Every level of head starts out pointing at tail; tail's pointers are
        // never written and stay null.
        for i in 0..=MAX_LEVEL {
            // SAFETY: `head` was just allocated and is exclusively ours.
            unsafe { (*head).forward[i].store(tail, Ordering::Relaxed) };
        }
        SkipList {
            head,
            tail,
            cur_level: CachePadded::new(AtomicUsize::new(0)),
            len: CachePadded::new(AtomicUsize::new(0)),
            unique_keys,
            key_cmp,
            value_eq,
            epoch: EpochManager::new(),
        }
    }

    /// Returns the approximate number of live entries.
    ///
    /// Approximate because it may not reflect in-flight insertions or
    /// removals.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Returns `true` if the index contains no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `(key, value)`. Returns `true` on insertion, `false` when a
    /// conflicting live entry already exists: same key under `unique_keys`,
    /// same `(key, value)` pair otherwise.
    pub fn insert(&self, key: K, value: V) -> bool {
        let _guard = self.epoch.join();
        ::metrics::counter!(OPERATIONS_TOTAL, LABEL_OPERATION_TYPE => "insert").increment(1);

        if !self.can_insert(&key, &value) {
            return false;
        }
        let level = self.random_level();
        self.cur_level.fetch_max(level, Ordering::Relaxed);
        self.insert_node(key, value, level)
    }

    /// Removes the live entry matching `(key, value)` exactly. Returns `false`
    /// when no such entry exists or another thread tombstoned it first.
    pub fn delete(&self, key: &K, value: &V) -> bool {
        let _guard = self.epoch.join();
        ::metrics::counter!(OPERATIONS_TOTAL, LABEL_OPERATION_TYPE => "delete").increment(1);

        let node = self.find_entry(key, value);
        if node.is_null() {
            return false;
        }
        // Whoever flips the tombstone owns the physical unlink; losers report
        // the entry as already gone.
        // SAFETY: `node` was observed under our epoch guard.
        if unsafe {
            (*node)
                .deleted
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        }
        .is_err()
        {
            return false;
        }

        // SAFETY: the node's height is immutable after allocation.
        let top = unsafe { (*node).level };
        let mut update = [self.head; LEVELS];
        for i in (0..=top).rev() {
            loop {
                let search_top = self.cur_level.load(Ordering::Relaxed).max(top);
                self.find_entry_predecessors(key, value, &mut update, search_top);
                // Reload the successor each attempt: a racing inserter may
                // still be splicing behind this node.
                // SAFETY: nodes in `update` and `node` itself are protected by
                // our epoch guard.
                let succ = unsafe { (*node).forward[i].load(Ordering::Acquire) };
                if unsafe {
                    (*update[i]).forward[i].compare_exchange(
                        node,
                        succ,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                }
                .is_ok()
                {
                    break;
                }
            }
        }

        // SAFETY: unlinked from every level, so unreachable from head, and we
        // hold an epoch guard as `retire` requires.
        let bytes = unsafe { (*node).footprint() };
        unsafe { self.epoch.retire(node, bytes) };
        self.reset_cur_level();
        self.len.fetch_sub(1, Ordering::Relaxed);
        true
    }

    /// Appends to `result` every live value stored under `key`, in the order
    /// the entries were spliced at the base level (insertion order).
    pub fn get_value(&self, key: &K, result: &mut Vec<V>) {
        let _guard = self.epoch.join();
        ::metrics::counter!(OPERATIONS_TOTAL, LABEL_OPERATION_TYPE => "get_value").increment(1);
        self.collect_values(key, result);
    }

    /// Inserts `(key, value)` unless an existing live value under `key`
    /// satisfies `predicate`, in which case `predicate_satisfied` is set and
    /// nothing is inserted.
    ///
    /// The predicate scan and the insertion are separate steps: a concurrent
    /// inserter may establish a satisfying value in between, so the check is
    /// best-effort.
    pub fn conditional_insert(
        &self,
        key: K,
        value: V,
        predicate: impl Fn(&V) -> bool,
        predicate_satisfied: &mut bool,
    ) -> bool {
        let _guard = self.epoch.join();
        ::metrics::counter!(OPERATIONS_TOTAL, LABEL_OPERATION_TYPE => "conditional_insert")
            .increment(1);

        let mut existing = Vec::new();
        self.collect_values(&key, &mut existing);
        *predicate_satisfied = existing.iter().any(|candidate| predicate(candidate));
        if *predicate_satisfied {
            return false;
        }

        if !self.can_insert(&key, &value) {
            return false;
        }
        let level = self.random_level();
        self.cur_level.fetch_max(level, Ordering::Relaxed);
        self.insert_node(key, value, level)
    }

    /// Returns a forward iterator positioned at the first live entry.
    pub fn iter(&self) -> Iter<'_, K, V, C, E> {
        let guard = self.epoch.join();
        ::metrics::counter!(OPERATIONS_TOTAL, LABEL_OPERATION_TYPE => "scan").increment(1);
        // SAFETY: `head` lives as long as `self`.
        let cursor = unsafe { (*self.head).forward[0].load(Ordering::Acquire) };
        Iter::positioned(self, cursor, guard)
    }

    /// Returns a forward iterator positioned at the first live entry with key
    /// `>= start_key`, possibly already at the end.
    pub fn iter_from(&self, start_key: &K) -> Iter<'_, K, V, C, E> {
        let guard = self.epoch.join();
        ::metrics::counter!(OPERATIONS_TOTAL, LABEL_OPERATION_TYPE => "scan").increment(1);
        let cursor = self.seek(start_key);
        Iter::positioned(self, cursor, guard)
    }

    /// Advances the reclamation epoch and frees every retired node no active
    /// reader can still observe. Returns the number of nodes freed.
    ///
    /// The index never runs this itself; call it from a periodic maintenance
    /// task.
    pub fn perform_garbage_collection(&self) -> usize {
        self.epoch.collect()
    }

    /// Returns `true` when retired nodes are waiting to be reclaimed.
    pub fn need_garbage_collection(&self) -> bool {
        self.epoch.need_collection()
    }

    /// Estimated bytes held by the index: live nodes plus retired ones not yet
    /// reclaimed.
    pub fn memory_footprint(&self) -> usize {
        self.epoch.memory_footprint()
    }

    // --- comparator helpers ---

    fn key_less(&self, a: &K, b: &K) -> bool {
        self.key_cmp.less(a, b)
    }

    fn key_equal(&self, a: &K, b: &K) -> bool {
        self.key_cmp.equal(a, b)
    }

    fn key_greater_equal(&self, a: &K, b: &K) -> bool {
        !self.key_cmp.less(a, b)
    }

    fn value_equal(&self, a: &V, b: &V) -> bool {
        self.value_eq.equal(a, b)
    }

    fn entry_equal(&self, k: &K, v: &V, key: &K, value: &V) -> bool {
        self.key_equal(k, key) && self.value_equal(v, value)
    }

    // --- search ---

    /// Generates a level in `[1, MAX_LEVEL]`, geometric with mean height 2.
    /// `fastrand` keeps the generator state thread-local.
    fn random_level(&self) -> usize {
        let mut level = 1;
        while fastrand::f64() < P && level < MAX_LEVEL {
            level += 1;
        }
        level
    }

    /// Fills `update` with, per level from `top` down to 0, the rightmost node
    /// whose key is `<= key`. A tombstoned position is a poor CAS target, so
    /// the slot falls back to the node walked through just before it. Slots
    /// above `top` keep their caller-provided value (`head` on first use).
    fn find_predecessors(&self, key: &K, update: &mut [*mut Node<K, V>; LEVELS], top: usize) {
        let mut prev = self.head;
        let mut current = self.head;
        for i in (0..=top).rev() {
            loop {
                // SAFETY: `current` is head or a node reached through the
                // chains while our epoch guard is held.
                let next = unsafe { (*current).forward[i].load(Ordering::Acquire) };
                if self.is_tail_or_null(next) {
                    break;
                }
                // SAFETY: `next` is interior (not head by construction, not
                // tail per the check above), so it has an entry.
                let next_key = unsafe { (*next).key() };
                if self.key_greater_equal(key, next_key) {
                    prev = current;
                    current = next;
                } else {
                    break;
                }
            }
            // SAFETY: `current` is protected as above; head is never deleted.
            update[i] = if unsafe { (*current).deleted.load(Ordering::Acquire) } {
                prev
            } else {
                current
            };
        }
    }

    /// Like [`find_predecessors`](Self::find_predecessors), but stops short of
    /// an exact `(key, value)` match so that the slots hold that node's true
    /// predecessors at every level. Used by the unlink path.
    fn find_entry_predecessors(
        &self,
        key: &K,
        value: &V,
        update: &mut [*mut Node<K, V>; LEVELS],
        top: usize,
    ) {
        let mut prev = self.head;
        let mut current = self.head;
        for i in (0..=top).rev() {
            loop {
                // SAFETY: as in `find_predecessors`.
                let next = unsafe { (*current).forward[i].load(Ordering::Acquire) };
                if self.is_tail_or_null(next) {
                    break;
                }
                // SAFETY: `next` is interior, so it has an entry.
                let (next_key, next_value) = unsafe { ((*next).key(), (*next).value()) };
                if !self.key_greater_equal(key, next_key) {
                    break;
                }
                if self.entry_equal(next_key, next_value, key, value) {
                    break;
                }
                prev = current;
                current = next;
            }
            // SAFETY: as in `find_predecessors`.
            update[i] = if unsafe { (*current).deleted.load(Ordering::Acquire) } {
                prev
            } else {
                current
            };
        }
    }

    /// Positions for point lookups and iterators: returns the first base-level
    /// node with key `>= key`. Never returns head; may return tail.
    fn seek(&self, key: &K) -> *mut Node<K, V> {
        let mut current = self.head;
        let top = self.cur_level.load(Ordering::Relaxed);
        for i in (0..=top).rev() {
            loop {
                // SAFETY: `current` is protected by the caller's epoch guard.
                let next = unsafe { (*current).forward[i].load(Ordering::Acquire) };
                if self.is_tail_or_null(next) {
                    break;
                }
                // SAFETY: `next` is interior, so it has an entry.
                if self.key_less(unsafe { (*next).key() }, key) {
                    current = next;
                } else {
                    break;
                }
            }
        }
        // `current` is the rightmost node strictly below `key` (possibly
        // head); its base successor is the first candidate at or past it.
        // SAFETY: as above.
        unsafe { (*current).forward[0].load(Ordering::Acquire) }
    }

    /// Returns the live node matching `(key, value)` exactly, or null.
    fn find_entry(&self, key: &K, value: &V) -> *mut Node<K, V> {
        let mut cursor = self.seek(key);
        while !self.is_tail_or_null(cursor) {
            // SAFETY: `cursor` is interior and epoch-protected.
            let node = unsafe { &*cursor };
            if !self.key_equal(unsafe { node.key() }, key) {
                break;
            }
            if !node.deleted.load(Ordering::Acquire)
                && self.value_equal(unsafe { node.value() }, value)
            {
                return cursor;
            }
            cursor = node.forward[0].load(Ordering::Acquire);
        }
        ptr::null_mut()
    }

    /// Admission check: under `unique_keys` any live node with the key blocks
    /// insertion; otherwise only a live exact pair does.
    fn can_insert(&self, key: &K, value: &V) -> bool {
        if self.unique_keys {
            let mut cursor = self.seek(key);
            while !self.is_tail_or_null(cursor) {
                // SAFETY: `cursor` is interior and epoch-protected.
                let node = unsafe { &*cursor };
                if !self.key_equal(unsafe { node.key() }, key) {
                    break;
                }
                if !node.deleted.load(Ordering::Acquire) {
                    return false;
                }
                cursor = node.forward[0].load(Ordering::Acquire);
            }
            true
        } else {
            self.find_entry(key, value).is_null()
        }
    }

    /// Base-level walk appending live values for `key`. Caller holds a guard.
    fn collect_values(&self, key: &K, result: &mut Vec<V>) {
        let mut cursor = self.seek(key);
        while !self.is_tail_or_null(cursor) {
            // SAFETY: `cursor` is interior and epoch-protected.
            let node = unsafe { &*cursor };
            if !self.key_equal(unsafe { node.key() }, key) {
                break;
            }
            if !node.deleted.load(Ordering::Acquire) {
                result.push(unsafe { node.value() }.clone());
            }
            cursor = node.forward[0].load(Ordering::Acquire);
        }
    }

    // --- splicing ---

    /// Allocates a node of the given height and splices it in bottom-up.
    /// Returns `false` (freeing the unpublished node) when admission fails at
    /// the base level.
    fn insert_node(&self, key: K, value: V, level: usize) -> bool {
        let node = Node::alloc(key, value, level);
        let mut update = [self.head; LEVELS];

        // Base level: commit or give up. Contention rebuilds the vector and
        // retries; only a genuine duplicate aborts.
        loop {
            let search_top = self.cur_level.load(Ordering::Relaxed).max(level);
            // SAFETY: until the base-level CAS succeeds, `node` is owned by
            // this call; its entry is immutable either way.
            let key = unsafe { (*node).key() };
            self.find_predecessors(key, &mut update, search_top);
            match self.splice(node, &update, 0) {
                SpliceOutcome::Duplicate => {
                    // Never published, so this call still owns the allocation.
                    drop(unsafe { Box::from_raw(node) });
                    return false;
                }
                SpliceOutcome::Ok => break,
                SpliceOutcome::PredecessorTombstoned | SpliceOutcome::PredecessorMoved => continue,
            }
        }

        // Upper levels: committed already, so only contention remains; retry
        // each level until its CAS lands.
        let mut i = 1;
        while i <= level {
            match self.splice(node, &update, i) {
                SpliceOutcome::Ok => i += 1,
                _ => {
                    let search_top = self.cur_level.load(Ordering::Relaxed).max(level);
                    // SAFETY: the entry is immutable; the node stays valid
                    // under our epoch guard.
                    let key = unsafe { (*node).key() };
                    self.find_predecessors(key, &mut update, search_top);
                }
            }
        }

        // SAFETY: published nodes stay valid under our epoch guard.
        self.epoch.record_allocation(unsafe { (*node).footprint() });
        self.len.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// One single-level splice attempt of `node` after `update[i]`.
    fn splice(
        &self,
        node: *mut Node<K, V>,
        update: &[*mut Node<K, V>; LEVELS],
        i: usize,
    ) -> SpliceOutcome {
        let pred = update[i];
        // SAFETY: vector slots are head or nodes observed under the caller's
        // epoch guard; every slot at index `i` participates in level `i`.
        let succ = unsafe { (*pred).forward[i].load(Ordering::Acquire) };

        // The vector may be stale: a smaller-keyed entry can have landed after
        // `pred` since the search. Splicing ahead of it would break the
        // level's ordering, so treat it as a moved predecessor.
        if !self.is_tail_or_null(succ) {
            // SAFETY: `succ` is interior; `node` is unpublished at this level.
            let (succ_key, node_key) = unsafe { ((*succ).key(), (*node).key()) };
            if self.key_less(succ_key, node_key) {
                return SpliceOutcome::PredecessorMoved;
            }
        }

        if i == 0 {
            // Admission is decided here, at the commit level: another inserter
            // may have admitted a conflicting entry since the caller's check.
            // SAFETY: `node` is unpublished and its entry immutable.
            let (key, value) = unsafe { ((*node).key(), (*node).value()) };
            if !self.can_insert(key, value) {
                return SpliceOutcome::Duplicate;
            }
        }
        // SAFETY: as above.
        if unsafe { (*pred).deleted.load(Ordering::Acquire) } {
            return SpliceOutcome::PredecessorTombstoned;
        }

        // The node is not reachable at this level yet, so a plain store
        // suffices; the publishing CAS below releases it.
        // SAFETY: `node` is ours at this level until the CAS lands.
        unsafe { (*node).forward[i].store(succ, Ordering::Relaxed) };
        match unsafe {
            (*pred).forward[i].compare_exchange(succ, node, Ordering::AcqRel, Ordering::Acquire)
        } {
            Ok(_) => SpliceOutcome::Ok,
            Err(_) => SpliceOutcome::PredecessorMoved,
        }
    }

    /// Recomputes the advisory top level after a deletion: the highest level
    /// where head has a non-tail successor.
    fn reset_cur_level(&self) {
        let mut level = MAX_LEVEL;
        while level > 0 {
            // SAFETY: `head` lives as long as `self`.
            let next = unsafe { (*self.head).forward[level].load(Ordering::Acquire) };
            if !self.is_tail_or_null(next) {
                break;
            }
            level -= 1;
        }
        self.cur_level.store(level, Ordering::Relaxed);
    }
}

impl<K, V, C, E> Drop for SkipList<K, V, C, E> {
    fn drop(&mut self) {
        // Exclusive access: walk the base chain and free every node including
        // both sentinels. Retired nodes are unreachable from head and are
        // freed by the epoch manager's own drop.
        let mut cursor = self.head;
        while !cursor.is_null() {
            // SAFETY: `&mut self` means no concurrent readers or writers.
            let node = unsafe { Box::from_raw(cursor) };
            cursor = node.forward[0].load(Ordering::Relaxed);
        }
    }
}

/// A forward cursor over the base level of a [`SkipList`].
///
/// The iterator pins a reclamation epoch for its whole lifetime, so every node
/// it can reach stays allocated until it is dropped. It provides **no
/// snapshot**: entries inserted or deleted concurrently with iteration may or
/// may not be observed, and a logically deleted entry may still be yielded.
pub struct Iter<'a, K, V, C = OrdComparator, E = DirectEquality> {
    list: &'a SkipList<K, V, C, E>,
    cursor: *mut Node<K, V>,
    _guard: EpochGuard<'a, Node<K, V>>,
}

impl<'a, K, V, C, E> Iter<'a, K, V, C, E> {
    fn positioned(
        list: &'a SkipList<K, V, C, E>,
        mut cursor: *mut Node<K, V>,
        guard: EpochGuard<'a, Node<K, V>>,
    ) -> Self {
        // Initial positioning lands on a live entry (or the end); tombstones
        // encountered later during traversal are the caller's to tolerate.
        // SAFETY: `cursor` and its successors are pinned by `guard`.
        while !list.is_tail_or_null(cursor)
            && unsafe { (*cursor).deleted.load(Ordering::Acquire) }
        {
            cursor = unsafe { (*cursor).forward[0].load(Ordering::Acquire) };
        }
        Iter {
            list,
            cursor,
            _guard: guard,
        }
    }

    /// `true` once the cursor has reached the tail sentinel.
    pub fn is_end(&self) -> bool {
        self.list.is_tail_or_null(self.cursor)
    }

    /// The entry under the cursor, or `None` at the end.
    pub fn entry(&self) -> Option<(&K, &V)> {
        if self.is_end() {
            return None;
        }
        // SAFETY: a non-end cursor is interior and pinned by our guard.
        let node = unsafe { &*self.cursor };
        node.entry.as_ref().map(|(key, value)| (key, value))
    }

    /// Moves the cursor one entry forward; a no-op at the end.
    pub fn advance(&mut self) {
        if self.is_end() {
            return;
        }
        // SAFETY: a non-end cursor is interior and pinned by our guard.
        self.cursor = unsafe { (*self.cursor).forward[0].load(Ordering::Acquire) };
    }
}

impl<K, V, C, E> Iterator for Iter<'_, K, V, C, E>
where
    K: Clone,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        let item = self
            .entry()
            .map(|(key, value)| (key.clone(), value.clone()))?;
        self.advance();
        Some(item)
    }
}

impl<K, V, C, E> PartialEq for Iter<'_, K, V, C, E>
where
    C: KeyComparator<K>,
{
    fn eq(&self, other: &Self) -> bool {
        match (self.entry(), other.entry()) {
            // Two end iterators are equal to each other.
            (None, None) => true,
            (Some((a, _)), Some((b, _))) => self.list.key_cmp.equal(a, b),
            _ => false,
        }
    }
}

impl<K, V, C, E> PartialOrd for Iter<'_, K, V, C, E>
where
    C: KeyComparator<K>,
{
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match (self.entry(), other.entry()) {
            (None, None) => Some(Equal),
            // An end iterator sorts after every non-end iterator.
            (None, Some(_)) => Some(Greater),
            (Some(_), None) => Some(Less),
            (Some((a, _)), Some((b, _))) => {
                if self.list.key_cmp.less(a, b) {
                    Some(Less)
                } else if self.list.key_cmp.equal(a, b) {
                    Some(Equal)
                } else {
                    Some(Greater)
                }
            }
        }
    }
}
