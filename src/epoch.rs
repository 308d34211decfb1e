//! Epoch-based safe memory reclamation for retired index nodes.
//!
//! Readers and writers join the current epoch before touching shared nodes and
//! leave it when done. Nodes unlinked from the index are *retired* into the
//! current epoch's garbage list rather than freed. A collection cycle opens a
//! fresh epoch and then walks the epoch list from the oldest end, freeing the
//! garbage of every epoch that has fully drained of readers. Because epochs
//! drain strictly in order, a reader active in epoch `E` holds back the
//! reclamation of everything retired in `E` or later, which is exactly the
//! set of nodes it could still be holding a reference to.
//!
//! The manager never spawns threads. [`EpochManager::collect`] is driven by an
//! external caller, typically a periodic maintenance task, and is serialized
//! internally so concurrent callers cannot corrupt the epoch list.

use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicIsize, AtomicPtr, AtomicUsize, Ordering};
use std::sync::Mutex;

use log::debug;
use metrics::{counter, gauge};

use crate::metrics::{
    GC_CYCLES_TOTAL, GC_RECLAIMED_BYTES_TOTAL, GC_RECLAIMED_NODES_TOTAL, MEMORY_USAGE_BYTES,
};

/// Added to an epoch's reader count when the collector seals it. A joiner that
/// observes a negative count backs out and retries on the new current epoch.
const SEALED: isize = isize::MIN / 2;

/// One interval of the reclamation clock.
///
/// `active_threads` counts readers currently inside the epoch. `garbage` heads
/// an intrusive list of cells, each owning one retired record. `next` links to
/// the following (younger) epoch; it is written only by the collector.
struct EpochRecord<T> {
    active_threads: AtomicIsize,
    garbage: AtomicPtr<GarbageCell<T>>,
    next: AtomicPtr<EpochRecord<T>>,
}

impl<T> EpochRecord<T> {
    fn alloc() -> *mut Self {
        Box::into_raw(Box::new(EpochRecord {
            active_threads: AtomicIsize::new(0),
            garbage: AtomicPtr::new(ptr::null_mut()),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// An intrusive garbage-list cell owning one retired record of `T`.
struct GarbageCell<T> {
    item: *mut T,
    bytes: usize,
    next: *mut GarbageCell<T>,
}

/// Deferred reclamation of records of type `T`.
///
/// The index instantiates this with its node type; the manager is the sole
/// freeing authority for retired records.
pub struct EpochManager<T> {
    /// Oldest epoch that still holds unreclaimed garbage. Advanced only by the
    /// collector.
    head_epoch: AtomicPtr<EpochRecord<T>>,
    /// Epoch that joiners enter and retirers push garbage onto. Advanced only
    /// by the collector.
    current_epoch: AtomicPtr<EpochRecord<T>>,
    live_bytes: AtomicUsize,
    retired_bytes: AtomicUsize,
    /// Serializes collection: the epoch-list splice fields are single-writer.
    gc_lock: Mutex<()>,
    _owns: PhantomData<T>,
}

// SAFETY: the manager shares raw epoch pointers across threads, but every
// cross-thread field is atomic and retired `T`s are only dropped by whichever
// single thread runs a collection cycle, so `T: Send` suffices.
unsafe impl<T: Send> Send for EpochManager<T> {}
unsafe impl<T: Send> Sync for EpochManager<T> {}

impl<T> EpochManager<T> {
    pub fn new() -> Self {
        let initial = EpochRecord::alloc();
        EpochManager {
            head_epoch: AtomicPtr::new(initial),
            current_epoch: AtomicPtr::new(initial),
            live_bytes: AtomicUsize::new(0),
            retired_bytes: AtomicUsize::new(0),
            gc_lock: Mutex::new(()),
            _owns: PhantomData,
        }
    }

    /// Enters the current epoch. While the returned guard lives, nothing
    /// retired in this epoch or any later one can be freed.
    pub fn join(&self) -> EpochGuard<'_, T> {
        loop {
            let epoch = self.current_epoch.load(Ordering::SeqCst);
            // SAFETY: an epoch record is freed only after the collector seals
            // it, and sealing requires the record to have stopped being
            // `current_epoch` at least one collection cycle earlier.
            let previous = unsafe { (*epoch).active_threads.fetch_add(1, Ordering::SeqCst) };
            if previous < 0 {
                // The collector sealed this epoch between our load and the
                // increment; undo and retry on the new current epoch.
                unsafe { (*epoch).active_threads.fetch_sub(1, Ordering::SeqCst) };
                continue;
            }
            return EpochGuard {
                epoch,
                _manager: PhantomData,
            };
        }
    }

    /// Records `bytes` of freshly allocated live data.
    pub fn record_allocation(&self, bytes: usize) {
        self.live_bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Hands a record to the manager for deferred destruction.
    ///
    /// # Safety
    ///
    /// - `item` must point to a valid, uniquely owned `Box<T>` allocation that
    ///   is no longer reachable from the shared structure.
    /// - The calling thread must hold an [`EpochGuard`]; the guard is what
    ///   keeps the push target from being drained out from under the push.
    /// - `bytes` must match what was passed to [`record_allocation`] for this
    ///   record.
    ///
    /// [`record_allocation`]: EpochManager::record_allocation
    pub unsafe fn retire(&self, item: *mut T, bytes: usize) {
        let cell = Box::into_raw(Box::new(GarbageCell {
            item,
            bytes,
            next: ptr::null_mut(),
        }));
        let epoch = self.current_epoch.load(Ordering::SeqCst);
        // SAFETY: the caller's guard pins an epoch no younger than `epoch`, so
        // the collector cannot seal `epoch` while this push is in flight.
        let list = unsafe { &(*epoch).garbage };
        loop {
            let head = list.load(Ordering::SeqCst);
            // SAFETY: `cell` is owned by this call until the CAS publishes it.
            unsafe { (*cell).next = head };
            if list
                .compare_exchange(head, cell, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }
        self.live_bytes.fetch_sub(bytes, Ordering::SeqCst);
        self.retired_bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Runs one collection cycle: opens a fresh epoch, then frees the garbage
    /// of every drained epoch older than it. Returns the number of records
    /// reclaimed.
    ///
    /// Cheap when there is nothing to do; callers poll it on a timer or after
    /// bursts of deletions.
    pub fn collect(&self) -> usize {
        let _gc = self
            .gc_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        self.advance_epoch();
        let (epochs, records, bytes) = self.clear_drained();

        counter!(GC_CYCLES_TOTAL).increment(1);
        if records > 0 {
            counter!(GC_RECLAIMED_NODES_TOTAL).increment(records as u64);
            counter!(GC_RECLAIMED_BYTES_TOTAL).increment(bytes as u64);
            debug!(
                "epoch collection reclaimed {records} records ({bytes} bytes) across {epochs} epochs"
            );
        }
        gauge!(MEMORY_USAGE_BYTES).set(self.memory_footprint() as f64);

        records
    }

    /// Returns `true` when retired records are waiting to be reclaimed.
    pub fn need_collection(&self) -> bool {
        self.retired_bytes.load(Ordering::SeqCst) > 0
    }

    /// Estimated bytes held by the structure: live records plus retired ones
    /// not yet reclaimed.
    pub fn memory_footprint(&self) -> usize {
        self.live_bytes.load(Ordering::SeqCst) + self.retired_bytes.load(Ordering::SeqCst)
    }

    /// Appends a fresh epoch after the current one and advances
    /// `current_epoch`. Caller must hold `gc_lock`.
    fn advance_epoch(&self) {
        let fresh = EpochRecord::alloc();
        let current = self.current_epoch.load(Ordering::SeqCst);
        // SAFETY: `current` cannot be freed here; the collector is the only
        // freeing party and it is us, serialized by `gc_lock`.
        unsafe { (*current).next.store(fresh, Ordering::SeqCst) };
        self.current_epoch.store(fresh, Ordering::SeqCst);
    }

    /// Frees every epoch between `head_epoch` and `current_epoch` whose reader
    /// count has drained to zero, stopping at the first that has not. Caller
    /// must hold `gc_lock`. Returns (epochs, records, bytes) reclaimed.
    fn clear_drained(&self) -> (usize, usize, usize) {
        let mut epochs = 0;
        let mut records = 0;
        let mut bytes = 0;

        loop {
            let head = self.head_epoch.load(Ordering::SeqCst);
            if head == self.current_epoch.load(Ordering::SeqCst) {
                break;
            }
            // Seal the drained epoch: a racing joiner that already loaded this
            // record sees the negative count and backs out.
            let sealed = unsafe {
                // SAFETY: `head` is owned by the epoch list until we unlink it
                // below; only this (serialized) collector frees records.
                (*head)
                    .active_threads
                    .compare_exchange(0, SEALED, Ordering::SeqCst, Ordering::SeqCst)
            };
            if sealed.is_err() {
                // Readers are still inside. Epochs drain in order, so nothing
                // younger can be reclaimed either.
                break;
            }

            // SAFETY: the epoch is sealed and is not `current_epoch`, so no
            // further garbage can be pushed: any retirer still holding a guard
            // on this epoch would have kept its count nonzero.
            let mut cell = unsafe { (*head).garbage.load(Ordering::SeqCst) };
            while !cell.is_null() {
                // SAFETY: cells and their items are exclusively ours now; each
                // item has been unreachable since it was retired, and every
                // reader that could have observed it has left.
                let garbage = unsafe { Box::from_raw(cell) };
                drop(unsafe { Box::from_raw(garbage.item) });
                self.retired_bytes.fetch_sub(garbage.bytes, Ordering::SeqCst);
                records += 1;
                bytes += garbage.bytes;
                cell = garbage.next;
            }

            // SAFETY: `head != current_epoch`, so `next` was set when the list
            // grew past this record.
            let next = unsafe { (*head).next.load(Ordering::SeqCst) };
            self.head_epoch.store(next, Ordering::SeqCst);
            // SAFETY: sealed, unlinked, garbage drained; the record is ours.
            drop(unsafe { Box::from_raw(head) });
            epochs += 1;
        }

        (epochs, records, bytes)
    }
}

impl<T> Default for EpochManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for EpochManager<T> {
    fn drop(&mut self) {
        // Exclusive access: free every remaining epoch record and all garbage.
        let mut record = *self.head_epoch.get_mut();
        while !record.is_null() {
            // SAFETY: `&mut self` means no readers or collectors remain.
            let epoch = unsafe { Box::from_raw(record) };
            let mut cell = epoch.garbage.load(Ordering::Relaxed);
            while !cell.is_null() {
                // SAFETY: as above; retired items are uniquely owned here.
                let garbage = unsafe { Box::from_raw(cell) };
                drop(unsafe { Box::from_raw(garbage.item) });
                cell = garbage.next;
            }
            record = epoch.next.load(Ordering::Relaxed);
        }
    }
}

/// Keeps the epoch joined at construction pinned until dropped.
pub struct EpochGuard<'a, T> {
    epoch: *mut EpochRecord<T>,
    _manager: PhantomData<&'a EpochManager<T>>,
}

impl<T> Drop for EpochGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: the record cannot have been freed: our increment kept its
        // count positive, which blocks sealing.
        unsafe { (*self.epoch).active_threads.fetch_sub(1, Ordering::SeqCst) };
    }
}
