//! Privatized-Object Registry
//!
//! The registry maps a dense integer pid to an opaque object pointer.
//! Reads (`get`, `clear`, and the fast path of `publish`) are wait-free:
//! they publish the current instance index into the calling thread's roster
//! node, revalidate the index, and then touch slot memory directly. Writes
//! that must grow the block table serialize on a mutex, rebuild the inactive
//! instance, publish it with one atomic index swap, and wait for every
//! reader still advertising the old index before freeing the old block
//! vector.
//!
//! Blocks themselves are shared between generations: a grow copies block
//! pointers, not block contents, so a reader holding the old vector and a
//! publisher writing through the new one address the same slot memory.

use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::alloc::{alloc_zeroed_array, free_array, MemKind};
use crate::config::RegistryConfig;
use crate::instance::{BlockPtr, InstancePair, Slot};
use crate::log::{self, Level, Value};
use crate::tls::{Roster, TlsNode, STATUS_IDLE};

/// Number of object-pointer slots per block.
///
/// Compile-time constant: the pid decomposition `pid / BLOCK_SIZE`,
/// `pid % BLOCK_SIZE` must never change after a registry exists.
pub const BLOCK_SIZE: usize = 1024;

const LOG_TARGET: &str = "priv_registry";

/// Monotonic counters describing a registry's write-side activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Completed grow cycles.
    pub grows: u64,
    /// Thread yields spent waiting for reader quiescence across all grows.
    pub quiescence_yields: u64,
}

/// A concurrent pid-to-pointer table with wait-free reads and grow-by-swap
/// writes.
///
/// The registry never dereferences stored pointers and never frees their
/// referents; `clear` overwrites with null and nothing more.
pub struct Registry {
    pair: InstancePair,
    roster: Roster,
    grow_lock: Mutex<()>,
    spin_before_yield: u32,
    grows: AtomicU64,
    quiescence_yields: AtomicU64,
}

fn split_pid(pid: i64) -> (usize, usize) {
    debug_assert!(pid >= 0, "negative pid {} passed to registry", pid);
    let pid = pid as usize;
    (pid / BLOCK_SIZE, pid % BLOCK_SIZE)
}

fn block_create() -> BlockPtr {
    alloc_zeroed_array::<Slot>(BLOCK_SIZE, MemKind::BlockStorage)
}

impl Registry {
    /// Build a registry with the given configuration. Instance 0 starts
    /// with a single zeroed block; instance 1 stays `(null, 0)` until the
    /// first grow populates it.
    pub fn new(config: &RegistryConfig) -> Self {
        let registry = Self {
            pair: InstancePair::new(),
            roster: Roster::new(),
            grow_lock: Mutex::new(()),
            spin_before_yield: config.spin_before_yield,
            grows: AtomicU64::new(0),
            quiescence_yields: AtomicU64::new(0),
        };
        let blocks: *mut BlockPtr = alloc_zeroed_array(1, MemKind::BlockVector);
        unsafe { *blocks = block_create() };
        registry.pair.get(0).install(blocks, 1);
        registry
    }

    /// Build a registry with the default configuration.
    pub fn with_defaults() -> Self {
        Self::new(&RegistryConfig::default())
    }

    /// Enter a read critical section: publish the instance index being read
    /// into this thread's roster node, then revalidate.
    ///
    /// The loop closes the window between loading the index and advertising
    /// it. If a writer swaps in between, the revalidation either retries or
    /// leaves `status` naming an index the writer's quiescence scan refuses
    /// to free. Read critical sections must not nest on one thread; every
    /// caller in this module pairs acquire and release locally.
    fn acquire_read(&self) -> (usize, &TlsNode) {
        let node = self.roster.ensure_local();
        loop {
            let idx = self.pair.current_idx();
            node.set_status(idx as i8);
            if self.pair.current_idx_seq() == idx {
                return (idx, node);
            }
        }
    }

    fn release_read(node: &TlsNode) {
        node.set_status(STATUS_IDLE);
    }

    /// Store `ptr` at slot `pid`, growing the block table as needed.
    ///
    /// Pids arrive non-monotonically: a publish of pid 27 may precede a
    /// publish of pid 2, so a single call may have to grow by many blocks
    /// at once. Concurrent publishes of the same pid are last-store-wins.
    pub fn publish(&self, ptr: *mut c_void, pid: i64) {
        let (block_idx, slot_idx) = split_pid(pid);
        loop {
            let (idx, node) = self.acquire_read();
            let (blocks, len) = self.pair.get(idx).load();
            if block_idx < len {
                // Safety: `block_idx < len` and the status protocol keeps
                // this instance's vector and blocks alive for the duration
                // of the critical section.
                unsafe {
                    (*(*blocks.add(block_idx)).add(slot_idx)).store(ptr, Ordering::Relaxed);
                }
                Self::release_read(node);
                return;
            }
            // Target block not allocated yet: upgrade to the write path and
            // retry. The grow is idempotent under races.
            Self::release_read(node);
            self.grow(block_idx + 1);
        }
    }

    /// Current slot value for `pid`, null if never published or cleared.
    pub fn get(&self, pid: i64) -> *mut c_void {
        let (block_idx, slot_idx) = split_pid(pid);
        let (idx, node) = self.acquire_read();
        let (blocks, len) = self.pair.get(idx).load();
        let value = if block_idx < len {
            // Safety: as in `publish`.
            unsafe { (*(*blocks.add(block_idx)).add(slot_idx)).load(Ordering::Relaxed) }
        } else {
            ptr::null_mut()
        };
        Self::release_read(node);
        value
    }

    /// Overwrite slot `pid` with null. The referent is not reclaimed. A
    /// pid beyond the current capacity is a no-op.
    pub fn clear(&self, pid: i64) {
        let (block_idx, slot_idx) = split_pid(pid);
        let (idx, node) = self.acquire_read();
        let (blocks, len) = self.pair.get(idx).load();
        if block_idx < len {
            // Safety: as in `publish`.
            unsafe {
                (*(*blocks.add(block_idx)).add(slot_idx)).store(ptr::null_mut(), Ordering::Relaxed);
            }
        }
        Self::release_read(node);
    }

    /// Upper bound on the pid space currently backed by storage. Monotone
    /// over the registry's lifetime; used for leak accounting.
    pub fn capacity(&self) -> i64 {
        let (idx, node) = self.acquire_read();
        let (_, len) = self.pair.get(idx).load();
        Self::release_read(node);
        (len * BLOCK_SIZE) as i64
    }

    /// Snapshot of the write-side counters.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            grows: self.grows.load(Ordering::Relaxed),
            quiescence_yields: self.quiescence_yields.load(Ordering::Relaxed),
        }
    }

    /// Grow the block table to at least `min_len` blocks.
    ///
    /// Writers serialize on the grow lock. The new generation is assembled
    /// in the inactive instance slot (sharing every existing block, plus
    /// fresh zeroed blocks for the suffix), published by the index swap, and
    /// the old generation's block vector is freed only after every roster
    /// node has moved off the old index.
    fn grow(&self, min_len: usize) {
        let _guard = self.grow_lock.lock();

        let old_idx = self.pair.current_idx();
        let old = self.pair.get(old_idx);
        let (old_blocks, old_len) = old.load();
        if min_len <= old_len {
            // Another writer grew past the requested length while this one
            // was blocked on the lock.
            return;
        }

        let start = Instant::now();
        let new_idx = 1 - old_idx;
        let new_blocks: *mut BlockPtr = alloc_zeroed_array(min_len, MemKind::BlockVector);
        // Safety: `new_blocks` has room for `min_len` block pointers and
        // `old_blocks` holds `old_len <= min_len` of them; the suffix is
        // filled before anything is published.
        unsafe {
            ptr::copy_nonoverlapping(old_blocks as *const BlockPtr, new_blocks, old_len);
            for i in old_len..min_len {
                *new_blocks.add(i) = block_create();
            }
        }
        self.pair.get(new_idx).install(new_blocks, min_len);
        // Linearization point: readers acquire the new generation from here.
        self.pair.set_current_idx(new_idx);

        self.wait_for_readers(old_idx as i8);

        // Safety: every reader has left the old generation; the vector (not
        // the shared blocks) can go.
        unsafe { free_array(old_blocks, old_len, MemKind::BlockVector) };
        // The retired slot is dead until the next grow repopulates it.
        old.install(ptr::null_mut(), 0);

        self.grows.fetch_add(1, Ordering::Relaxed);
        if log::would_log(Level::Debug) {
            log::emit(
                Level::Debug,
                LOG_TARGET,
                "grew block table",
                &[
                    ("old_len", Value::Uint(old_len as u64)),
                    ("new_len", Value::Uint(min_len as u64)),
                    ("elapsed_us", Value::Uint(start.elapsed().as_micros() as u64)),
                ],
            );
        }
    }

    /// Spin until no roster node advertises `old_idx`, yielding the thread
    /// every `spin_before_yield` iterations per node.
    fn wait_for_readers(&self, old_idx: i8) {
        let mut yields: u64 = 0;
        for node in self.roster.iter() {
            let mut spins: u32 = 0;
            while node.status() == old_idx {
                spins += 1;
                if spins >= self.spin_before_yield {
                    spins = 0;
                    yields += 1;
                    std::thread::yield_now();
                } else {
                    std::hint::spin_loop();
                }
            }
        }
        if yields > 0 {
            self.quiescence_yields.fetch_add(yields, Ordering::Relaxed);
            if log::would_log(Level::Trace) {
                log::emit(
                    Level::Trace,
                    LOG_TARGET,
                    "quiescence wait yielded",
                    &[("yields", Value::Uint(yields))],
                );
            }
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        // Exclusive ownership: no reader or writer can be in flight. The
        // current instance's vector references every block ever created
        // (grows copy all block pointers forward); the retired slot's
        // vector was already freed and reset at the end of its grow cycle.
        let idx = self.pair.current_idx();
        let (blocks, len) = self.pair.get(idx).load();
        unsafe {
            for i in 0..len {
                free_array(*blocks.add(i), BLOCK_SIZE, MemKind::BlockStorage);
            }
            free_array(blocks, len, MemKind::BlockVector);
        }
        // Roster nodes are intentionally not freed: threads that touched
        // this registry keep pointers to their nodes in thread-local
        // storage until thread exit.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(v: usize) -> *mut c_void {
        v as *mut c_void
    }

    #[test]
    fn test_publish_then_get() {
        let registry = Registry::with_defaults();
        registry.publish(tag(0xBEEF), 7);
        assert_eq!(registry.get(7), tag(0xBEEF));
    }

    #[test]
    fn test_unpublished_pid_is_null() {
        let registry = Registry::with_defaults();
        assert!(registry.get(0).is_null());
        assert!(registry.get(123).is_null());
        // Beyond current capacity too.
        assert!(registry.get(10 * BLOCK_SIZE as i64).is_null());
    }

    #[test]
    fn test_republish_same_pid_wins() {
        let registry = Registry::with_defaults();
        registry.publish(tag(1), 5);
        registry.publish(tag(2), 5);
        assert_eq!(registry.get(5), tag(2));
        registry.publish(tag(2), 5);
        assert_eq!(registry.get(5), tag(2));
    }

    #[test]
    fn test_clear_overwrites_with_null() {
        let registry = Registry::with_defaults();
        registry.publish(tag(0xA11CE), 42);
        assert_eq!(registry.get(42), tag(0xA11CE));
        registry.clear(42);
        assert!(registry.get(42).is_null());
    }

    #[test]
    fn test_clear_of_unpublished_pid_is_noop() {
        let registry = Registry::with_defaults();
        registry.clear(17);
        assert!(registry.get(17).is_null());
        // Out of range: nothing to do, nothing grown.
        registry.clear(5 * BLOCK_SIZE as i64);
        assert_eq!(registry.capacity(), BLOCK_SIZE as i64);
    }

    #[test]
    fn test_initial_capacity_is_one_block() {
        let registry = Registry::with_defaults();
        assert_eq!(registry.capacity(), BLOCK_SIZE as i64);
        assert_eq!(registry.stats().grows, 0);
    }

    #[test]
    fn test_first_block_needs_no_grow() {
        let registry = Registry::with_defaults();
        registry.publish(tag(1), 0);
        registry.publish(tag(2), BLOCK_SIZE as i64 - 1);
        assert_eq!(registry.stats().grows, 0);
        assert_eq!(registry.get(0), tag(1));
        assert_eq!(registry.get(BLOCK_SIZE as i64 - 1), tag(2));
    }

    #[test]
    fn test_publish_past_first_block_grows_once() {
        let registry = Registry::with_defaults();
        registry.publish(tag(3), BLOCK_SIZE as i64);
        assert_eq!(registry.stats().grows, 1);
        assert_eq!(registry.capacity(), 2 * BLOCK_SIZE as i64);
        // Earlier pids were not disturbed and need no further grow.
        registry.publish(tag(4), BLOCK_SIZE as i64 - 1);
        assert_eq!(registry.stats().grows, 1);
    }

    #[test]
    fn test_sparse_publish_grows_in_one_step() {
        let registry = Registry::with_defaults();
        let pid = 1_000_000i64;
        registry.publish(tag(9), pid);
        let needed = (pid as usize + 1).div_ceil(BLOCK_SIZE);
        assert_eq!(registry.capacity(), (needed * BLOCK_SIZE) as i64);
        assert_eq!(registry.stats().grows, 1);
        assert_eq!(registry.get(pid), tag(9));
    }

    #[test]
    fn test_grow_preserves_existing_entries() {
        let registry = Registry::with_defaults();
        registry.publish(tag(0xF00), 10);
        registry.publish(tag(0xBA2), 3 * BLOCK_SIZE as i64);
        assert_eq!(registry.get(10), tag(0xF00));
        assert_eq!(registry.get(3 * BLOCK_SIZE as i64), tag(0xBA2));
    }

    #[test]
    fn test_capacity_is_monotone() {
        let registry = Registry::with_defaults();
        let mut last = registry.capacity();
        for pid in [500i64, 2_000, 1_500, 40_000, 39_999] {
            registry.publish(tag(1), pid);
            let capacity = registry.capacity();
            assert!(capacity >= last);
            last = capacity;
        }
    }

    #[test]
    fn test_pid_split_arithmetic() {
        assert_eq!(split_pid(0), (0, 0));
        assert_eq!(split_pid(BLOCK_SIZE as i64 - 1), (0, BLOCK_SIZE - 1));
        assert_eq!(split_pid(BLOCK_SIZE as i64), (1, 0));
        assert_eq!(split_pid(BLOCK_SIZE as i64 + 5), (1, 5));
    }

    #[test]
    fn test_stats_counts_grows() {
        let registry = Registry::with_defaults();
        registry.publish(tag(1), 5_000);
        registry.publish(tag(1), 50_000);
        let stats = registry.stats();
        assert_eq!(stats.grows, 2);
    }
}
