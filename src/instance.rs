//! Instance Pair
//!
//! Two parallel generations of the block table plus the atomic index naming
//! the current one. The non-current instance is scratch space for the next
//! grow; swapping the index is the sole linearization point that publishes a
//! rebuilt instance to readers.

use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU8, AtomicUsize, Ordering};

/// One object-pointer slot.
///
/// Slots use relaxed atomic loads and stores: pointer-width accesses are
/// untorn, and no ordering is promised between publications of distinct
/// pids.
pub(crate) type Slot = AtomicPtr<c_void>;

/// A block is `BLOCK_SIZE` slots allocated as one zeroed array.
pub(crate) type BlockPtr = *mut Slot;

/// One generation of the block table.
///
/// Both fields are written only by the writer holding the grow lock, while
/// the instance is the scratch (non-current) one. Publication to readers
/// rides on the current-index swap, so relaxed loads suffice on the read
/// side once the index has been acquired.
pub(crate) struct Instance {
    blocks: AtomicPtr<BlockPtr>,
    len: AtomicUsize,
}

impl Instance {
    pub(crate) const fn empty() -> Self {
        Self {
            blocks: AtomicPtr::new(ptr::null_mut()),
            len: AtomicUsize::new(0),
        }
    }

    /// Snapshot `(blocks, len)`.
    pub(crate) fn load(&self) -> (*mut BlockPtr, usize) {
        (
            self.blocks.load(Ordering::Acquire),
            self.len.load(Ordering::Acquire),
        )
    }

    /// Install a rebuilt block vector. Writer-side only, before the index
    /// swap (or while resetting a retired generation).
    pub(crate) fn install(&self, blocks: *mut BlockPtr, len: usize) {
        self.blocks.store(blocks, Ordering::Release);
        self.len.store(len, Ordering::Release);
    }
}

/// The two instances and the current index.
pub(crate) struct InstancePair {
    instances: [Instance; 2],
    current: AtomicU8,
}

impl InstancePair {
    pub(crate) const fn new() -> Self {
        Self {
            instances: [Instance::empty(), Instance::empty()],
            current: AtomicU8::new(0),
        }
    }

    /// Current instance index, `0` or `1`.
    pub(crate) fn current_idx(&self) -> usize {
        self.current.load(Ordering::Acquire) as usize
    }

    /// Revalidation load on the read side. Sequentially consistent: the
    /// reader's preceding status store and this load form one half of the
    /// store-load pattern against the writer's swap and status scan.
    pub(crate) fn current_idx_seq(&self) -> usize {
        self.current.load(Ordering::SeqCst) as usize
    }

    /// Publish `idx` as the current instance. The swap is the linearization
    /// point of a grow; sequential consistency orders it before the writer's
    /// subsequent roster status loads.
    pub(crate) fn set_current_idx(&self, idx: usize) {
        debug_assert!(idx < 2);
        self.current.store(idx as u8, Ordering::SeqCst);
    }

    pub(crate) fn get(&self, idx: usize) -> &Instance {
        &self.instances[idx]
    }
}
