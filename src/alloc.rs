//! Allocator Shim
//!
//! Zero-initialized bulk allocation for the registry's backing storage.
//! Every allocation carries a [`MemKind`] tag so outstanding bytes can be
//! attributed per storage class, in the same spirit as the runtime-wide
//! memory gauges elsewhere in the host runtime.
//!
//! Allocation failure is fatal: the registry's metadata is tiny compared to
//! the privatized objects the caller already holds, so there is no
//! recoverable out-of-memory path here.

use std::alloc::{self, Layout};
use std::sync::atomic::{AtomicU64, Ordering};

/// Storage class of a registry allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemKind {
    /// A block of object-pointer slots.
    BlockStorage,
    /// A vector of block pointers owned by one instance generation.
    BlockVector,
    /// A reader roster node.
    RosterNode,
}

impl MemKind {
    fn index(self) -> usize {
        match self {
            MemKind::BlockStorage => 0,
            MemKind::BlockVector => 1,
            MemKind::RosterNode => 2,
        }
    }

    /// Human-readable name, used in stats output.
    pub fn as_str(self) -> &'static str {
        match self {
            MemKind::BlockStorage => "block_storage",
            MemKind::BlockVector => "block_vector",
            MemKind::RosterNode => "roster_node",
        }
    }
}

/// Outstanding bytes per storage class, process-wide.
static OUTSTANDING: [AtomicU64; 3] = [
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
];

/// Snapshot of the shim's per-kind gauges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocStats {
    /// Bytes currently allocated for slot blocks.
    pub block_storage_bytes: u64,
    /// Bytes currently allocated for instance block vectors.
    pub block_vector_bytes: u64,
    /// Bytes currently allocated for roster nodes.
    pub roster_node_bytes: u64,
}

/// Read the current outstanding-bytes gauges.
pub fn stats() -> AllocStats {
    AllocStats {
        block_storage_bytes: OUTSTANDING[0].load(Ordering::Relaxed),
        block_vector_bytes: OUTSTANDING[1].load(Ordering::Relaxed),
        roster_node_bytes: OUTSTANDING[2].load(Ordering::Relaxed),
    }
}

fn array_layout<T>(n: usize) -> Layout {
    match Layout::array::<T>(n) {
        Ok(layout) => layout,
        // A block vector large enough to overflow a Layout would need an
        // astronomically large pid first.
        Err(_) => panic!("allocation size overflow: {} elements", n),
    }
}

/// Allocate a zero-filled array of `n` elements of `T`.
///
/// The returned memory is valid for `T` whose all-zeroes bit pattern is a
/// valid value (atomics over null pointers and integers qualify). Aborts the
/// process on allocation failure.
pub(crate) fn alloc_zeroed_array<T>(n: usize, kind: MemKind) -> *mut T {
    debug_assert!(n > 0, "zero-length registry allocation");
    let layout = array_layout::<T>(n);
    // Safety: layout has non-zero size (n > 0 and T is never a ZST here).
    let ptr = unsafe { alloc::alloc_zeroed(layout) };
    if ptr.is_null() {
        alloc::handle_alloc_error(layout);
    }
    OUTSTANDING[kind.index()].fetch_add(layout.size() as u64, Ordering::Relaxed);
    ptr.cast()
}

/// Free an array previously returned by [`alloc_zeroed_array`] with the same
/// `n` and `kind`.
///
/// # Safety
///
/// `ptr` must have come from `alloc_zeroed_array::<T>(n, kind)` and must not
/// be freed twice.
pub(crate) unsafe fn free_array<T>(ptr: *mut T, n: usize, kind: MemKind) {
    let layout = array_layout::<T>(n);
    alloc::dealloc(ptr.cast(), layout);
    OUTSTANDING[kind.index()].fetch_sub(layout.size() as u64, Ordering::Relaxed);
}
