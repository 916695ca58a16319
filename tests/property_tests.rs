//! Property-based tests for the privatized-object registry.
//!
//! Uses proptest to generate operation sequences and verify the registry
//! against a simple map model.

use std::collections::HashMap;
use std::ffi::c_void;

use priv_registry::{Registry, BLOCK_SIZE};
use proptest::prelude::*;

/// A single registry operation.
#[derive(Debug, Clone, Copy)]
enum Op {
    Publish(i64, usize),
    Clear(i64),
}

/// Strategy for pids: mostly small, with block-boundary values mixed in so
/// sequences cross the grow path.
fn pid_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![
        4 => 0..64i64,
        2 => 0..(8 * BLOCK_SIZE as i64),
        1 => Just(BLOCK_SIZE as i64 - 1),
        1 => Just(BLOCK_SIZE as i64),
    ]
}

/// Strategy for operations. Published values are nonzero so a null read
/// always means "absent".
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (pid_strategy(), 1usize..1_000_000).prop_map(|(pid, v)| Op::Publish(pid, v)),
        1 => pid_strategy().prop_map(Op::Clear),
    ]
}

proptest! {
    /// Point correctness: after any sequence of publishes and clears, every
    /// pid holds the value of its most recent publish, or null.
    #[test]
    fn registry_matches_map_model(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let registry = Registry::with_defaults();
        let mut model: HashMap<i64, usize> = HashMap::new();

        for op in &ops {
            match *op {
                Op::Publish(pid, v) => {
                    registry.publish(v as *mut c_void, pid);
                    model.insert(pid, v);
                }
                Op::Clear(pid) => {
                    registry.clear(pid);
                    model.remove(&pid);
                }
            }
        }

        for (&pid, &v) in &model {
            prop_assert_eq!(registry.get(pid) as usize, v);
        }
        // A pid no strategy can produce stays null.
        prop_assert!(registry.get(1_000_000).is_null());
    }

    /// Independence: publishing one pid does not disturb its neighbors.
    #[test]
    fn publish_does_not_disturb_neighbors(
        base in 1..(4 * BLOCK_SIZE as i64),
        v in 1usize..1_000_000,
        w in 1usize..1_000_000,
    ) {
        let registry = Registry::with_defaults();
        registry.publish(v as *mut c_void, base);
        registry.publish(w as *mut c_void, base + 1);

        prop_assert_eq!(registry.get(base) as usize, v);
        prop_assert_eq!(registry.get(base + 1) as usize, w);
        prop_assert!(registry.get(base - 1).is_null());
    }

    /// Monotone capacity: growth only ever adds blocks.
    #[test]
    fn capacity_is_monotone(ops in prop::collection::vec(op_strategy(), 1..100)) {
        let registry = Registry::with_defaults();
        let mut last = registry.capacity();
        prop_assert_eq!(last, BLOCK_SIZE as i64);

        for op in &ops {
            match *op {
                Op::Publish(pid, v) => registry.publish(v as *mut c_void, pid),
                Op::Clear(pid) => registry.clear(pid),
            }
            let capacity = registry.capacity();
            prop_assert!(capacity >= last);
            // Capacity always covers every pid published so far.
            if let Op::Publish(pid, _) = *op {
                prop_assert!(capacity > pid);
            }
            last = capacity;
        }
    }

    /// Publish then clear always round-trips back to null, regardless of
    /// where the pid lands in the block table.
    #[test]
    fn clear_round_trips_to_null(pid in 0..(8 * BLOCK_SIZE as i64), v in 1usize..1_000_000) {
        let registry = Registry::with_defaults();
        registry.publish(v as *mut c_void, pid);
        prop_assert_eq!(registry.get(pid) as usize, v);
        registry.clear(pid);
        prop_assert!(registry.get(pid).is_null());
    }
}
