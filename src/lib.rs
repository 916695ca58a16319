//! # Privatized-Object Registry
//!
//! A process-wide, concurrent mapping from a dense integer identifier (the
//! *pid*) to an opaque object pointer, used by a distributed runtime to
//! cache per-locale privatized replicas of shared objects. Reads happen on
//! every remote-class access and are wait-free; publications are rare and
//! may grow the table.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       REGISTRY                           │
//! ├─────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌──────────────┐   ┌──────────────┐   ┌─────────────┐  │
//! │  │ Public API   │   │ Coordinator  │   │ Reader      │  │
//! │  │ publish/get/ │──▶│ acquire/     │──▶│ roster      │  │
//! │  │ clear/cap.   │   │ release/grow │   │ (tls.rs)    │  │
//! │  └──────────────┘   └──────────────┘   └─────────────┘  │
//! │          │                  │                            │
//! │          ▼                  ▼                            │
//! │  ┌──────────────┐   ┌──────────────┐                    │
//! │  │ Instance pair│   │ Alloc shim   │                    │
//! │  │ (instance.rs)│   │ (alloc.rs)   │                    │
//! │  └──────────────┘   └──────────────┘                    │
//! │                                                          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Readers publish the instance index they are about to read into a
//! thread-local roster node and revalidate it; a growing writer rebuilds
//! the inactive instance, swaps one atomic index, and waits for every
//! roster node to move off the old index before freeing the old block
//! vector. Blocks are shared across generations, so pointers published
//! through one generation are visible through the other.
//!
//! ## Usage
//!
//! The host runtime calls [`init`] once at bootstrap and then uses the free
//! functions, mirroring the registry's procedural surface:
//!
//! ```rust,ignore
//! priv_registry::init();
//! priv_registry::publish(obj, pid);
//! let replica = priv_registry::get(pid);
//! ```
//!
//! Library code that wants an isolated table (tests, tools) can build a
//! [`Registry`] value directly.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod alloc;
pub mod config;
pub mod log;
mod instance;
mod registry;
mod tls;

use std::ffi::c_void;
use std::sync::OnceLock;

pub use crate::alloc::AllocStats;
pub use crate::config::{ConfigError, RegistryConfig, RegistryConfigBuilder};
pub use crate::log::Level;
pub use crate::registry::{Registry, RegistryStats, BLOCK_SIZE};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The process-wide registry.
static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// One-time process initialization with the default configuration.
///
/// Idempotent: repeat calls leave the existing registry in place and log a
/// warning.
pub fn init() {
    init_with(RegistryConfig::default());
}

/// One-time process initialization with an explicit configuration.
///
/// Applies `config.log_level` to the process-global logger and builds the
/// singleton registry. Idempotent like [`init`].
pub fn init_with(config: RegistryConfig) {
    log::set_level(config.log_level);
    let mut installed = false;
    GLOBAL.get_or_init(|| {
        installed = true;
        Registry::new(&config)
    });
    if !installed {
        log::emit(
            Level::Warn,
            "priv_registry",
            "init called more than once; keeping the existing registry",
            &[],
        );
    }
}

fn global() -> &'static Registry {
    GLOBAL
        .get()
        .expect("privatized-object registry used before init()")
}

/// Store `ptr` at slot `pid` in the process-wide registry, growing as
/// needed. See [`Registry::publish`].
pub fn publish(ptr: *mut c_void, pid: i64) {
    global().publish(ptr, pid);
}

/// Current slot value for `pid` in the process-wide registry, null if never
/// published. See [`Registry::get`].
pub fn get(pid: i64) -> *mut c_void {
    global().get(pid)
}

/// Overwrite slot `pid` with null in the process-wide registry. See
/// [`Registry::clear`].
pub fn clear(pid: i64) {
    global().clear(pid)
}

/// Upper bound on the pid space currently backed by storage in the
/// process-wide registry. See [`Registry::capacity`].
pub fn capacity() -> i64 {
    global().capacity()
}

/// Write-side counters of the process-wide registry.
pub fn stats() -> RegistryStats {
    global().stats()
}
