//! A registry of named reader-writer locks.
//!
//! # Overview
//! `rwnames` hands out a reader-writer lock per resource name (a file name, a
//! URL path, any short byte string) without the resources being declared up
//! front. Names are hashed into a fixed number of buckets; the first
//! resolution of a name creates its lock, every later one returns the same lock.
//!
//! # Features
//! - Lazy, race-free creation: concurrent first resolutions of a name agree on one lock
//! - Per-name contention only: the registry's structural mutex is never held while waiting
//! - Many concurrent readers or one writer per name
//! - Every release that can admit more than one waiter wakes them all
//! - Optional writer-first admission to keep writers from starving
//! - No poisoning, the lock is released normally on panic
//!
//! # Examples
//! ```
//! use rwnames::{LockRegistry, RegistryError};
//!
//! let registry = LockRegistry::with_capacity(4).unwrap();
//!
//! let lock = registry.resolve("a.txt").unwrap();
//! assert_eq!(lock.begin_read(), 1);
//! assert_eq!(lock.end_read(), 0);
//!
//! {
//!     let _write = lock.write();
//!     // exclusive access to "a.txt"
//! }
//!
//! // Names are at most 21 bytes by default and never truncated.
//! assert!(matches!(
//!     registry.resolve("a-rather-long-file-name.txt"),
//!     Err(RegistryError::InvalidName { .. })
//! ));
//! ```
mod error;
mod futex;
mod hash;
#[doc = include_str!("../README.md")]
mod registry;
mod resource_lock;

pub use error::*;
pub use hash::hash;
pub use registry::*;
pub use resource_lock::*;

#[cfg(test)]
mod tests {
    use std::sync::Once;

    pub fn setup_tracing() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::TRACE)
                .with_test_writer()
                .try_init();
        });
    }
}
