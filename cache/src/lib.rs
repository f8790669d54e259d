//! Redis-backed implementations of the admission cache and the distributed
//! lock manager.
//!
//! Everything here is request-path infrastructure: the admission gate's
//! dedup set, entry counter, waiting queue and sold-out flag live in Redis
//! so every application instance sees the same admission decisions, and the
//! lock manager serializes cross-instance critical sections with leased,
//! watchdog-extended named locks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admission;
pub mod lock;

pub use admission::RedisAdmissionCache;
pub use lock::{RedisLockManager, WATCHDOG_DIVISOR};
