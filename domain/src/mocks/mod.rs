//! In-memory implementations of every port, for tests.
//!
//! These run the whole pipeline at memory speed and add failure-injection
//! knobs (`fail_next_*`) so infrastructure outages can be scripted. They
//! ignore TTLs; production behavior with expiry lives in the Redis and
//! Postgres crates.

pub mod cache;
pub mod lock;
pub mod publisher;
pub mod stores;

pub use cache::MemoryAdmissionCache;
pub use lock::MemoryLockManager;
pub use publisher::MemoryPublisher;
pub use stores::{MemoryCouponStore, MemoryFailureStore, MemoryIssuanceStore};
