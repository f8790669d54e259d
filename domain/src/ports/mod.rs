//! Ports: the traits behind which every external collaborator lives.
//!
//! - [`CouponStore`] / [`IssuanceStore`] / [`FailureStore`] — durable stores
//!   (PostgreSQL in production, in-memory in tests).
//! - [`AdmissionCache`] — the Redis-backed request-time structures: dedup
//!   set, entry counter, waiting queue, sold-out flag, coupon snapshot.
//! - [`LockManager`] — named, leased, auto-extending mutual exclusion.
//! - [`IssuePublisher`] — the message-queue producer side.
//!
//! All async methods are declared as `impl Future + Send` so implementations
//! can be plain `async fn`s and callers stay generic (no trait objects).

pub mod admission_cache;
pub mod coupon_store;
pub mod failure_store;
pub mod issuance_store;
pub mod lock_manager;
pub mod publisher;

pub use admission_cache::AdmissionCache;
pub use coupon_store::CouponStore;
pub use failure_store::FailureStore;
pub use issuance_store::{InsertOutcome, IssuanceStore};
pub use lock_manager::{
    LockManager, LockSpec, coupon_lock_key, coupon_user_lock_key, retry_scan_lock_key,
};
pub use publisher::IssuePublisher;
