//! Distributed per-resource locks over a shared key/value store
//!
//! Acquisition is try-once: a held lock means "skip this pass", never "wait".
//! Every mutation that must not race runs inside `LockManager::with_lock`,
//! which reports the tagged `LockOutcome` and always releases the lock.

pub mod guard;
pub mod key;
pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;
pub mod store;

pub use guard::{LockGuard, LockLease, LockManager, LockOutcome, LockStats};
pub use key::LockKey;
pub use memory::MemoryLockStore;
#[cfg(feature = "redis-store")]
pub use self::redis::RedisLockStore;
pub use store::LockStore;
