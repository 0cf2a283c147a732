//! 基于 Redis 的分布式互斥锁
//!
//! 独立进程通过共享 Redis 的原子原语（SET NX PX 条件写入 +
//! Lua 令牌校验删除）协调对命名资源的独占访问，租约过期兜底
//! 持有者崩溃的场景。
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use redis_lock::{LockInstance, RedisLock, RedisStore};
//!
//! # async fn run() -> redis_lock::Result<()> {
//! let store = Arc::new(RedisStore::new("redis://localhost:6379")?);
//! let lock = Arc::new(RedisLock::new(store));
//!
//! let mut instance = LockInstance::new(lock);
//! instance.must_set_retry("job:42").await?;
//! // 独占执行临界区
//! instance.release().await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod error;
pub mod instance;
pub mod lock;
pub mod store;
pub mod test_utils;

pub use backoff::{Backoff, ExponentialBackoff};
pub use error::{LockError, Result};
pub use instance::LockInstance;
pub use lock::{DEFAULT_EXPIRE_SECS, NotifyFn, RedisLock};
pub use store::{LockStore, RedisStore};
