//! 测试工具模块
//!
//! 提供实现了 [`LockStore`] 的内存存储 [`MemoryStore`]，用于在没有
//! Redis 的环境中测试加锁协议：支持租约过期、故障注入与调用计数。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{LockError, Result};
use crate::store::{LockStore, new_token};

/// 生成唯一的测试锁 KEY
pub fn test_lock_key() -> String {
    format!("test-lock-{}", Uuid::new_v4())
}

struct Entry {
    token: String,
    expires_at: Instant,
}

/// 内存锁存储
///
/// 与 Redis 实现保持相同的原子语义：条件写入与令牌校验删除都在
/// 同一把互斥锁内完成。过期条目在每次访问时惰性回收。
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    fail: AtomicBool,
    acquire_calls: AtomicU32,
    release_calls: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注入存储故障：后续所有操作返回 Redis 通信错误
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// try_acquire 被调用的次数
    pub fn acquire_calls(&self) -> u32 {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    /// release 被调用的次数
    pub fn release_calls(&self) -> u32 {
        self.release_calls.load(Ordering::SeqCst)
    }

    /// 预置一个被他人持有的租约，用于竞争场景
    pub fn insert_held(&self, key: &str, token: &str, expire: Duration) {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                token: token.to_string(),
                expires_at: Instant::now() + expire,
            },
        );
    }

    /// 当前存储中 KEY 对应的令牌（过期条目视为不存在）
    pub fn current_token(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);
        entries.get(key).map(|e| e.token.clone())
    }

    fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str) {
        if entries.get(key).is_some_and(|e| e.expires_at <= Instant::now()) {
            entries.remove(key);
        }
    }

    fn simulated_error() -> LockError {
        LockError::Redis(redis::RedisError::from((
            redis::ErrorKind::Io,
            "simulated redis failure",
        )))
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn try_acquire(&self, key: &str, expire: Duration) -> Result<Option<String>> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);

        // 与 Redis 实现一致：不足 1 毫秒的租约视为配置错误
        if expire.as_millis() == 0 {
            return Err(LockError::InvalidExpire);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Self::simulated_error());
        }

        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);

        if entries.contains_key(key) {
            return Ok(None);
        }

        let token = new_token();
        entries.insert(
            key.to_string(),
            Entry {
                token: token.clone(),
                expires_at: Instant::now() + expire,
            },
        );
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &str) -> Result<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(Self::simulated_error());
        }

        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);

        // 令牌匹配才删除；不匹配不是错误
        if entries.get(key).is_some_and(|e| e.token == token) {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_expired_lease_reclaimable() {
        let store = MemoryStore::new();

        let token = store
            .try_acquire("k", Duration::from_millis(10))
            .await
            .unwrap();
        assert!(token.is_some());

        // 未过期时占用
        assert_eq!(
            store.try_acquire("k", Duration::from_millis(10)).await.unwrap(),
            None
        );

        tokio::time::sleep(Duration::from_millis(20)).await;

        // 过期后可重新获取
        let token2 = store
            .try_acquire("k", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(token2.is_some());
    }

    #[tokio::test]
    async fn test_release_token_gated() {
        let store = MemoryStore::new();

        let token = store
            .try_acquire("k", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();

        // 错误令牌不删除
        store.release("k", "wrong-token").await.unwrap();
        assert_eq!(store.current_token("k").unwrap(), token);

        // 正确令牌删除
        store.release("k", &token).await.unwrap();
        assert_eq!(store.current_token("k"), None);
    }

    #[tokio::test]
    async fn test_sub_millisecond_expire_rejected() {
        let store = MemoryStore::new();
        let err = store
            .try_acquire("k", Duration::from_micros(500))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::InvalidExpire));
    }

    #[tokio::test]
    async fn test_release_missing_key_ok() {
        let store = MemoryStore::new();
        store.release("never-set", "any").await.unwrap();
    }
}
