//! 锁实例（所有权守卫）
//!
//! [`LockInstance`] 在引擎之上强制单次绑定语义：一个实例一生至多
//! 绑定一个 KEY，加锁成功后记录 (key, token)，释放时原样转发给引擎。
//! 释放后实例即作废，不会重新绑定——需要再次加锁时新建实例。

use std::sync::Arc;

use crate::error::{LockError, Result};
use crate::lock::RedisLock;

/// 已绑定的 (key, token) 对，二者同生同灭
struct Binding {
    key: String,
    token: String,
}

/// 单次使用的锁句柄
///
/// 加锁方法要求 `&mut self`，多方共享同一实例时由借用检查强制
/// 调用方自行串行化。
pub struct LockInstance {
    lock: Arc<RedisLock>,
    binding: Option<Binding>,
}

impl LockInstance {
    /// 创建未绑定的锁实例
    pub fn new(lock: Arc<RedisLock>) -> Self {
        Self {
            lock,
            binding: None,
        }
    }

    /// 绑定前的本地校验：KEY 非空且实例尚未绑定
    fn check_bindable(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(LockError::EmptyKey);
        }
        if self.binding.is_some() {
            return Err(LockError::AlreadyBound);
        }
        Ok(())
    }

    /// 单次加锁并绑定
    ///
    /// 校验失败不联系存储；引擎成功后记录绑定。
    pub async fn must_set(&mut self, key: &str) -> Result<()> {
        self.check_bindable(key)?;

        let token = self.lock.must_set(key).await?;
        self.binding = Some(Binding {
            key: key.to_string(),
            token,
        });

        Ok(())
    }

    /// 带重试的加锁并绑定
    pub async fn must_set_retry(&mut self, key: &str) -> Result<()> {
        self.check_bindable(key)?;

        let token = self.lock.must_set_retry(key).await?;
        self.binding = Some(Binding {
            key: key.to_string(),
            token,
        });

        Ok(())
    }

    /// 实例是否尚未绑定
    pub fn is_empty(&self) -> bool {
        self.binding.is_none()
    }

    /// 释放锁
    ///
    /// 未绑定时直接成功，不联系存储，可重复调用。
    /// 已绑定时转发给引擎；绑定不会被清除，实例释放后即作废。
    pub async fn release(&self) -> Result<()> {
        match &self.binding {
            None => Ok(()),
            Some(b) => self.lock.release(&b.key, &b.token).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_utils::MemoryStore;

    fn instance_over(store: Arc<MemoryStore>) -> LockInstance {
        LockInstance::new(Arc::new(RedisLock::new(store)))
    }

    #[tokio::test]
    async fn test_empty_key_rejected_locally() {
        let store = Arc::new(MemoryStore::new());
        let mut inst = instance_over(store.clone());

        let err = inst.must_set("").await.unwrap_err();
        assert!(matches!(err, LockError::EmptyKey));
        assert!(inst.is_empty());
        // 本地校验失败不联系存储
        assert_eq!(store.acquire_calls(), 0);
    }

    #[tokio::test]
    async fn test_rebind_rejected_binding_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let mut inst = instance_over(store.clone());

        inst.must_set("k").await.unwrap();
        let original = store.current_token("k").unwrap();

        let err = inst.must_set("k").await.unwrap_err();
        assert!(matches!(err, LockError::AlreadyBound));
        // 换一个 KEY 也不行
        let err = inst.must_set("k2").await.unwrap_err();
        assert!(matches!(err, LockError::AlreadyBound));

        // 原绑定未受影响，释放仍然删除原租约
        assert_eq!(store.current_token("k").unwrap(), original);
        inst.release().await.unwrap();
        assert_eq!(store.current_token("k"), None);
    }

    #[tokio::test]
    async fn test_release_on_empty_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let inst = instance_over(store.clone());

        inst.release().await.unwrap();
        inst.release().await.unwrap();
        assert_eq!(store.release_calls(), 0);
        assert!(inst.is_empty());
    }

    #[tokio::test]
    async fn test_spent_after_release() {
        let store = Arc::new(MemoryStore::new());
        let mut inst = instance_over(store.clone());

        inst.must_set_retry("k").await.unwrap();
        assert!(!inst.is_empty());

        inst.release().await.unwrap();
        // 实例已作废：不算空，也不能重新绑定
        assert!(!inst.is_empty());
        let err = inst.must_set("k").await.unwrap_err();
        assert!(matches!(err, LockError::AlreadyBound));
    }

    #[tokio::test]
    async fn test_release_idempotent_after_expiry() {
        let store = Arc::new(MemoryStore::new());
        let lock = Arc::new(RedisLock::new(store.clone()).with_expire(Duration::from_millis(20)));
        let mut inst = LockInstance::new(lock);

        inst.must_set("k").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        // 租约已过期被回收，释放仍然成功（令牌不匹配不是错误）
        inst.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_engine_instance_flow() {
        let mut inst = LockInstance::new(Arc::new(RedisLock::disabled()));

        inst.must_set("k").await.unwrap();
        assert!(!inst.is_empty());
        inst.release().await.unwrap();
    }
}
