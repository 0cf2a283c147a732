//! 分布式锁引擎
//!
//! 将锁存储、租约时长与退避策略组合为完整的加锁/释放协议。
//! 互斥正确性完全依赖存储端的原子原语，引擎自身不持有可变共享状态，
//! 可以放入 `Arc` 在任意数量的并发调用方之间共享。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::backoff::{Backoff, ExponentialBackoff};
use crate::error::{LockError, Result};
use crate::store::LockStore;

/// 默认租约时长（秒）
///
/// 防止持有者崩溃后留下孤儿锁：即使没有显式释放，租约到期后自动回收。
pub const DEFAULT_EXPIRE_SECS: u64 = 30;

/// 重试通知回调
///
/// 每次加锁失败、进入退避等待之前调用，接收触发重试的错误。
/// 纯观测用途，不影响重试流程。
pub type NotifyFn = Arc<dyn Fn(&LockError) + Send + Sync>;

/// 分布式锁引擎
///
/// `Active` 是正常实现；`Disabled` 是显式的空实现——所有加锁调用
/// 立即成功并返回空令牌，所有释放调用为空操作。单进程部署可以在
/// 构造处选择 `Disabled`，调用点不需要任何分支。
pub enum RedisLock {
    Active(ActiveEngine),
    Disabled,
}

/// 正常加锁引擎的配置与依赖
pub struct ActiveEngine {
    store: Arc<dyn LockStore>,
    expire: Duration,
    backoff: Option<Arc<dyn Backoff>>,
    notify: Option<NotifyFn>,
}

impl RedisLock {
    /// 创建引擎
    ///
    /// 默认租约 [`DEFAULT_EXPIRE_SECS`] 秒，默认指数退避
    /// （见 [`ExponentialBackoff::default`]），无通知回调。
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        RedisLock::Active(ActiveEngine {
            store,
            expire: Duration::from_secs(DEFAULT_EXPIRE_SECS),
            backoff: Some(Arc::new(ExponentialBackoff::default())),
            notify: None,
        })
    }

    /// 创建禁用引擎：永远加锁成功，释放为空操作
    pub fn disabled() -> Self {
        RedisLock::Disabled
    }

    /// 覆盖租约时长（配置边界为整秒，零值在加锁时报配置错误）
    pub fn with_expire(mut self, expire: Duration) -> Self {
        if let RedisLock::Active(a) = &mut self {
            a.expire = expire;
        }
        self
    }

    /// 覆盖退避策略
    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        if let RedisLock::Active(a) = &mut self {
            a.backoff = Some(Arc::new(backoff));
        }
        self
    }

    /// 移除退避策略：`must_set_retry` 退化为单次 `must_set`
    pub fn without_backoff(mut self) -> Self {
        if let RedisLock::Active(a) = &mut self {
            a.backoff = None;
        }
        self
    }

    /// 设置重试通知回调
    pub fn with_notify(mut self, notify: impl Fn(&LockError) + Send + Sync + 'static) -> Self {
        if let RedisLock::Active(a) = &mut self {
            a.notify = Some(Arc::new(notify));
        }
        self
    }

    /// 单次非阻塞加锁
    ///
    /// `Ok(Some(token))` 表示获取成功；`Ok(None)` 表示锁已被他人持有
    /// （竞争不是错误）；`Err` 表示配置错误或存储通信失败，
    /// 存储失败以 [`LockError::Set`] 区别于竞争。
    pub async fn try_set(&self, key: &str) -> Result<Option<String>> {
        match self {
            RedisLock::Disabled => Ok(Some(String::new())),
            RedisLock::Active(a) => match a.store.try_acquire(key, a.expire).await {
                Ok(acquired) => Ok(acquired),
                Err(err @ LockError::InvalidExpire) => Err(err),
                Err(err) => Err(LockError::Set(Box::new(err))),
            },
        }
    }

    /// 必须加锁成功的单次尝试
    ///
    /// 锁被占用映射为 [`LockError::Contended`]，不会返回空令牌的成功。
    pub async fn must_set(&self, key: &str) -> Result<String> {
        match self.try_set(key).await? {
            Some(token) => Ok(token),
            None => Err(LockError::Contended {
                key: key.to_string(),
            }),
        }
    }

    /// 必须加锁成功并带重试
    ///
    /// 反复调用 [`must_set`](Self::must_set) 直到成功或退避策略终止。
    /// 每次失败先记录日志并调用通知回调，再等待退避时长。
    /// 终止时返回最后一次的原始错误（竞争与存储失败的区分保留给调用方）。
    ///
    /// 等待通过 `tokio::time::sleep` 完成：future 被丢弃（例如包在
    /// `tokio::time::timeout` 中超时）时等待立即中止。
    pub async fn must_set_retry(&self, key: &str) -> Result<String> {
        let (backoff, notify) = match self {
            RedisLock::Disabled => (None, None),
            RedisLock::Active(a) => (a.backoff.as_deref(), a.notify.as_ref()),
        };

        let mut attempt: u32 = 0;

        loop {
            let err = match self.must_set(key).await {
                Ok(token) => {
                    if attempt > 0 {
                        info!(key, attempt, "加锁在重试后成功");
                    }
                    return Ok(token);
                }
                Err(e) => e,
            };

            // 配置错误等不可重试错误直接返回
            if !err.is_retryable() {
                return Err(err);
            }

            // 无退避策略等同于不重试
            let Some(backoff) = backoff else {
                return Err(err);
            };

            attempt += 1;
            let (wait, retry) = backoff.next(attempt);
            if !retry {
                warn!(key, attempt, error = %err, "已达重试上限，放弃加锁");
                return Err(err);
            }

            warn!(
                key,
                attempt,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "加锁失败，退避后重试"
            );
            if let Some(notify) = notify {
                notify(&err);
            }

            tokio::time::sleep(wait).await;
        }
    }

    /// 释放锁
    ///
    /// 委托存储层的令牌校验删除。失败映射为 [`LockError::ReleaseFailed`]
    /// 并记录日志，但从不自动重试——租约会自然过期兜底，调用方在
    /// `release` 返回后无论成败都应视为已放弃该锁。
    pub async fn release(&self, key: &str, token: &str) -> Result<()> {
        match self {
            RedisLock::Disabled => {
                debug!(key, "锁引擎已禁用，释放为空操作");
                Ok(())
            }
            RedisLock::Active(a) => {
                if let Err(err) = a.store.release(key, token).await {
                    error!(key, error = %err, "锁释放失败，等待租约自然过期");
                    return Err(LockError::ReleaseFailed(Box::new(err)));
                }
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
