//! 统一错误处理模块
//!
//! 定义分布式锁的所有错误类型，使用 thiserror 提供良好的错误信息。
//! 错误分类与重试语义：配置错误与本地校验错误立即失败且不重试，
//! 存储通信失败与锁竞争失败仅在 `must_set_retry` 中按退避策略重试。

use thiserror::Error;

/// 分布式锁错误类型
#[derive(Debug, Error)]
pub enum LockError {
    // ==================== 配置错误 ====================
    #[error("锁过期时间必须大于 0")]
    InvalidExpire,

    // ==================== 存储层错误 ====================
    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    // ==================== 加锁错误 ====================
    #[error("锁设置失败: {0}")]
    Set(#[source] Box<LockError>),

    #[error("锁已被占用: key={key}")]
    Contended { key: String },

    // ==================== 释放错误 ====================
    #[error("锁释放失败: {0}")]
    ReleaseFailed(#[source] Box<LockError>),

    // ==================== 锁实例校验错误 ====================
    #[error("锁 KEY 不能为空")]
    EmptyKey,

    #[error("锁实例已绑定 KEY，不能重复加锁")]
    AlreadyBound,
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, LockError>;

impl LockError {
    /// 是否为可重试错误
    ///
    /// 只有存储通信失败（`Set`）和锁竞争失败（`Contended`）可重试；
    /// 配置错误与实例校验错误重试没有意义，直接向上传播。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Set(_) | Self::Contended { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        let contended = LockError::Contended {
            key: "job:42".to_string(),
        };
        assert!(contended.is_retryable());

        let set_err = LockError::Set(Box::new(LockError::Redis(redis::RedisError::from((
            redis::ErrorKind::Io,
            "connection refused",
        )))));
        assert!(set_err.is_retryable());

        assert!(!LockError::InvalidExpire.is_retryable());
        assert!(!LockError::EmptyKey.is_retryable());
        assert!(!LockError::AlreadyBound.is_retryable());
    }

    #[test]
    fn test_display_keeps_key() {
        let err = LockError::Contended {
            key: "job:42".to_string(),
        };
        assert!(err.to_string().contains("job:42"));
    }
}
