//! 退避策略
//!
//! 提供指数退避策略，用于加锁竞争失败后的重试等待计算。
//! 策略是纯函数：等待时长只由失败次数决定，不持有可变状态，
//! 可以在并发调用方之间安全共享。

use std::time::Duration;

/// 默认退避基础等待时间
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(30);

/// 默认退避等待时间上限
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(500);

/// 默认最大重试次数（不含首次执行）
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// 退避策略接口
///
/// `next` 接收已失败的次数（从 1 开始），返回下一次重试前的等待时长
/// 以及是否继续重试。实现必须是纯函数。
pub trait Backoff: Send + Sync {
    fn next(&self, attempt: u32) -> (Duration, bool);
}

// ---------------------------------------------------------------------------
// ExponentialBackoff — 指数退避
// ---------------------------------------------------------------------------

/// 指数退避策略
///
/// 等待时长从 `base` 开始按 2 的幂增长，封顶于 `max`；
/// 失败次数超过 `max_retries` 后不再重试。
///
/// 默认值：基础等待 30ms，上限 500ms，最多重试 10 次。
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    max_retries: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// 覆盖最大重试次数
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl Backoff for ExponentialBackoff {
    /// 计算第 N 次失败后的等待时长（attempt 从 1 开始）
    ///
    /// 公式: base * 2^(attempt-1)，结果不超过 max。
    /// 使用 f64 运算后再转回 Duration，接受微秒级精度损失。
    fn next(&self, attempt: u32) -> (Duration, bool) {
        if attempt > self.max_retries {
            return (Duration::ZERO, false);
        }

        let base_ms = self.base.as_millis() as f64;
        let wait_ms = base_ms * 2f64.powi(attempt.saturating_sub(1) as i32);
        let capped_ms = wait_ms.min(self.max.as_millis() as f64);

        (Duration::from_millis(capped_ms as u64), true)
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
