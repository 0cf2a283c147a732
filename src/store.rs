//! 锁存储适配层
//!
//! 将分布式锁需要的两个原子操作封装为 [`LockStore`] 接口：
//! 条件写入（SET NX PX）与令牌校验删除（Lua 原子脚本）。
//! [`RedisStore`] 是生产实现，每次操作独立获取连接并在返回时归还。

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use tracing::info;
use uuid::Uuid;

use crate::error::{LockError, Result};

/// 令牌校验删除脚本：只有当前值等于给定令牌时才删除 KEY。
///
/// 防止持有者误删已被他人重新获取的租约（例如自身租约已过期）。
/// 未删除（返回 0）不是错误——租约可能已经自然过期。
const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end"#;

/// 生成所有权令牌
///
/// 使用 uuid v4 保证并发获取者之间不会产生相同令牌。
pub(crate) fn new_token() -> String {
    Uuid::new_v4().to_string()
}

/// 锁存储接口
///
/// 两个操作各自对共享存储原子生效；互斥正确性完全依赖存储端的
/// 原子性保证，实现自身不需要进程内同步。
#[async_trait]
pub trait LockStore: Send + Sync {
    /// 条件写入：KEY 不存在时写入新令牌并设置过期时间。
    ///
    /// 返回 `Ok(Some(token))` 表示获取成功，`Ok(None)` 表示锁已被占用。
    /// `expire` 为零是配置错误，不联系存储直接返回 [`LockError::InvalidExpire`]。
    async fn try_acquire(&self, key: &str, expire: Duration) -> Result<Option<String>>;

    /// 令牌校验删除：存储值等于 `token` 时删除 KEY，否则什么都不做。
    ///
    /// 令牌不匹配同样返回 `Ok(())`。
    async fn release(&self, key: &str, token: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// RedisStore — Redis 实现
// ---------------------------------------------------------------------------

/// Redis 锁存储
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    /// 创建 Redis 客户端
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        info!("Redis lock store created");
        Ok(Self { client })
    }

    /// 复用已有的 Redis 客户端
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// 获取连接（每次操作独立获取，返回时随值释放）
    async fn get_conn(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(LockError::from)
    }
}

#[async_trait]
impl LockStore for RedisStore {
    async fn try_acquire(&self, key: &str, expire: Duration) -> Result<Option<String>> {
        // PX 以毫秒为最小分辨率，不足 1 毫秒的租约同样是配置错误
        if expire.as_millis() == 0 {
            return Err(LockError::InvalidExpire);
        }

        let mut conn = self.get_conn().await?;

        // 令牌在发出 SET 前生成，尽量减少陈旧窗口
        let token = new_token();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(expire.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        // SET NX 在 KEY 已存在时返回 nil
        Ok(reply.map(|_| token))
    }

    async fn release(&self, key: &str, token: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;

        let script = Script::new(RELEASE_SCRIPT);
        let _deleted: i64 = script
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;

        Ok(())
    }
}
