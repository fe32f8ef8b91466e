//! 连接池管理器配置模块

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::QuickDbResult;

/// 连接池管理器配置
///
/// 所有时长字段以毫秒保存，便于写入TOML/JSON配置文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// 健康检查间隔
    pub check_interval_ms: u64,
    /// 单次健康检查超时
    pub check_timeout_ms: u64,
    /// 恢复时的最大重试次数（首次尝试不计入）
    pub max_retries: u32,
    /// 重试基础延迟
    pub retry_delay_ms: u64,
    /// 退避上限
    pub max_backoff_ms: u64,
    /// 退避底数
    pub backoff_base: u32,
    /// 退避指数偏移
    pub attempt_offset: u32,
    /// 连续失败超过该值后，重连前先等待稳定
    pub failure_threshold: u32,
    /// 稳定等待时长
    pub stabilization_delay_ms: u64,
    /// 切换客户端后延迟关闭旧客户端的时长
    pub close_delay_ms: u64,
    /// 关闭旧客户端的超时
    pub close_timeout_ms: u64,
    /// 快速探测超时
    pub quick_check_timeout_ms: u64,
    /// 等待健康时的轮询间隔
    pub wait_interval_ms: u64,
    /// 等待健康时需要的连续成功次数
    pub wait_needed: u32,
    /// 预热命令次数
    pub warmup_count: u32,
    /// 预热命令间隔
    pub warmup_interval_ms: u64,
    /// 守护执行等待恢复的超时
    pub execute_wait_timeout_ms: u64,
    /// 批量操作前等待恢复的超时
    pub recover_timeout_ms: u64,
    /// 恢复时候选客户端的探测超时
    pub recovery_ping_timeout_ms: u64,
    /// 恢复时候选客户端的验证命令超时
    pub recovery_query_timeout_ms: u64,
    /// 快速探测结果缓存时长，0 表示不缓存
    pub health_cache_ttl_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 30_000,
            check_timeout_ms: 10_000,
            max_retries: 3,
            retry_delay_ms: 2_000,
            max_backoff_ms: 30_000,
            backoff_base: 2,
            attempt_offset: 1,
            failure_threshold: 1,
            stabilization_delay_ms: 2_000,
            close_delay_ms: 5_000,
            close_timeout_ms: 5_000,
            quick_check_timeout_ms: 2_000,
            wait_interval_ms: 2_000,
            wait_needed: 2,
            warmup_count: 5,
            warmup_interval_ms: 100,
            execute_wait_timeout_ms: 10_000,
            recover_timeout_ms: 30_000,
            recovery_ping_timeout_ms: 5_000,
            recovery_query_timeout_ms: 5_000,
            health_cache_ttl_ms: 10_000,
        }
    }
}

impl PoolConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn stabilization_delay(&self) -> Duration {
        Duration::from_millis(self.stabilization_delay_ms)
    }

    pub fn close_delay(&self) -> Duration {
        Duration::from_millis(self.close_delay_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn quick_check_timeout(&self) -> Duration {
        Duration::from_millis(self.quick_check_timeout_ms)
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }

    pub fn warmup_interval(&self) -> Duration {
        Duration::from_millis(self.warmup_interval_ms)
    }

    pub fn execute_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.execute_wait_timeout_ms)
    }

    pub fn recover_timeout(&self) -> Duration {
        Duration::from_millis(self.recover_timeout_ms)
    }

    pub fn recovery_ping_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_ping_timeout_ms)
    }

    pub fn recovery_query_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_query_timeout_ms)
    }

    pub fn health_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.health_cache_ttl_ms)
    }

    /// 第 `attempt` 次重试前的退避时长
    ///
    /// `base^(attempt - offset) * retry_delay`，不超过 `max_backoff`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(self.attempt_offset);
        let factor = u64::from(self.backoff_base.max(1)).saturating_pow(exponent);
        let delay_ms = self.retry_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_backoff_ms))
    }

    /// 创建构建器
    pub fn builder() -> crate::config::PoolConfigBuilder {
        crate::config::PoolConfigBuilder::new()
    }

    /// 从文件加载配置
    ///
    /// 扩展名为 `toml` 时按TOML解析，否则按JSON解析
    pub fn from_file<P: AsRef<Path>>(path: P) -> QuickDbResult<Self> {
        crate::config::core::load_file(path.as_ref())
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> QuickDbResult<()> {
        crate::config::core::save_file(self, path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_until_cap() {
        let config = PoolConfig::default();
        let delays: Vec<Duration> = (1..=6).map(|a| config.backoff_delay(a)).collect();
        assert_eq!(delays[0], Duration::from_secs(2));
        assert_eq!(delays[1], Duration::from_secs(4));
        assert_eq!(delays[2], Duration::from_secs(8));
        assert_eq!(delays[3], Duration::from_secs(16));
        assert_eq!(delays[4], Duration::from_secs(30));
        assert_eq!(delays[5], Duration::from_secs(30));
        for pair in delays.windows(2).take(4) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_backoff_never_overflows() {
        let config = PoolConfig::default();
        assert_eq!(config.backoff_delay(200), config.max_backoff());
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let dir = tempfile::tempdir().expect("临时目录");
        let path = dir.path().join("pool.toml");

        let mut config = PoolConfig::default();
        config.max_retries = 5;
        config.check_interval_ms = 1_000;
        config.save_to_file(&path).expect("保存配置");

        let loaded = PoolConfig::from_file(&path).expect("加载配置");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().expect("临时目录");
        let path = dir.path().join("pool.json");
        std::fs::write(&path, r#"{ "wait_needed": 3 }"#).expect("写入文件");

        let loaded = PoolConfig::from_file(&path).expect("加载配置");
        assert_eq!(loaded.wait_needed, 3);
        assert_eq!(loaded.check_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = PoolConfig::from_file("/nonexistent/pool.toml");
        assert!(matches!(
            result,
            Err(crate::error::QuickDbError::ConfigError { .. })
        ));
    }
}
