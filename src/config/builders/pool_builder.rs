//! # 连接池配置构建器模块
//!
//! 提供连接池管理器配置的构建器实现，支持链式调用和验证

use crate::error::QuickDbError;
use crate::pool::PoolConfig;
use rat_logger::info;
use std::time::Duration;

/// 连接池配置构建器
///
/// 未设置的项使用 `PoolConfig::default()` 中的值
#[derive(Debug, Default)]
pub struct PoolConfigBuilder {
    check_interval: Option<Duration>,
    check_timeout: Option<Duration>,
    max_retries: Option<u32>,
    retry_delay: Option<Duration>,
    max_backoff: Option<Duration>,
    backoff_base: Option<u32>,
    failure_threshold: Option<u32>,
    stabilization_delay: Option<Duration>,
    close_delay: Option<Duration>,
    close_timeout: Option<Duration>,
    quick_check_timeout: Option<Duration>,
    wait_interval: Option<Duration>,
    wait_needed: Option<u32>,
    warmup_count: Option<u32>,
    warmup_interval: Option<Duration>,
    execute_wait_timeout: Option<Duration>,
    recover_timeout: Option<Duration>,
    health_cache_ttl: Option<Duration>,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl PoolConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置健康检查间隔
    ///
    /// # 参数
    ///
    /// * `interval` - 健康检查间隔
    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = Some(interval);
        self
    }

    /// 设置单次健康检查超时
    pub fn check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = Some(timeout);
        self
    }

    /// 设置恢复时的最大重试次数
    ///
    /// # 参数
    ///
    /// * `retries` - 首次尝试之外的重试次数
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// 设置重试基础延迟
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// 设置退避上限
    pub fn max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = Some(max);
        self
    }

    /// 设置退避底数
    pub fn backoff_base(mut self, base: u32) -> Self {
        self.backoff_base = Some(base);
        self
    }

    /// 设置触发稳定等待的连续失败次数
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    /// 设置稳定等待时长
    pub fn stabilization_delay(mut self, delay: Duration) -> Self {
        self.stabilization_delay = Some(delay);
        self
    }

    /// 设置旧客户端的延迟关闭时长
    ///
    /// # 参数
    ///
    /// * `delay` - 切换后等待进行中的操作结束的时长
    pub fn close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = Some(delay);
        self
    }

    /// 设置关闭客户端的超时
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = Some(timeout);
        self
    }

    /// 设置快速探测超时
    pub fn quick_check_timeout(mut self, timeout: Duration) -> Self {
        self.quick_check_timeout = Some(timeout);
        self
    }

    /// 设置等待健康时的轮询间隔
    pub fn wait_interval(mut self, interval: Duration) -> Self {
        self.wait_interval = Some(interval);
        self
    }

    /// 设置等待健康时需要的连续成功次数
    pub fn wait_needed(mut self, needed: u32) -> Self {
        self.wait_needed = Some(needed);
        self
    }

    /// 设置预热命令次数和间隔
    ///
    /// # 参数
    ///
    /// * `count` - 预热命令次数
    /// * `interval` - 两次命令之间的间隔
    pub fn warmup(mut self, count: u32, interval: Duration) -> Self {
        self.warmup_count = Some(count);
        self.warmup_interval = Some(interval);
        self
    }

    /// 设置守护执行等待恢复的超时
    pub fn execute_wait_timeout(mut self, timeout: Duration) -> Self {
        self.execute_wait_timeout = Some(timeout);
        self
    }

    /// 设置批量操作前等待恢复的超时
    pub fn recover_timeout(mut self, timeout: Duration) -> Self {
        self.recover_timeout = Some(timeout);
        self
    }

    /// 设置快速探测结果缓存时长，`Duration::ZERO` 关闭缓存
    pub fn health_cache_ttl(mut self, ttl: Duration) -> Self {
        self.health_cache_ttl = Some(ttl);
        self
    }

    /// 构建连接池配置
    ///
    /// # 错误
    ///
    /// 间隔或超时为零、连续成功次数为零、退避上限小于基础延迟时返回配置错误
    pub fn build(self) -> Result<PoolConfig, QuickDbError> {
        let mut config = PoolConfig::default();

        if let Some(v) = self.check_interval {
            config.check_interval_ms = millis(v);
        }
        if let Some(v) = self.check_timeout {
            config.check_timeout_ms = millis(v);
        }
        if let Some(v) = self.max_retries {
            config.max_retries = v;
        }
        if let Some(v) = self.retry_delay {
            config.retry_delay_ms = millis(v);
        }
        if let Some(v) = self.max_backoff {
            config.max_backoff_ms = millis(v);
        }
        if let Some(v) = self.backoff_base {
            config.backoff_base = v;
        }
        if let Some(v) = self.failure_threshold {
            config.failure_threshold = v;
        }
        if let Some(v) = self.stabilization_delay {
            config.stabilization_delay_ms = millis(v);
        }
        if let Some(v) = self.close_delay {
            config.close_delay_ms = millis(v);
        }
        if let Some(v) = self.close_timeout {
            config.close_timeout_ms = millis(v);
        }
        if let Some(v) = self.quick_check_timeout {
            config.quick_check_timeout_ms = millis(v);
        }
        if let Some(v) = self.wait_interval {
            config.wait_interval_ms = millis(v);
        }
        if let Some(v) = self.wait_needed {
            config.wait_needed = v;
        }
        if let Some(v) = self.warmup_count {
            config.warmup_count = v;
        }
        if let Some(v) = self.warmup_interval {
            config.warmup_interval_ms = millis(v);
        }
        if let Some(v) = self.execute_wait_timeout {
            config.execute_wait_timeout_ms = millis(v);
        }
        if let Some(v) = self.recover_timeout {
            config.recover_timeout_ms = millis(v);
        }
        if let Some(v) = self.health_cache_ttl {
            config.health_cache_ttl_ms = millis(v);
        }

        // 验证配置的合理性
        if config.check_interval_ms == 0 {
            return Err(crate::quick_error!(config, "健康检查间隔不能为零"));
        }

        if config.check_timeout_ms == 0 || config.quick_check_timeout_ms == 0 {
            return Err(crate::quick_error!(config, "健康检查超时不能为零"));
        }

        if config.wait_interval_ms == 0 {
            return Err(crate::quick_error!(config, "等待健康的轮询间隔不能为零"));
        }

        if config.wait_needed == 0 {
            return Err(crate::quick_error!(config, "连续成功次数至少为1"));
        }

        if config.max_backoff_ms < config.retry_delay_ms {
            return Err(crate::quick_error!(config, "退避上限不能小于重试基础延迟"));
        }

        info!(
            "创建连接池配置: 检查间隔={}ms, 最大重试={}, 重试延迟={}ms",
            config.check_interval_ms, config.max_retries, config.retry_delay_ms
        );

        Ok(config)
    }
}
