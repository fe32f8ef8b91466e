//! 连接池管理器相关类型

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 一次完整健康检查的结果
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub is_healthy: bool,
    /// 必要探测步骤的总耗时
    pub latency: Duration,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// 运行指标
#[derive(Debug, Default)]
pub struct Metrics {
    total_checks: AtomicU64,
    failed_checks: AtomicU64,
    recovery_attempts: AtomicU64,
    successful_recoveries: AtomicU64,
    last_check_time: Mutex<Option<DateTime<Utc>>>,
    last_failure_time: Mutex<Option<DateTime<Utc>>>,
}

/// 指标快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_checks: u64,
    pub failed_checks: u64,
    pub recovery_attempts: u64,
    pub successful_recoveries: u64,
    pub last_check_time: Option<DateTime<Utc>>,
    pub last_failure_time: Option<DateTime<Utc>>,
}

impl Metrics {
    pub(crate) fn record_check(&self, healthy: bool, at: DateTime<Utc>) {
        self.total_checks.fetch_add(1, Ordering::Relaxed);
        *self.last_check_time.lock() = Some(at);
        if !healthy {
            self.failed_checks.fetch_add(1, Ordering::Relaxed);
            *self.last_failure_time.lock() = Some(at);
        }
    }

    pub(crate) fn record_recovery_attempt(&self) {
        self.recovery_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recovery_success(&self) {
        self.successful_recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_checks: self.total_checks.load(Ordering::Relaxed),
            failed_checks: self.failed_checks.load(Ordering::Relaxed),
            recovery_attempts: self.recovery_attempts.load(Ordering::Relaxed),
            successful_recoveries: self.successful_recoveries.load(Ordering::Relaxed),
            last_check_time: *self.last_check_time.lock(),
            last_failure_time: *self.last_failure_time.lock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_check_updates_failure_time() {
        let metrics = Metrics::default();
        let now = Utc::now();
        metrics.record_check(true, now);
        metrics.record_check(false, now);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_checks, 2);
        assert_eq!(snapshot.failed_checks, 1);
        assert_eq!(snapshot.last_check_time, Some(now));
        assert_eq!(snapshot.last_failure_time, Some(now));
    }
}
