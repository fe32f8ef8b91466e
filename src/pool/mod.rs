//! 连接池管理模块
//!
//! 单一活动客户端 + 后台健康检查 + 失效后退避重连和原子切换

pub mod config;
pub mod manager;
pub mod types;

pub use config::PoolConfig;
pub use manager::PoolManager;
pub use types::{HealthStatus, Metrics, MetricsSnapshot};
