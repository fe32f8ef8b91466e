//! # 配置构建器模块
//!
//! 提供配置类型的构建器实现，支持链式调用和验证

pub mod db_builder;
pub mod pool_builder;

pub use db_builder::DbConfigBuilder;
pub use pool_builder::PoolConfigBuilder;
