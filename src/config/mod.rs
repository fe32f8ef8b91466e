//! # 配置管理模块
//!
//! 提供配置类型、构建器和配置文件读写

pub mod builders;
pub mod core;

pub use builders::{DbConfigBuilder, PoolConfigBuilder};
pub use core::{DEFAULT_MAX_PAGE_SIZE, DEFAULT_PAGE_UPDATE_FIELD, DbConfig};
