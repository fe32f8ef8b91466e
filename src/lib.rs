//! rat_quickmongo - MongoDB链式ODM库
//!
//! 提供链式的查询、更新、删除接口，以及自动恢复连接的连接池管理器
//! 所有存储调用都经过连接池管理器的守护执行，网络故障时自动重连并重试一次

// 条件编译调试宏 - 只有在 debug 模式下才输出调试信息
#[cfg(debug_assertions)]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        rat_logger::debug!($($arg)*);
    };
}

#[cfg(not(debug_assertions))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        // 在 release 模式下不输出调试信息
    };
}

// 导出所有公共模块
pub mod adapter;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod odm;
pub mod pool;
pub mod types;

pub use mongodb::bson;

// 重新导出常用类型和函数
pub use adapter::{
    BulkWriteOutcome, ClientFactory, FindSpec, IndexSpec, MongoClientFactory, MongoStoreClient,
    Namespace, StoreClient, UpdateOutcome, WriteModel,
};
pub use config::{DbConfig, DbConfigBuilder, PoolConfigBuilder};
pub use context::Context;
pub use error::{QuickDbError, QuickDbResult, StoreErrorKind};
pub use model::{FieldMeta, IndexDefinition, Model, ModelMeta, Schema, SchemaCache, is_zero_value};
pub use odm::{
    BulkWrite, CacheEvent, CacheHandle, CacheModel, CommandResult, Db, DbCacheHandle, ModelCache,
    Processor, SortOrder, Statement, UpdateResult,
};
pub use pool::{HealthStatus, MetricsSnapshot, PoolConfig, PoolManager};
pub use types::*;

/// 库版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 库名称
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// 获取库信息
pub fn get_info() -> String {
    format!("{} v{}", NAME, VERSION)
}
