//! # ODM层模块
//!
//! 链式入口、语句解析、命令分发和各类终结操作
//! 所有存储调用都经过连接池管理器的守护执行

pub mod bulk_write;
pub mod cache;
pub mod callbacks;
pub mod db;
pub mod finisher;
pub mod handlers;
pub mod migrator;
pub mod statement;

pub use bulk_write::{BulkWrite, UpdateFilter};
pub use cache::{CacheEvent, CacheHandle, CacheModel, DbCacheHandle, ModelCache};
pub use callbacks::{CommandResult, Processor, call};
pub use db::Db;
pub use handlers::{PageRequest, UpdateResult};
pub use migrator::index_spec;
pub use statement::{SortOrder, Statement};
