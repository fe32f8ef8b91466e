//! MongoDB适配器模块
//!
//! - adapter.rs: 客户端构建参数与工厂
//! - operations.rs: StoreClient trait实现
//! - utils.rs: 地址规范化与错误分类

pub mod adapter;
pub mod operations;
pub mod utils;

pub use adapter::{MongoClientFactory, MongoClientSettings, MongoStoreClient};
pub use utils::{classify_driver_error, count_hosts, prepare_uri};
