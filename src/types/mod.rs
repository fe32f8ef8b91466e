//! 核心类型定义
//!
//! 过滤文档、查询条件、字段选择器、更新文档和分页

pub mod filter;
pub mod mongo_builder;
pub mod paging;
pub mod query;
pub mod selector;
pub mod update_operations;

pub use filter::{Filter, PRIMARY_KEY, multiple};
pub use mongo_builder::MongoDbConnectionBuilder;
pub use paging::{DEFAULT_PAGE_SIZE, Paging};
pub use query::{Composite, Condition, Node, Query, is_query_format};
pub use selector::{Selector, SelectorMode};
pub use update_operations::{Update, UpdateInput};
