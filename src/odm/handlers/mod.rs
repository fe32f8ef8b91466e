//! # 命令处理器模块
//!
//! 每个处理器接收已解析的语句和当前活动客户端，按操作类型分离实现

pub mod create_handler;
pub mod delete_handler;
pub mod read_handler;
pub mod update_handler;

pub use create_handler::cmd_create;
pub use delete_handler::cmd_delete;
pub use read_handler::{PageRequest, cmd_count, cmd_first, cmd_page, cmd_query, cmd_range};
pub use update_handler::{UpdateResult, cmd_update};
