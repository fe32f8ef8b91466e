//! # 删除操作处理器

use rat_logger::debug;

use crate::adapter::StoreClient;
use crate::error::{QuickDbError, QuickDbResult};
use crate::odm::statement::Statement;
use crate::types::multiple;

/// 删除匹配的记录，返回删除数量
///
/// 没有过滤条件时拒绝执行；主键为单个值时只删除一条
pub async fn cmd_delete<C: StoreClient + ?Sized>(stmt: &Statement, client: &C) -> QuickDbResult<u64> {
    let ns = stmt.namespace()?;
    let filter = stmt.filter();
    if filter.is_empty() {
        return Err(QuickDbError::MissingWhereClause);
    }

    if multiple(&filter) {
        debug!("批量删除: {} 条件={}", ns, filter);
        client.delete_many(&ns, filter.into_document()).await
    } else {
        debug!("删除单条记录: {} 条件={}", ns, filter);
        client.delete_one(&ns, filter.into_document()).await
    }
}
