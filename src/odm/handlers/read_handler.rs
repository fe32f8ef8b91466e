//! # 查询操作处理器

use mongodb::bson::Document;
use rat_logger::debug;

use crate::adapter::{FindSpec, StoreClient};
use crate::error::QuickDbResult;
use crate::odm::statement::Statement;

/// 分页查询参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
    /// 已知的总记录数，为0时重新统计
    pub record: usize,
}

/// 按语句查询全部匹配记录
pub async fn cmd_query<C: StoreClient + ?Sized>(
    stmt: &Statement,
    client: &C,
) -> QuickDbResult<Vec<Document>> {
    let ns = stmt.namespace()?;
    let filter = stmt.filter();
    crate::debug_log!("查询: {} 条件={}", ns, filter);
    client.find(&ns, filter.into_document(), stmt.find_spec()).await
}

/// 查询第一条匹配记录
pub async fn cmd_first<C: StoreClient + ?Sized>(
    stmt: &Statement,
    client: &C,
) -> QuickDbResult<Option<Document>> {
    let ns = stmt.namespace()?;
    let filter = stmt.filter();
    crate::debug_log!("查询单条: {} 条件={}", ns, filter);
    client.find_one(&ns, filter.into_document(), stmt.find_spec()).await
}

/// 统计匹配记录数
pub async fn cmd_count<C: StoreClient + ?Sized>(stmt: &Statement, client: &C) -> QuickDbResult<u64> {
    let ns = stmt.namespace()?;
    client
        .count_documents(&ns, stmt.filter().into_document())
        .await
}

/// 分页查询，返回当前页文档和总记录数
pub async fn cmd_page<C: StoreClient + ?Sized>(
    stmt: &Statement,
    client: &C,
    request: PageRequest,
) -> QuickDbResult<(Vec<Document>, usize)> {
    let ns = stmt.namespace()?;
    let filter = stmt.filter();

    let record = if request.record == 0 {
        let counted = client.count_documents(&ns, filter.clone().into_document()).await?;
        usize::try_from(counted).unwrap_or(usize::MAX)
    } else {
        request.record
    };

    let skip = request.page.saturating_sub(1).saturating_mul(request.size);
    debug!(
        "分页查询: {} 第{}页 每页{} 总数{}",
        ns, request.page, request.size, record
    );

    let spec = FindSpec {
        limit: Some(i64::try_from(request.size).unwrap_or(i64::MAX)),
        skip: Some(skip as u64),
        sort: stmt.sort(),
        projection: stmt.projection(),
    };
    let rows = client.find(&ns, filter.into_document(), spec).await?;
    Ok((rows, record))
}

/// 逐条遍历查询结果，回调返回 false 时停止
pub async fn cmd_range<C: StoreClient + ?Sized>(
    stmt: &Statement,
    client: &C,
    handle: &mut (dyn FnMut(Document) -> QuickDbResult<bool> + Send),
) -> QuickDbResult<u64> {
    let ns = stmt.namespace()?;
    client
        .find_each(&ns, stmt.filter().into_document(), stmt.find_spec(), handle)
        .await
}
