//! # 更新操作处理器

use mongodb::bson::Document;
use rat_logger::debug;
use serde::Serialize;

use crate::adapter::StoreClient;
use crate::error::{QuickDbError, QuickDbResult};
use crate::odm::statement::Statement;
use crate::types::update_operations;

/// 更新结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateResult {
    /// 受影响的记录数（匹配数，upsert 插入计为1）
    pub rows_affected: u64,
    /// 更新并返回模式下更新后的文档
    pub document: Option<Document>,
}

/// 执行更新
///
/// - 没有过滤条件时拒绝执行
/// - 语句标记为批量时更新全部匹配记录，只有语句显式要求时才 upsert
/// - 标记为更新并返回时使用 find-one-and-update，返回更新后的文档
/// - 否则只更新一条，`$setOnInsert` 非空或语句要求时启用 upsert
pub async fn cmd_update<C: StoreClient + ?Sized>(
    stmt: &Statement,
    client: &C,
) -> QuickDbResult<UpdateResult> {
    let ns = stmt.namespace()?;
    let input = stmt.value.as_ref().ok_or_else(|| QuickDbError::InvalidValue {
        message: "没有需要更新的内容".to_string(),
    })?;

    let (update, upsert) = update_operations::build(
        input,
        stmt.schema(),
        &stmt.selector,
        stmt.include_zero_value,
    )?;
    if update.is_empty() {
        return Err(QuickDbError::InvalidValue {
            message: "更新内容为空".to_string(),
        });
    }

    let filter = stmt.filter();
    if filter.is_empty() {
        return Err(QuickDbError::MissingWhereClause);
    }

    let update_doc = update.to_document();

    if stmt.multiple {
        debug!("批量更新: {} 条件={} 更新={} upsert={}", ns, filter, update, stmt.upsert);
        let outcome = client
            .update_many(&ns, filter.into_document(), update_doc, stmt.upsert)
            .await?;
        return Ok(UpdateResult {
            rows_affected: outcome.matched_count,
            document: None,
        });
    }

    let upsert = upsert || stmt.upsert;
    debug!("更新: {} 条件={} 更新={} upsert={}", ns, filter, update, upsert);

    if stmt.update_and_modify_model {
        let document = client
            .find_one_and_update(
                &ns,
                filter.into_document(),
                update_doc,
                upsert,
                stmt.projection(),
            )
            .await?;
        return Ok(UpdateResult {
            rows_affected: u64::from(document.is_some()),
            document,
        });
    }

    let outcome = client
        .update_one(&ns, filter.into_document(), update_doc, upsert)
        .await?;
    let upserted = u64::from(outcome.upserted_id.is_some());
    Ok(UpdateResult {
        rows_affected: outcome.matched_count + upserted,
        document: None,
    })
}
