//! # 插入操作处理器

use mongodb::bson::Bson;
use rat_logger::debug;

use crate::adapter::StoreClient;
use crate::error::{QuickDbError, QuickDbResult};
use crate::odm::statement::Statement;

/// 插入语句中的文档
///
/// 单个文档返回插入的主键，多个文档返回插入数量
pub async fn cmd_create<C: StoreClient + ?Sized>(stmt: &Statement, client: &C) -> QuickDbResult<Bson> {
    let ns = stmt.namespace()?;
    match stmt.documents.as_slice() {
        [] => Err(QuickDbError::InvalidValue {
            message: "没有需要插入的文档".to_string(),
        }),
        [document] => {
            debug!("插入单条记录: {}", ns);
            client.insert_one(&ns, document.clone()).await
        }
        documents => {
            debug!("批量插入记录: {} x{}", ns, documents.len());
            let inserted = client.insert_many(&ns, documents.to_vec()).await?;
            Ok(Bson::Int64(inserted as i64))
        }
    }
}
