//! Model trait 定义模块
//!
//! 定义模型的核心接口

use mongodb::bson::{self, Bson, Document};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{QuickDbError, QuickDbResult};
use crate::model::field_types::ModelMeta;

/// 模型特征
///
/// 所有模型都必须实现这个特征
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 获取模型元数据
    fn meta() -> ModelMeta;

    /// 获取集合名
    fn collection_name() -> String {
        Self::meta().collection_name
    }

    /// 仅在 upsert 插入时写入的字段
    ///
    /// 返回的键使用模型字段名，默认没有
    fn set_on_insert(&self) -> QuickDbResult<Option<Document>> {
        Ok(None)
    }

    /// 序列化为以模型字段名为键的文档
    fn to_document(&self) -> QuickDbResult<Document> {
        match bson::to_bson(self)? {
            Bson::Document(doc) => Ok(doc),
            other => Err(QuickDbError::InvalidValue {
                message: format!("模型必须序列化为文档，实际为 {:?}", other.element_type()),
            }),
        }
    }

    /// 读取主键值
    fn primary_key(&self) -> QuickDbResult<Option<Bson>> {
        let meta = Self::meta();
        let doc = self.to_document()?;
        let primary = meta
            .fields
            .iter()
            .find(|f| f.primary)
            .or_else(|| meta.fields.iter().find(|f| f.db_name == "_id"));
        Ok(primary.and_then(|f| doc.get(&f.name).cloned()))
    }
}
