//! 模型结构解析与缓存
//!
//! 每种模型类型只解析一次，缓存由调用方持有并注入

use dashmap::DashMap;
use mongodb::bson::{Bson, Document};
use once_cell::sync::OnceCell;
use rat_logger::debug;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{QuickDbError, QuickDbResult};
use crate::model::field_types::{FieldMeta, IndexDefinition, ModelMeta};
use crate::model::traits::Model;

/// 已解析的模型结构
#[derive(Debug, Clone)]
pub struct Schema {
    /// 模型类型名
    pub name: String,
    /// 集合名
    pub table: String,
    /// 字段（按声明顺序）
    pub fields: Vec<FieldMeta>,
    /// 索引定义
    pub indexes: Vec<IndexDefinition>,
    by_name: HashMap<String, usize>,
    by_db_name: HashMap<String, usize>,
}

impl Schema {
    /// 从模型元数据构建
    pub fn from_meta(name: impl Into<String>, meta: ModelMeta) -> QuickDbResult<Self> {
        let name = name.into();
        let mut by_name = HashMap::new();
        let mut by_db_name = HashMap::new();
        for (idx, field) in meta.fields.iter().enumerate() {
            if by_name.insert(field.name.clone(), idx).is_some() {
                return Err(QuickDbError::ValidationError {
                    field: field.name.clone(),
                    message: format!("模型 {} 中字段重复声明", name),
                });
            }
            if by_db_name.insert(field.db_name.clone(), idx).is_some() {
                return Err(QuickDbError::ValidationError {
                    field: field.db_name.clone(),
                    message: format!("模型 {} 中数据库字段名重复", name),
                });
            }
        }
        Ok(Self {
            name,
            table: meta.collection_name,
            fields: meta.fields,
            indexes: meta.indexes,
            by_name,
            by_db_name,
        })
    }

    /// 解析模型类型
    pub fn of<T: Model>() -> QuickDbResult<Self> {
        let type_name = std::any::type_name::<T>();
        let short = type_name.rsplit("::").next().unwrap_or(type_name);
        Self::from_meta(short, T::meta())
    }

    /// 按数据库字段名或模型字段名查找字段，数据库字段名优先
    pub fn lookup_field(&self, name: &str) -> Option<&FieldMeta> {
        self.by_db_name
            .get(name)
            .or_else(|| self.by_name.get(name))
            .map(|&idx| &self.fields[idx])
    }

    /// 查询字段对应的数据库字段名，未声明的字段原样返回
    pub fn field_db_name<'a>(&'a self, name: &'a str) -> &'a str {
        match self.lookup_field(name) {
            Some(field) => &field.db_name,
            None => name,
        }
    }

    /// 主键字段
    pub fn primary_field(&self) -> Option<&FieldMeta> {
        self.fields
            .iter()
            .find(|f| f.primary)
            .or_else(|| self.by_db_name.get("_id").map(|&idx| &self.fields[idx]))
    }

    /// 模型文档转换为存储文档（键替换为数据库字段名）
    pub fn to_store_document(&self, doc: Document) -> Document {
        doc.into_iter()
            .map(|(k, v)| {
                let key = match self.by_name.get(&k) {
                    Some(&idx) => self.fields[idx].db_name.clone(),
                    None => k,
                };
                (key, v)
            })
            .collect()
    }

    /// 存储文档转换为模型文档（键替换为模型字段名）
    pub fn to_model_document(&self, doc: Document) -> Document {
        doc.into_iter()
            .map(|(k, v)| {
                let key = match self.by_db_name.get(&k) {
                    Some(&idx) => self.fields[idx].name.clone(),
                    None => k,
                };
                (key, v)
            })
            .collect()
    }
}

/// 判断值是否为其类型的零值
///
/// 空字符串、数值0、false、空数组、空文档、null、纪元时间和全零ObjectId
pub fn is_zero_value(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => true,
        Bson::String(s) => s.is_empty(),
        Bson::Int32(v) => *v == 0,
        Bson::Int64(v) => *v == 0,
        Bson::Double(v) => *v == 0.0,
        Bson::Boolean(v) => !*v,
        Bson::Array(arr) => arr.is_empty(),
        Bson::Document(doc) => doc.is_empty(),
        Bson::DateTime(dt) => dt.timestamp_millis() == 0,
        Bson::ObjectId(oid) => oid.bytes() == [0u8; 12],
        Bson::Binary(bin) => bin.bytes.is_empty(),
        _ => false,
    }
}

/// 模型结构缓存
///
/// 以类型标识为键，同一类型只会解析一次
#[derive(Debug, Clone, Default)]
pub struct SchemaCache {
    inner: Arc<DashMap<TypeId, Arc<OnceCell<Arc<Schema>>>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取或解析模型结构
    pub fn get_or_parse<T: Model>(&self) -> QuickDbResult<Arc<Schema>> {
        let cell = self
            .inner
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        cell.get_or_try_init(|| {
            let schema = Schema::of::<T>()?;
            debug!("解析模型结构: {} -> {}", schema.name, schema.table);
            Ok(Arc::new(schema))
        })
        .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
