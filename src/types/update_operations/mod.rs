//! 更新文档构建
//!
//! 把模型值、映射或预构建的更新文档统一转换为按操作符分桶的更新文档，
//! 并应用字段选择器和零值规则

use mongodb::bson::{self, Bson, Document};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::{QuickDbError, QuickDbResult};
use crate::model::{Model, Schema, is_zero_value};
use crate::types::selector::Selector;

pub const SET: &str = "$set";
pub const INC: &str = "$inc";
pub const UNSET: &str = "$unset";
pub const SET_ON_INSERT: &str = "$setOnInsert";

/// 参与 `$setOnInsert` 冲突检查的操作符
const PROJECTION_OPERATORS: &[&str] = &[SET, INC];

/// 嵌套字段分隔符
const FIELD_SPLIT: char = '.';

fn operator(op: &str) -> String {
    if op.starts_with('$') {
        op.to_string()
    } else {
        format!("${}", op)
    }
}

/// 更新文档
///
/// 操作符到字段文档的映射，保持操作符插入顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    buckets: Vec<(String, Document)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以映射内容作为 `$set`
    pub fn from_map(values: Document) -> Self {
        let mut update = Self::new();
        update.mset(values);
        update
    }

    fn bucket_mut(&mut self, op: &str) -> &mut Document {
        let idx = match self.buckets.iter().position(|(k, _)| k == op) {
            Some(idx) => idx,
            None => {
                self.buckets.push((op.to_string(), Document::new()));
                self.buckets.len() - 1
            }
        };
        &mut self.buckets[idx].1
    }

    /// 指定操作符下的字段文档
    pub fn bucket(&self, op: &str) -> Option<&Document> {
        let op = operator(op);
        self.buckets.iter().find(|(k, _)| *k == op).map(|(_, d)| d)
    }

    /// 移除整个操作符桶
    pub fn remove_bucket(&mut self, op: &str) -> Option<Document> {
        let op = operator(op);
        let idx = self.buckets.iter().position(|(k, _)| *k == op)?;
        Some(self.buckets.remove(idx).1)
    }

    /// 任意操作符
    pub fn any(&mut self, op: &str, key: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        let op = operator(op);
        self.bucket_mut(&op).insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        self.any(SET, key, value)
    }

    pub fn inc(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        self.any(INC, key, value)
    }

    pub fn unset(&mut self, key: impl Into<String>) -> &mut Self {
        self.any(UNSET, key, 1)
    }

    pub fn set_on_insert(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        self.any(SET_ON_INSERT, key, value)
    }

    pub fn min(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        self.any("$min", key, value)
    }

    pub fn max(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        self.any("$max", key, value)
    }

    pub fn pop(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        self.any("$pop", key, value)
    }

    pub fn pull(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        self.any("$pull", key, value)
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        self.any("$push", key, value)
    }

    /// 批量 `$set`
    pub fn mset(&mut self, values: Document) -> &mut Self {
        let bucket = self.bucket_mut(SET);
        for (k, v) in values {
            bucket.insert(k, v);
        }
        self
    }

    /// 把可序列化的值展开到指定操作符下
    pub fn convert<T: Serialize>(&mut self, op: &str, value: &T) -> QuickDbResult<&mut Self> {
        let values = match bson::to_bson(value)? {
            Bson::Document(doc) => doc,
            other => {
                return Err(QuickDbError::UnsupportedType {
                    kind: format!("{:?}", other.element_type()),
                });
            }
        };
        let op = operator(op);
        let bucket = self.bucket_mut(&op);
        for (k, v) in values {
            bucket.insert(k, v);
        }
        Ok(self)
    }

    pub fn has(&self, op: &str, key: &str) -> bool {
        self.bucket(op).is_some_and(|d| d.contains_key(key))
    }

    pub fn get(&self, op: &str, key: &str) -> Option<&Bson> {
        self.bucket(op).and_then(|d| d.get(key))
    }

    pub fn remove(&mut self, op: &str, key: &str) -> Option<Bson> {
        let op = operator(op);
        self.buckets
            .iter_mut()
            .find(|(k, _)| *k == op)
            .and_then(|(_, d)| d.remove(key))
    }

    /// `$set` 与 `$inc` 涉及的全部字段
    pub fn projection(&self) -> HashSet<String> {
        let mut keys = HashSet::new();
        for op in PROJECTION_OPERATORS {
            if let Some(bucket) = self.bucket(op) {
                keys.extend(bucket.keys().cloned());
            }
        }
        keys
    }

    /// 字段名翻译为数据库字段名，嵌套路径和未声明字段原样保留
    pub fn transform(&self, schema: &Schema) -> Update {
        let buckets = self
            .buckets
            .iter()
            .map(|(op, fields)| {
                let translated: Document = fields
                    .iter()
                    .map(|(k, v)| {
                        let key = if k.contains(FIELD_SPLIT) {
                            k.clone()
                        } else {
                            schema.field_db_name(k).to_string()
                        };
                        (key, v.clone())
                    })
                    .collect();
                (op.clone(), translated)
            })
            .collect();
        Update { buckets }
    }

    /// 空的操作符桶不计入
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|(_, d)| d.is_empty())
    }

    /// 转换为驱动使用的更新文档，空桶被丢弃
    pub fn to_document(&self) -> Document {
        self.buckets
            .iter()
            .filter(|(_, d)| !d.is_empty())
            .map(|(op, d)| (op.clone(), Bson::Document(d.clone())))
            .collect()
    }

    /// 重新过滤 `$setOnInsert`，去掉已在 `$set`/`$inc` 中出现的字段
    ///
    /// 过滤后为空则移除该桶，返回是否仍有插入专用字段
    fn filter_set_on_insert(&mut self) -> bool {
        let Some(pending) = self.remove_bucket(SET_ON_INSERT) else {
            return false;
        };
        let taken = self.projection();
        let kept: Document = pending
            .into_iter()
            .filter(|(k, _)| !taken.contains(k))
            .collect();
        if kept.is_empty() {
            return false;
        }
        self.buckets.push((SET_ON_INSERT.to_string(), kept));
        true
    }
}

impl std::fmt::Display for Update {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Bson::Document(self.to_document()).into_relaxed_extjson())
    }
}

/// 更新构建的输入形态
#[derive(Debug, Clone)]
pub enum UpdateInput {
    /// 模型值，键为模型字段名
    Model {
        doc: Document,
        set_on_insert: Option<Document>,
    },
    /// 映射，普通键按 `$set` 处理，`$` 开头的键按操作符处理
    Map(Document),
    /// 预构建的更新文档，原样使用
    Update(Update),
}

impl UpdateInput {
    /// 从模型值构建
    pub fn from_model<T: Model>(model: &T) -> QuickDbResult<Self> {
        Ok(UpdateInput::Model {
            doc: model.to_document()?,
            set_on_insert: model.set_on_insert()?,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UpdateInput::Model { .. } => "model",
            UpdateInput::Map(_) => "map",
            UpdateInput::Update(_) => "update",
        }
    }
}

impl From<Update> for UpdateInput {
    fn from(update: Update) -> Self {
        UpdateInput::Update(update)
    }
}

impl From<Document> for UpdateInput {
    fn from(doc: Document) -> Self {
        UpdateInput::Map(doc)
    }
}

impl<V: Into<Bson>> From<HashMap<String, V>> for UpdateInput {
    fn from(map: HashMap<String, V>) -> Self {
        UpdateInput::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl TryFrom<Bson> for UpdateInput {
    type Error = QuickDbError;

    fn try_from(value: Bson) -> Result<Self, Self::Error> {
        match value {
            Bson::Document(doc) => Ok(UpdateInput::Map(doc)),
            other => Err(QuickDbError::UnsupportedType {
                kind: format!("{:?}", other.element_type()),
            }),
        }
    }
}

fn db_key(schema: Option<&Schema>, key: &str) -> String {
    match schema {
        Some(schema) if !key.contains(FIELD_SPLIT) => schema.field_db_name(key).to_string(),
        _ => key.to_string(),
    }
}

fn map_admits(schema: Option<&Schema>, selector: &Selector, key: &str) -> bool {
    match schema.and_then(|s| s.lookup_field(key)) {
        Some(field) => selector.admits(field, false),
        None => selector.is(key, false),
    }
}

/// 构建更新文档
///
/// 返回更新文档以及是否需要 upsert（`$setOnInsert` 过滤后非空）
pub fn build(
    input: &UpdateInput,
    schema: Option<&Schema>,
    selector: &Selector,
    include_zero_value: bool,
) -> QuickDbResult<(Update, bool)> {
    let mut update = Update::new();
    match input {
        UpdateInput::Update(prebuilt) => {
            update = match schema {
                Some(schema) => prebuilt.transform(schema),
                None => prebuilt.clone(),
            };
        }
        UpdateInput::Map(values) => {
            for (key, value) in values {
                if key.starts_with('$') {
                    let Bson::Document(fields) = value else {
                        return Err(QuickDbError::UnsupportedType {
                            kind: format!("{} -> {:?}", key, value.element_type()),
                        });
                    };
                    for (field, v) in fields {
                        update.any(key, db_key(schema, field), v.clone());
                    }
                } else if map_admits(schema, selector, key) {
                    update.set(db_key(schema, key), value.clone());
                }
            }
        }
        UpdateInput::Model { doc, set_on_insert } => {
            let schema = schema.ok_or_else(|| QuickDbError::ValidationError {
                field: "schema".to_string(),
                message: "按模型更新时必须提供模型结构".to_string(),
            })?;
            for field in &schema.fields {
                if field.primary || field.db_name == crate::types::filter::PRIMARY_KEY {
                    continue;
                }
                let value = doc.get(&field.name).cloned().unwrap_or(Bson::Null);
                let zero = is_zero_value(&value);
                if selector.admits(field, zero && !include_zero_value) {
                    update.set(field.db_name.clone(), value);
                }
            }
            if let Some(values) = set_on_insert {
                for (k, v) in values {
                    update.set_on_insert(db_key(Some(schema), k), v.clone());
                }
            }
        }
    }
    let upsert = update.filter_set_on_insert();
    Ok((update, upsert))
}
