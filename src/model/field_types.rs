//! 模型元数据定义
//!
//! 字段名到数据库字段名的映射、主键标记以及索引声明

use serde::{Deserialize, Serialize};

/// 字段元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    /// 模型字段名（序列化后的键名）
    pub name: String,
    /// 数据库字段名
    pub db_name: String,
    /// 是否为主键
    pub primary: bool,
}

impl FieldMeta {
    /// 创建字段元数据
    pub fn new(name: impl Into<String>, db_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_name: db_name.into(),
            primary: false,
        }
    }

    /// 数据库字段名与模型字段名相同
    pub fn plain(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), name)
    }

    /// 标记为主键
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }
}

/// 索引定义
///
/// 字段名以 `-` 开头表示降序
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// 索引字段
    pub fields: Vec<String>,
    /// 是否唯一索引
    pub unique: bool,
    /// 是否稀疏索引
    pub sparse: bool,
    /// 索引名称
    pub name: Option<String>,
    /// 部分索引条件，使用 where 字符串语法，例如 `"lv > int(10)"`
    pub partial: Vec<String>,
    /// TTL 过期时间（秒）
    pub expire_after_secs: Option<u64>,
}

impl IndexDefinition {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn partial(mut self, condition: impl Into<String>) -> Self {
        self.partial.push(condition.into());
        self
    }

    pub fn expire_after_secs(mut self, secs: u64) -> Self {
        self.expire_after_secs = Some(secs);
        self
    }
}

/// 模型元数据
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMeta {
    /// 集合名
    pub collection_name: String,
    /// 字段定义（按声明顺序）
    pub fields: Vec<FieldMeta>,
    /// 索引定义
    pub indexes: Vec<IndexDefinition>,
    /// 模型描述
    pub description: Option<String>,
}

impl ModelMeta {
    pub fn new(collection_name: impl Into<String>) -> Self {
        Self {
            collection_name: collection_name.into(),
            ..Default::default()
        }
    }

    pub fn field(mut self, field: FieldMeta) -> Self {
        self.fields.push(field);
        self
    }

    pub fn index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }
}
