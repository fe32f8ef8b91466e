//! 存储客户端边界
//!
//! 连接池管理器和命令层只通过这里的 trait 访问存储，
//! 生产实现位于 `mongodb` 子模块

use async_trait::async_trait;
use ::mongodb::bson::{Bson, Document};
use std::time::Duration;

use crate::error::QuickDbResult;

pub mod mongodb;

pub use self::mongodb::{MongoClientFactory, MongoStoreClient};

/// 集合地址
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// 查询选项
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    pub limit: Option<i64>,
    pub skip: Option<u64>,
    pub sort: Option<Document>,
    pub projection: Option<Document>,
}

/// 更新结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Bson>,
}

/// 索引声明
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexSpec {
    pub keys: Document,
    pub name: Option<String>,
    pub unique: bool,
    pub sparse: bool,
    pub partial_filter: Option<Document>,
    pub expire_after: Option<Duration>,
}

/// 批量写入的单个操作
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    InsertOne {
        document: Document,
    },
    UpdateOne {
        filter: Document,
        update: Document,
        upsert: bool,
    },
    UpdateMany {
        filter: Document,
        update: Document,
        upsert: bool,
    },
    DeleteOne {
        filter: Document,
    },
    DeleteMany {
        filter: Document,
    },
}

/// 批量写入结果
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct BulkWriteOutcome {
    pub inserted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub deleted_count: u64,
    pub upserted_count: u64,
}

/// 存储客户端
///
/// 实现必须可以在多个任务间共享；超时由调用方控制
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    /// 轻量可达性探测
    async fn ping(&self) -> QuickDbResult<()>;

    /// 在指定数据库上执行命令
    async fn run_command(&self, database: &str, command: Document) -> QuickDbResult<Document>;

    /// 插入单个文档，返回插入的主键
    async fn insert_one(&self, ns: &Namespace, document: Document) -> QuickDbResult<Bson>;

    /// 插入多个文档，返回插入数量
    async fn insert_many(&self, ns: &Namespace, documents: Vec<Document>) -> QuickDbResult<u64>;

    async fn update_one(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> QuickDbResult<UpdateOutcome>;

    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> QuickDbResult<UpdateOutcome>;

    /// 更新并返回更新后的文档，没有匹配时返回 None
    async fn find_one_and_update(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
        projection: Option<Document>,
    ) -> QuickDbResult<Option<Document>>;

    async fn delete_one(&self, ns: &Namespace, filter: Document) -> QuickDbResult<u64>;

    async fn delete_many(&self, ns: &Namespace, filter: Document) -> QuickDbResult<u64>;

    async fn find(&self, ns: &Namespace, filter: Document, spec: FindSpec) -> QuickDbResult<Vec<Document>>;

    async fn find_one(
        &self,
        ns: &Namespace,
        filter: Document,
        spec: FindSpec,
    ) -> QuickDbResult<Option<Document>>;

    /// 逐条遍历查询结果，回调返回 false 时停止，返回已遍历数量
    async fn find_each(
        &self,
        ns: &Namespace,
        filter: Document,
        spec: FindSpec,
        handle: &mut (dyn FnMut(Document) -> QuickDbResult<bool> + Send),
    ) -> QuickDbResult<u64>;

    async fn count_documents(&self, ns: &Namespace, filter: Document) -> QuickDbResult<u64>;

    async fn create_index(&self, ns: &Namespace, index: IndexSpec) -> QuickDbResult<()>;

    async fn bulk_write(
        &self,
        ns: &Namespace,
        models: Vec<WriteModel>,
        ordered: bool,
    ) -> QuickDbResult<BulkWriteOutcome>;

    /// 关闭客户端，释放连接
    async fn disconnect(&self) -> QuickDbResult<()>;
}

/// 客户端工厂
///
/// 连接池管理器在恢复时用原始地址重新构建客户端
#[async_trait]
pub trait ClientFactory: Send + Sync + 'static {
    type Client: StoreClient;

    async fn connect(&self, uri: &str) -> QuickDbResult<Self::Client>;
}
