//! # 数据库入口
//!
//! `Db` 是对外的链式入口。每个链式方法都返回一个新的 `Db`，
//! 其中的语句是独立复制的，不会影响调用者手里的实例，
//! 因此同一个 `Db` 可以在多个任务中并发使用。

use mongodb::bson::Bson;
use parking_lot::Mutex;
use rat_logger::info;
use std::sync::Arc;

use super::statement::Statement;
use crate::adapter::{ClientFactory, MongoClientFactory};
use crate::config::DbConfig;
use crate::context::Context;
use crate::error::{QuickDbError, QuickDbResult};
use crate::model::{Model, Schema, SchemaCache};
use crate::pool::PoolManager;
use crate::types::{Condition, Node};

pub(crate) struct DbCore<F: ClientFactory> {
    pub(crate) pool: PoolManager<F>,
    pub(crate) config: DbConfig,
    pub(crate) schemas: SchemaCache,
    /// `start` 时需要迁移索引的模型
    pub(crate) models: Mutex<Vec<Arc<Schema>>>,
}

/// 数据库入口
pub struct Db<F: ClientFactory = MongoClientFactory> {
    pub(crate) core: Arc<DbCore<F>>,
    pub(crate) statement: Statement,
    pub(crate) error: Option<QuickDbError>,
}

impl<F: ClientFactory> Clone for Db<F> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            statement: self.statement.clone(),
            error: self.error.clone(),
        }
    }
}

impl<F: ClientFactory> std::fmt::Debug for Db<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("statement", &self.statement)
            .field("error", &self.error)
            .finish()
    }
}

impl Db<MongoClientFactory> {
    /// 按配置连接MongoDB并启动健康检查
    pub async fn connect(config: DbConfig) -> QuickDbResult<Self> {
        Self::open(MongoClientFactory::default(), config).await
    }
}

impl<F: ClientFactory> Db<F> {
    /// 使用已创建的连接池管理器
    pub fn new(pool: PoolManager<F>, config: DbConfig) -> Self {
        Self::with_schema_cache(pool, config, SchemaCache::new())
    }

    /// 使用已创建的连接池管理器和调用方持有的模型结构缓存
    pub fn with_schema_cache(pool: PoolManager<F>, config: DbConfig, schemas: SchemaCache) -> Self {
        let statement = Statement::new(config.database.clone());
        Self {
            core: Arc::new(DbCore {
                pool,
                config,
                schemas,
                models: Mutex::new(Vec::new()),
            }),
            statement,
            error: None,
        }
    }

    /// 建立初始连接并启动后台健康检查
    ///
    /// 初始连接失败直接返回错误
    pub async fn open(factory: F, config: DbConfig) -> QuickDbResult<Self> {
        let pool = PoolManager::new(factory, config.uri.clone(), config.pool.clone()).await?;
        pool.start(&Context::background());
        info!("数据库已打开: {}", config.database);
        Ok(Self::new(pool, config))
    }

    /// 停止健康检查并关闭连接
    pub async fn close(&self) -> QuickDbResult<()> {
        self.core.pool.close().await
    }

    pub fn pool(&self) -> &PoolManager<F> {
        &self.core.pool
    }

    pub fn config(&self) -> &DbConfig {
        &self.core.config
    }

    pub fn schema_cache(&self) -> &SchemaCache {
        &self.core.schemas
    }

    /// 链式调用过程中记录的错误
    pub fn error(&self) -> Option<&QuickDbError> {
        self.error.as_ref()
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// 复制出新的实例并修改其语句
    ///
    /// 已有错误时不再修改；修改失败时把错误记录到新实例上
    fn chain(&self, apply: impl FnOnce(&mut Statement) -> QuickDbResult<()>) -> Self {
        let mut next = self.clone();
        if next.error.is_none() {
            if let Err(e) = apply(&mut next.statement) {
                next.error = Some(e);
            }
        }
        next
    }

    /// 全新语句的会话，保留数据库名和上下文
    pub fn session(&self) -> Self {
        let mut statement = Statement::new(self.statement.database.clone());
        statement.context = self.statement.context.clone();
        Self {
            core: self.core.clone(),
            statement,
            error: None,
        }
    }

    /// 切换数据库
    pub fn database(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.chain(move |stmt| {
            stmt.database = name;
            Ok(())
        })
    }

    /// 绑定调用上下文
    pub fn with_context(&self, ctx: Context) -> Self {
        self.chain(move |stmt| {
            stmt.context = ctx;
            Ok(())
        })
    }

    /// 指定集合名
    pub fn table(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.chain(move |stmt| {
            stmt.table = Some(name);
            Ok(())
        })
    }

    /// 绑定模型，字段名按模型结构翻译
    pub fn model<T: Model>(&self) -> Self {
        let schemas = &self.core.schemas;
        self.chain(|stmt| {
            stmt.schema = Some(schemas.get_or_parse::<T>()?);
            Ok(())
        })
    }

    /// 绑定模型，并让更新返回更新后的文档
    pub fn model_modify<T: Model>(&self) -> Self {
        self.model::<T>().chain(|stmt| {
            stmt.update_and_modify_model = true;
            Ok(())
        })
    }

    /// 添加条件，见 `Query::where_clause`
    pub fn where_clause(&self, condition: impl Into<Condition>, args: Vec<Bson>) -> Self {
        let condition = condition.into();
        self.chain(move |stmt| {
            stmt.query.where_clause(condition, args);
            Ok(())
        })
    }

    pub fn eq(&self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.node(Node::eq(key, value))
    }

    pub fn gt(&self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.node(Node::gt(key, value))
    }

    pub fn gte(&self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.node(Node::gte(key, value))
    }

    pub fn lt(&self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.node(Node::lt(key, value))
    }

    pub fn lte(&self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.node(Node::lte(key, value))
    }

    pub fn ne(&self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.node(Node::ne(key, value))
    }

    pub fn r#in(&self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.node(Node::r#in(key, value))
    }

    pub fn nin(&self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.node(Node::nin(key, value))
    }

    fn node(&self, node: Node) -> Self {
        self.chain(move |stmt| {
            stmt.query.push_node(node);
            Ok(())
        })
    }

    pub fn or(&self, nodes: Vec<Node>) -> Self {
        self.chain(move |stmt| {
            stmt.query.or(nodes);
            Ok(())
        })
    }

    pub fn and(&self, nodes: Vec<Node>) -> Self {
        self.chain(move |stmt| {
            stmt.query.and(nodes);
            Ok(())
        })
    }

    pub fn not(&self, nodes: Vec<Node>) -> Self {
        self.chain(move |stmt| {
            stmt.query.not(nodes);
            Ok(())
        })
    }

    pub fn nor(&self, nodes: Vec<Node>) -> Self {
        self.chain(move |stmt| {
            stmt.query.nor(nodes);
            Ok(())
        })
    }

    /// 只选择列出的字段，已设置排除字段时记录错误
    pub fn select<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chain(move |stmt| {
            if stmt.selector.select(fields) {
                Ok(())
            } else {
                Err(QuickDbError::SelectOnOmitsExist)
            }
        })
    }

    /// 排除列出的字段，已设置选择字段时记录错误
    pub fn omit<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chain(move |stmt| {
            if stmt.selector.omit(fields) {
                Ok(())
            } else {
                Err(QuickDbError::OmitOnSelectsExist)
            }
        })
    }

    /// 排序，`-field` 表示降序
    pub fn order(&self, field: &str) -> Self {
        self.chain(|stmt| {
            stmt.push_order(field);
            Ok(())
        })
    }

    pub fn limit(&self, limit: i64) -> Self {
        self.chain(move |stmt| {
            stmt.limit = Some(limit);
            Ok(())
        })
    }

    pub fn offset(&self, offset: u64) -> Self {
        self.chain(move |stmt| {
            stmt.offset = Some(offset);
            Ok(())
        })
    }

    /// 更新全部匹配记录
    pub fn multiple(&self) -> Self {
        self.chain(|stmt| {
            stmt.multiple = true;
            Ok(())
        })
    }

    /// 没有匹配记录时插入
    pub fn upsert(&self) -> Self {
        self.chain(|stmt| {
            stmt.upsert = true;
            Ok(())
        })
    }

    /// 按模型更新时零值字段也写入
    pub fn include_zero_value(&self) -> Self {
        self.chain(|stmt| {
            stmt.include_zero_value = true;
            Ok(())
        })
    }
}
