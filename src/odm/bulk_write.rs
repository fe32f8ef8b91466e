//! # 批量写入
//!
//! 先在本地排队插入、更新、保存和删除操作，`submit` 时一次提交

use mongodb::bson::{Bson, Document};
use rat_logger::{debug, info};
use serde_json::json;
use std::sync::Arc;

use super::callbacks::call;
use super::db::Db;
use crate::adapter::{BulkWriteOutcome, ClientFactory, MongoClientFactory, StoreClient, WriteModel};
use crate::error::{QuickDbError, QuickDbResult};
use crate::model::{Model, Schema, is_zero_value};
use crate::types::{Condition, Filter, Query, multiple, update_operations};
use crate::types::{PRIMARY_KEY, UpdateInput};

/// 更新文档的改写钩子
pub type UpdateFilter = Arc<dyn Fn(Document) -> Document + Send + Sync>;

/// 批量写入
pub struct BulkWrite<F: ClientFactory = MongoClientFactory> {
    db: Db<F>,
    models: Vec<WriteModel>,
    ordered: bool,
    warmup: bool,
    update_filter: Option<UpdateFilter>,
    result: Option<BulkWriteOutcome>,
}

impl<F: ClientFactory> Db<F> {
    /// 创建批量写入，集合取自当前语句或第一次排队的模型
    pub fn bulk_write(&self) -> BulkWrite<F> {
        BulkWrite {
            db: self.clone(),
            models: Vec::new(),
            ordered: true,
            warmup: false,
            update_filter: None,
            result: None,
        }
    }
}

impl<F: ClientFactory> BulkWrite<F> {
    /// 按顺序执行，遇到错误立即停止（默认开启）
    pub fn ordered(&mut self, ordered: bool) -> &mut Self {
        self.ordered = ordered;
        self
    }

    /// 提交前确认连接健康并预热
    pub fn warmup(&mut self, warmup: bool) -> &mut Self {
        self.warmup = warmup;
        self
    }

    /// 设置更新文档的改写钩子，对之后排队的更新生效
    pub fn set_update_filter(
        &mut self,
        filter: impl Fn(Document) -> Document + Send + Sync + 'static,
    ) -> &mut Self {
        self.update_filter = Some(Arc::new(filter));
        self
    }

    /// 排队中的操作数量
    pub fn size(&self) -> usize {
        self.models.len()
    }

    /// 最近一次提交的结果
    pub fn result(&self) -> Option<&BulkWriteOutcome> {
        self.result.as_ref()
    }

    fn schema<T: Model>(&mut self) -> QuickDbResult<Arc<Schema>> {
        if let Some(err) = self.db.error() {
            return Err(err.clone());
        }
        let schema = self.db.schema_cache().get_or_parse::<T>()?;
        if self.db.statement.schema.is_none() {
            self.db.statement.schema = Some(schema.clone());
        }
        Ok(schema)
    }

    fn primary_filter<T: Model>(model: &T) -> QuickDbResult<Document> {
        match model.primary_key()? {
            Some(value) if !is_zero_value(&value) => {
                let mut filter = Filter::new();
                Filter::eq(&mut filter, PRIMARY_KEY, value);
                Ok(filter.into_document())
            }
            _ => Err(QuickDbError::InvalidValue {
                message: "批量写入的模型主键为空".to_string(),
            }),
        }
    }

    fn condition_filter(&self, condition: Condition, args: Vec<Bson>) -> QuickDbResult<Filter> {
        let mut query = Query::new();
        query.where_clause(condition, args);
        let filter = query.build(self.db.statement.schema());
        if filter.is_empty() {
            return Err(QuickDbError::MissingWhereClause);
        }
        Ok(filter)
    }

    fn update_document(
        &self,
        input: &UpdateInput,
        schema: Option<&Schema>,
        include_zero_value: bool,
    ) -> QuickDbResult<(Document, bool)> {
        let (update, upsert) =
            update_operations::build(input, schema, &self.db.statement.selector, include_zero_value)?;
        if update.is_empty() {
            return Err(QuickDbError::InvalidValue {
                message: "更新内容为空".to_string(),
            });
        }
        let doc = update.to_document();
        let doc = match &self.update_filter {
            Some(filter) => filter(doc),
            None => doc,
        };
        Ok((doc, upsert))
    }

    /// 排队插入模型，主键为零值时交给数据库生成
    pub fn insert<T: Model>(&mut self, model: &T) -> QuickDbResult<&mut Self> {
        let schema = self.schema::<T>()?;
        let mut document = schema.to_store_document(model.to_document()?);
        if document.get(PRIMARY_KEY).is_some_and(is_zero_value) {
            document.remove(PRIMARY_KEY);
        }
        self.models.push(WriteModel::InsertOne { document });
        Ok(self)
    }

    /// 排队插入原始文档
    pub fn insert_document(&mut self, document: Document) -> &mut Self {
        self.models.push(WriteModel::InsertOne { document });
        self
    }

    /// 排队按主键更新模型的非零字段
    pub fn update<T: Model>(&mut self, model: &T) -> QuickDbResult<&mut Self> {
        self.queue_model(model, false, false)
    }

    /// 排队按主键保存模型，零值字段也写入，记录不存在时插入
    pub fn save<T: Model>(&mut self, model: &T) -> QuickDbResult<&mut Self> {
        self.queue_model(model, true, true)
    }

    fn queue_model<T: Model>(
        &mut self,
        model: &T,
        include_zero_value: bool,
        upsert: bool,
    ) -> QuickDbResult<&mut Self> {
        let schema = self.schema::<T>()?;
        let filter = Self::primary_filter(model)?;
        let input = UpdateInput::from_model(model)?;
        let (update, needs_upsert) = self.update_document(&input, Some(&schema), include_zero_value)?;
        self.models.push(WriteModel::UpdateOne {
            filter,
            update,
            upsert: upsert || needs_upsert,
        });
        Ok(self)
    }

    /// 排队按条件更新，主键为单个值时只更新一条
    pub fn update_where(
        &mut self,
        condition: impl Into<Condition>,
        args: Vec<Bson>,
        input: impl Into<UpdateInput>,
    ) -> QuickDbResult<&mut Self> {
        let filter = self.condition_filter(condition.into(), args)?;
        let schema = self.db.statement.schema.clone();
        let (update, upsert) = self.update_document(&input.into(), schema.as_deref(), false)?;
        let batch = multiple(&filter);
        let filter = filter.into_document();
        self.models.push(if batch {
            WriteModel::UpdateMany {
                filter,
                update,
                upsert,
            }
        } else {
            WriteModel::UpdateOne {
                filter,
                update,
                upsert,
            }
        });
        Ok(self)
    }

    /// 排队按主键删除模型对应的记录
    pub fn delete<T: Model>(&mut self, model: &T) -> QuickDbResult<&mut Self> {
        self.schema::<T>()?;
        let filter = Self::primary_filter(model)?;
        self.models.push(WriteModel::DeleteOne { filter });
        Ok(self)
    }

    /// 排队按条件删除，主键为单个值时只删除一条
    pub fn delete_where(
        &mut self,
        condition: impl Into<Condition>,
        args: Vec<Bson>,
    ) -> QuickDbResult<&mut Self> {
        let filter = self.condition_filter(condition.into(), args)?;
        let batch = multiple(&filter);
        let filter = filter.into_document();
        self.models.push(if batch {
            WriteModel::DeleteMany { filter }
        } else {
            WriteModel::DeleteOne { filter }
        });
        Ok(self)
    }

    /// 批量写入摘要（JSON）
    pub fn describe(&self) -> String {
        let mut inserts = 0usize;
        let mut updates = 0usize;
        let mut deletes = 0usize;
        for model in &self.models {
            match model {
                WriteModel::InsertOne { .. } => inserts += 1,
                WriteModel::UpdateOne { .. } | WriteModel::UpdateMany { .. } => updates += 1,
                WriteModel::DeleteOne { .. } | WriteModel::DeleteMany { .. } => deletes += 1,
            }
        }
        let table = self
            .db
            .statement
            .table
            .clone()
            .or_else(|| self.db.statement.schema().map(|s| s.table.clone()));
        json!({
            "database": self.db.statement.database,
            "table": table,
            "size": self.models.len(),
            "ordered": self.ordered,
            "insert": inserts,
            "update": updates,
            "delete": deletes,
            "result": self.result,
        })
        .to_string()
    }

    /// 提交排队的操作，成功后清空队列
    pub async fn submit(&mut self) -> QuickDbResult<BulkWriteOutcome> {
        let stmt = match self.db.error() {
            Some(err) => return Err(err.clone()),
            None => self.db.statement.clone(),
        };
        if self.models.is_empty() {
            debug!("批量写入队列为空，跳过提交");
            let outcome = BulkWriteOutcome::default();
            self.result = Some(outcome.clone());
            return Ok(outcome);
        }

        let pool = self.db.pool();
        if self.warmup {
            pool.prepare_for_bulk_operation(&stmt.context).await?;
        }

        let models = &self.models;
        let ordered = self.ordered;
        let outcome = call(pool, stmt, |stmt, client| {
            let models = models.clone();
            async move {
                let ns = stmt.namespace()?;
                client.bulk_write(&ns, models, ordered).await
            }
        })
        .await?;

        info!(
            "批量写入完成: {}条, 插入{} 更新{} 删除{}",
            self.models.len(),
            outcome.inserted_count,
            outcome.modified_count,
            outcome.deleted_count
        );
        self.models.clear();
        self.result = Some(outcome.clone());
        Ok(outcome)
    }
}
