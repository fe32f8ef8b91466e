//! # 终结方法
//!
//! 链式调用的最后一步：解析语句、经连接池管理器执行命令并把结果解码为模型

use mongodb::bson::{self, Bson, Document};
use parking_lot::Mutex;
use rat_logger::debug;
use std::sync::Arc;

use super::callbacks::{Processor, call};
use super::db::Db;
use super::handlers::{self, PageRequest, UpdateResult};
use super::statement::{SortOrder, Statement};
use crate::adapter::ClientFactory;
use crate::error::{QuickDbError, QuickDbResult};
use crate::model::{Model, Schema, is_zero_value};
use crate::types::{PRIMARY_KEY, Paging, UpdateInput};

fn decode<T: Model>(schema: &Schema, doc: Document) -> QuickDbResult<T> {
    Ok(bson::from_document(schema.to_model_document(doc))?)
}

fn require_primary<T: Model>(model: &T) -> QuickDbResult<Bson> {
    match model.primary_key()? {
        Some(value) if !is_zero_value(&value) => Ok(value),
        _ => Err(QuickDbError::InvalidValue {
            message: "模型主键为空".to_string(),
        }),
    }
}

impl<F: ClientFactory> Db<F> {
    /// 取出本次调用使用的语句，链式调用中记录的错误在这里返回
    fn begin(&self) -> QuickDbResult<Statement> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(self.statement.clone()),
        }
    }

    /// 绑定模型结构，语句已绑定时沿用
    fn bind<T: Model>(&self, stmt: &mut Statement) -> QuickDbResult<Arc<Schema>> {
        let schema = self.core.schemas.get_or_parse::<T>()?;
        if stmt.schema.is_none() {
            stmt.schema = Some(schema.clone());
        }
        Ok(schema)
    }

    fn store_document<T: Model>(schema: &Schema, model: &T) -> QuickDbResult<Document> {
        let mut doc = schema.to_store_document(model.to_document()?);
        if doc.get(PRIMARY_KEY).is_some_and(is_zero_value) {
            doc.remove(PRIMARY_KEY);
        }
        Ok(doc)
    }

    /// 查询全部匹配记录
    pub async fn find<T: Model>(&self) -> QuickDbResult<Vec<T>> {
        let mut stmt = self.begin()?;
        let schema = self.bind::<T>(&mut stmt)?;
        let docs = Processor::Query
            .execute(&self.core.pool, stmt)
            .await?
            .into_found()?;
        docs.into_iter().map(|doc| decode(&schema, doc)).collect()
    }

    /// 查询全部匹配记录，返回原始文档
    pub async fn find_documents(&self) -> QuickDbResult<Vec<Document>> {
        let stmt = self.begin()?;
        Processor::Query
            .execute(&self.core.pool, stmt)
            .await?
            .into_found()
    }

    /// 查询第一条匹配记录
    pub async fn first<T: Model>(&self) -> QuickDbResult<Option<T>> {
        let mut stmt = self.begin()?;
        let schema = self.bind::<T>(&mut stmt)?;
        let doc = call(&self.core.pool, stmt, |stmt, client| async move {
            handlers::cmd_first(&stmt, &*client).await
        })
        .await?;
        doc.map(|doc| decode(&schema, doc)).transpose()
    }

    /// 统计匹配记录数
    pub async fn count(&self) -> QuickDbResult<u64> {
        let stmt = self.begin()?;
        call(&self.core.pool, stmt, |stmt, client| async move {
            handlers::cmd_count(&stmt, &*client).await
        })
        .await
    }

    /// 插入一条模型记录，返回主键
    ///
    /// 主键为零值时交给数据库生成
    pub async fn create<T: Model>(&self, model: &T) -> QuickDbResult<Bson> {
        let mut stmt = self.begin()?;
        let schema = self.bind::<T>(&mut stmt)?;
        stmt.documents = vec![Self::store_document(&schema, model)?];
        Processor::Create
            .execute(&self.core.pool, stmt)
            .await?
            .into_created()
    }

    /// 批量插入模型记录，返回插入数量
    pub async fn create_many<T: Model>(&self, models: &[T]) -> QuickDbResult<u64> {
        let mut stmt = self.begin()?;
        let schema = self.bind::<T>(&mut stmt)?;
        stmt.documents = models
            .iter()
            .map(|m| Self::store_document(&schema, m))
            .collect::<QuickDbResult<_>>()?;
        let single = stmt.documents.len() == 1;
        let created = Processor::Create
            .execute(&self.core.pool, stmt)
            .await?
            .into_created()?;
        Ok(match created {
            Bson::Int64(n) if !single => u64::try_from(n).unwrap_or(0),
            _ => 1,
        })
    }

    /// 插入原始文档，需要先指定集合
    pub async fn create_document(&self, document: Document) -> QuickDbResult<Bson> {
        let mut stmt = self.begin()?;
        stmt.documents = vec![document];
        Processor::Create
            .execute(&self.core.pool, stmt)
            .await?
            .into_created()
    }

    /// 按条件更新
    ///
    /// 接受映射、预构建的更新文档或模型值（`UpdateInput::from_model`）
    pub async fn update(&self, input: impl Into<UpdateInput>) -> QuickDbResult<UpdateResult> {
        let mut stmt = self.begin()?;
        stmt.value = Some(input.into());
        Processor::Update
            .execute(&self.core.pool, stmt)
            .await?
            .into_updated()
    }

    /// 按条件用模型值更新，默认只写入非零字段
    pub async fn update_model<T: Model>(&self, model: &T) -> QuickDbResult<UpdateResult> {
        let mut stmt = self.begin()?;
        self.bind::<T>(&mut stmt)?;
        stmt.value = Some(UpdateInput::from_model(model)?);
        Processor::Update
            .execute(&self.core.pool, stmt)
            .await?
            .into_updated()
    }

    /// 更新一条记录并返回更新后的模型，没有匹配记录时返回 `None`
    pub async fn update_and_fetch<T: Model>(
        &self,
        input: impl Into<UpdateInput>,
    ) -> QuickDbResult<Option<T>> {
        let mut stmt = self.begin()?;
        let schema = self.bind::<T>(&mut stmt)?;
        stmt.update_and_modify_model = true;
        stmt.multiple = false;
        stmt.value = Some(input.into());
        let result = Processor::Update
            .execute(&self.core.pool, stmt)
            .await?
            .into_updated()?;
        result.document.map(|doc| decode(&schema, doc)).transpose()
    }

    /// 按主键保存模型
    pub async fn save<T: Model>(&self, model: &T) -> QuickDbResult<UpdateResult> {
        let mut stmt = self.begin()?;
        self.bind::<T>(&mut stmt)?;
        stmt.query.primary(require_primary(model)?);
        stmt.value = Some(UpdateInput::from_model(model)?);
        Processor::Update
            .execute(&self.core.pool, stmt)
            .await?
            .into_updated()
    }

    /// 按条件删除，没有条件时拒绝执行
    pub async fn delete(&self) -> QuickDbResult<u64> {
        let stmt = self.begin()?;
        Processor::Delete
            .execute(&self.core.pool, stmt)
            .await?
            .into_deleted()
    }

    /// 按主键删除模型对应的记录
    pub async fn delete_model<T: Model>(&self, model: &T) -> QuickDbResult<u64> {
        let mut stmt = self.begin()?;
        self.bind::<T>(&mut stmt)?;
        stmt.query.primary(require_primary(model)?);
        Processor::Delete
            .execute(&self.core.pool, stmt)
            .await?
            .into_deleted()
    }

    /// 分页查询
    ///
    /// `record` 为0时重新统计总数；`update` 大于0时只查询更新时间更晚的记录，
    /// 并按更新时间降序排列
    pub async fn page<T: Model>(&self, mut paging: Paging<T>) -> QuickDbResult<Paging<T>> {
        let mut stmt = self.begin()?;
        let schema = self.bind::<T>(&mut stmt)?;
        let config = &self.core.config;

        if paging.size == 0 {
            paging.size = config.default_page_size;
        }
        paging.init(config.max_page_size);

        if paging.update > 0 {
            let field = config.page_update_field.clone();
            stmt.orders.insert(0, (field.clone(), SortOrder::Desc));
            stmt.query.gt(field, paging.update);
        }

        let request = PageRequest {
            page: paging.page,
            size: paging.size,
            record: paging.record,
        };
        let (rows, record) = call(&self.core.pool, stmt, move |stmt, client| async move {
            handlers::cmd_page(&stmt, &*client, request).await
        })
        .await?;

        paging.result(record);
        paging.rows = rows
            .into_iter()
            .map(|doc| decode(&schema, doc))
            .collect::<QuickDbResult<_>>()?;
        debug!(
            "分页结果: 第{}/{}页 本页{}条 总数{}",
            paging.page,
            paging.total,
            paging.rows.len(),
            paging.record
        );
        Ok(paging)
    }

    /// 逐条遍历匹配记录，回调返回 false 时停止，返回已遍历的数量
    pub async fn range<T, H>(&self, handle: H) -> QuickDbResult<u64>
    where
        T: Model,
        H: FnMut(T) -> bool + Send,
    {
        let mut stmt = self.begin()?;
        let schema = self.bind::<T>(&mut stmt)?;
        let handle = Mutex::new(handle);
        let handle = &handle;
        call(&self.core.pool, stmt, |stmt, client| {
            let schema = schema.clone();
            async move {
                let mut each = |doc: Document| -> QuickDbResult<bool> {
                    let value = decode::<T>(&schema, doc)?;
                    Ok((handle.lock())(value))
                };
                handlers::cmd_range(&stmt, &*client, &mut each).await
            }
        })
        .await
    }
}
