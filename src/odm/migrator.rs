//! # 索引迁移
//!
//! 按模型声明的索引在集合上创建索引，已存在的同名或同键索引冲突会被忽略

use mongodb::bson::Document;
use rat_logger::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::callbacks::call;
use super::db::Db;
use crate::adapter::{ClientFactory, IndexSpec, StoreClient};
use crate::error::{QuickDbError, QuickDbResult};
use crate::model::{IndexDefinition, Model, Schema};
use crate::types::Query;

/// 索引已存在但选项不同
const INDEX_OPTIONS_CONFLICT: i32 = 85;
/// 索引已存在但键不同
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;

fn is_index_conflict(err: &QuickDbError) -> bool {
    match err {
        QuickDbError::StoreError { code, message, .. } => {
            matches!(code, Some(INDEX_OPTIONS_CONFLICT | INDEX_KEY_SPECS_CONFLICT))
                || message.starts_with("Index already exists with a different name")
        }
        _ => false,
    }
}

/// 把模型索引声明转换为存储层索引描述
///
/// 字段名翻译为数据库字段名，`-` 前缀表示降序；部分索引条件按 where 字符串语法渲染
pub fn index_spec(schema: &Schema, index: &IndexDefinition) -> IndexSpec {
    let mut keys = Document::new();
    for field in &index.fields {
        let (name, order) = match field.strip_prefix('-') {
            Some(name) => (name, -1),
            None => (field.trim_start_matches('+'), 1),
        };
        keys.insert(schema.field_db_name(name).to_string(), order);
    }

    let partial_filter = if index.partial.is_empty() {
        None
    } else {
        let mut query = Query::new();
        for condition in &index.partial {
            query.where_clause(condition.as_str(), Vec::new());
        }
        Some(query.build(Some(schema)).into_document())
    };

    IndexSpec {
        keys,
        name: index.name.clone(),
        unique: index.unique,
        sparse: index.sparse,
        partial_filter,
        expire_after: index.expire_after_secs.map(Duration::from_secs),
    }
}

impl<F: ClientFactory> Db<F> {
    /// 登记模型，`start` 时为其创建索引
    pub fn register<T: Model>(&self) -> QuickDbResult<()> {
        let schema = self.core.schemas.get_or_parse::<T>()?;
        let mut models = self.core.models.lock();
        if !models.iter().any(|s| Arc::ptr_eq(s, &schema)) {
            debug!("登记模型: {} -> {}", schema.name, schema.table);
            models.push(schema);
        }
        Ok(())
    }

    /// 为已登记的全部模型创建索引
    pub async fn start(&self) -> QuickDbResult<()> {
        let schemas: Vec<Arc<Schema>> = self.core.models.lock().clone();
        for schema in schemas {
            self.migrate_schema(schema).await?;
        }
        Ok(())
    }

    /// 为单个模型创建索引
    pub async fn auto_migrate<T: Model>(&self) -> QuickDbResult<()> {
        let schema = self.core.schemas.get_or_parse::<T>()?;
        self.migrate_schema(schema).await
    }

    async fn migrate_schema(&self, schema: Arc<Schema>) -> QuickDbResult<()> {
        if schema.indexes.is_empty() {
            return Ok(());
        }
        let mut stmt = self.session().statement;
        stmt.schema = Some(schema.clone());

        let specs: Vec<IndexSpec> = schema
            .indexes
            .iter()
            .map(|index| index_spec(&schema, index))
            .collect();

        call(&self.core.pool, stmt, |stmt, client| {
            let specs = specs.clone();
            async move {
                let ns = stmt.namespace()?;
                for spec in specs {
                    let keys = spec.keys.clone();
                    match client.create_index(&ns, spec).await {
                        Ok(()) => {
                            debug!("创建索引: {} {}", ns, keys);
                        }
                        Err(e) if is_index_conflict(&e) => {
                            warn!("索引已存在，跳过: {} {} ({})", ns, keys, e);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            }
        })
        .await?;

        info!("模型 {} 索引迁移完成({}个)", schema.name, specs.len());
        Ok(())
    }
}
