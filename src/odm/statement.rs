//! # 语句
//!
//! 单次调用的可变上下文：目标集合、模型结构、条件、排序、分页、字段选择和各类标志。
//! 每次链式调用都会复制出新的语句，语句不会在并发调用之间共享。

use mongodb::bson::{Document, doc};
use std::sync::Arc;

use crate::adapter::{FindSpec, Namespace};
use crate::context::Context;
use crate::error::{QuickDbError, QuickDbResult};
use crate::model::Schema;
use crate::types::{Filter, Query, Selector, UpdateInput};

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn value(self) -> i32 {
        match self {
            SortOrder::Asc => 1,
            SortOrder::Desc => -1,
        }
    }
}

/// 语句
#[derive(Debug, Clone, Default)]
pub struct Statement {
    pub database: String,
    pub table: Option<String>,
    pub schema: Option<Arc<Schema>>,
    pub query: Query,
    pub orders: Vec<(String, SortOrder)>,
    pub limit: Option<i64>,
    pub offset: Option<u64>,
    pub selector: Selector,
    /// 写入来源（更新）
    pub value: Option<UpdateInput>,
    /// 写入来源（插入），已转换为存储文档
    pub documents: Vec<Document>,
    /// 强制批量更新
    pub multiple: bool,
    /// 强制 upsert
    pub upsert: bool,
    /// 零值字段也参与更新
    pub include_zero_value: bool,
    /// 更新后返回更新后的文档
    pub update_and_modify_model: bool,
    pub context: Context,
    parsed: bool,
}

impl Statement {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    /// 解析语句
    ///
    /// 确定集合名：未显式设置时取自模型结构；无法确定时返回错误。
    /// 每次终结调用只生效一次。
    pub fn parse(&mut self) -> QuickDbResult<()> {
        if self.parsed {
            return Ok(());
        }

        if self.database.trim().is_empty() {
            return Err(QuickDbError::InvalidValue {
                message: "数据库名为空".to_string(),
            });
        }

        if let Some(UpdateInput::Model { .. }) = &self.value {
            if self.schema.is_none() {
                return Err(QuickDbError::InvalidValue {
                    message: "按模型写入时必须绑定模型".to_string(),
                });
            }
        }

        let table = match (&self.table, &self.schema) {
            (Some(table), _) if !table.is_empty() => table.clone(),
            (_, Some(schema)) if !schema.table.is_empty() => schema.table.clone(),
            _ => return Err(QuickDbError::TableNotSet),
        };
        self.table = Some(table);
        self.parsed = true;
        Ok(())
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    /// 集合地址，需先调用 `parse`
    pub fn namespace(&self) -> QuickDbResult<Namespace> {
        let table = self.table.as_deref().ok_or(QuickDbError::TableNotSet)?;
        Ok(Namespace::new(self.database.clone(), table))
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_deref()
    }

    /// 渲染过滤文档
    pub fn filter(&self) -> Filter {
        self.query.build(self.schema())
    }

    /// 排序文档，字段名翻译为数据库字段名
    pub fn sort(&self) -> Option<Document> {
        if self.orders.is_empty() {
            return None;
        }
        let mut sort = doc! {};
        for (field, order) in &self.orders {
            let key = match self.schema() {
                Some(schema) => schema.field_db_name(field).to_string(),
                None => field.clone(),
            };
            sort.insert(key, order.value());
        }
        Some(sort)
    }

    pub fn projection(&self) -> Option<Document> {
        self.selector.projection(self.schema())
    }

    /// 查询选项
    pub fn find_spec(&self) -> FindSpec {
        FindSpec {
            limit: self.limit,
            skip: self.offset,
            sort: self.sort(),
            projection: self.projection(),
        }
    }

    /// 追加排序，`-field` 表示降序
    pub fn push_order(&mut self, field: &str) {
        match field.strip_prefix('-') {
            Some(name) => self.orders.push((name.to_string(), SortOrder::Desc)),
            None => self
                .orders
                .push((field.trim_start_matches('+').to_string(), SortOrder::Asc)),
        }
    }
}
