//! # 回调分发
//!
//! 把创建、查询、更新、删除四种逻辑操作映射到命令处理器，
//! 统一完成语句解析并通过连接池管理器的守护执行调用存储层

use mongodb::bson::{Bson, Document};
use std::future::Future;
use std::sync::Arc;

use super::handlers::{self, UpdateResult};
use super::statement::Statement;
use crate::adapter::ClientFactory;
use crate::error::{QuickDbError, QuickDbResult};
use crate::pool::PoolManager;

/// 逻辑操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processor {
    Create,
    Query,
    Update,
    Delete,
}

/// 命令执行结果
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// 单条插入返回主键，批量插入返回插入数量
    Created(Bson),
    Found(Vec<Document>),
    Updated(UpdateResult),
    Deleted(u64),
}

impl CommandResult {
    fn mismatch(&self, expected: &str) -> QuickDbError {
        crate::quick_error!(query, format!("命令结果类型不匹配: 期望 {}, 实际 {:?}", expected, self))
    }

    pub fn into_created(self) -> QuickDbResult<Bson> {
        match self {
            CommandResult::Created(id) => Ok(id),
            other => Err(other.mismatch("created")),
        }
    }

    pub fn into_found(self) -> QuickDbResult<Vec<Document>> {
        match self {
            CommandResult::Found(docs) => Ok(docs),
            other => Err(other.mismatch("found")),
        }
    }

    pub fn into_updated(self) -> QuickDbResult<UpdateResult> {
        match self {
            CommandResult::Updated(result) => Ok(result),
            other => Err(other.mismatch("updated")),
        }
    }

    pub fn into_deleted(self) -> QuickDbResult<u64> {
        match self {
            CommandResult::Deleted(n) => Ok(n),
            other => Err(other.mismatch("deleted")),
        }
    }
}

impl Processor {
    pub fn name(self) -> &'static str {
        match self {
            Processor::Create => "create",
            Processor::Query => "query",
            Processor::Update => "update",
            Processor::Delete => "delete",
        }
    }

    /// 执行内置命令
    pub async fn execute<F: ClientFactory>(
        self,
        pool: &PoolManager<F>,
        stmt: Statement,
    ) -> QuickDbResult<CommandResult> {
        crate::debug_log!("执行 {} 命令: {:?}", self.name(), stmt.table);
        call(pool, stmt, move |stmt, client| async move {
            match self {
                Processor::Create => handlers::cmd_create(&stmt, &*client)
                    .await
                    .map(CommandResult::Created),
                Processor::Query => handlers::cmd_query(&stmt, &*client)
                    .await
                    .map(CommandResult::Found),
                Processor::Update => handlers::cmd_update(&stmt, &*client)
                    .await
                    .map(CommandResult::Updated),
                Processor::Delete => handlers::cmd_delete(&stmt, &*client)
                    .await
                    .map(CommandResult::Deleted),
            }
        })
        .await
    }
}

/// 以调用方提供的命令执行语句
///
/// 语句先解析，命令拿到解析后的语句和当前活动客户端，
/// 失败时按守护执行规则恢复并重试一次
pub async fn call<F, T, Cmd, Fut>(
    pool: &PoolManager<F>,
    mut stmt: Statement,
    command: Cmd,
) -> QuickDbResult<T>
where
    F: ClientFactory,
    Cmd: Fn(Arc<Statement>, Arc<F::Client>) -> Fut,
    Fut: Future<Output = QuickDbResult<T>>,
{
    stmt.parse()?;
    let stmt = Arc::new(stmt);
    pool.execute(&stmt.context, |client| command(stmt.clone(), client))
        .await
}
