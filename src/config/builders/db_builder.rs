//! # 数据库配置构建器模块

use crate::config::core::{DEFAULT_MAX_PAGE_SIZE, DEFAULT_PAGE_UPDATE_FIELD, DbConfig};
use crate::error::QuickDbError;
use crate::pool::PoolConfig;
use crate::types::DEFAULT_PAGE_SIZE;
use rat_logger::info;

/// 数据库配置构建器
///
/// 连接地址和数据库名必须显式设置
#[derive(Debug, Default)]
pub struct DbConfigBuilder {
    uri: Option<String>,
    database: Option<String>,
    default_page_size: Option<usize>,
    max_page_size: Option<usize>,
    page_update_field: Option<String>,
    pool: Option<PoolConfig>,
}

impl DbConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置连接地址
    ///
    /// # 参数
    ///
    /// * `uri` - MongoDB连接地址，可以由 `MongoDbConnectionBuilder` 生成
    pub fn uri<S: Into<String>>(mut self, uri: S) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// 设置默认数据库名
    pub fn database<S: Into<String>>(mut self, database: S) -> Self {
        self.database = Some(database.into());
        self
    }

    /// 设置默认每页数量
    pub fn default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = Some(size);
        self
    }

    /// 设置每页数量上限
    pub fn max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = Some(size);
        self
    }

    /// 设置增量分页字段
    pub fn page_update_field<S: Into<String>>(mut self, field: S) -> Self {
        self.page_update_field = Some(field.into());
        self
    }

    /// 设置连接池配置
    ///
    /// # 参数
    ///
    /// * `pool` - 连接池配置
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = Some(pool);
        self
    }

    /// 构建数据库配置
    ///
    /// # 错误
    ///
    /// 连接地址或数据库名未设置、分页大小不合理时返回错误
    pub fn build(self) -> Result<DbConfig, QuickDbError> {
        let uri = self
            .uri
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| crate::quick_error!(config, "连接地址必须设置"))?;

        let database = self
            .database
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| crate::quick_error!(config, "数据库名必须设置"))?;

        let max_page_size = self.max_page_size.unwrap_or(DEFAULT_MAX_PAGE_SIZE);
        if max_page_size == 0 {
            return Err(crate::quick_error!(config, "每页数量上限不能为零"));
        }

        let default_page_size = self
            .default_page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(max_page_size);

        info!("创建数据库配置: 数据库={}, 每页上限={}", database, max_page_size);

        Ok(DbConfig {
            uri,
            database,
            default_page_size,
            max_page_size,
            page_update_field: self
                .page_update_field
                .unwrap_or_else(|| DEFAULT_PAGE_UPDATE_FIELD.to_string()),
            pool: self.pool.unwrap_or_default(),
        })
    }
}
