//! # 核心配置模块
//!
//! 数据库访问层配置，以及TOML/JSON配置文件的读写

use rat_logger::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::QuickDbResult;
use crate::pool::PoolConfig;
use crate::types::DEFAULT_PAGE_SIZE;

/// 分页最大每页数量默认值
pub const DEFAULT_MAX_PAGE_SIZE: usize = 1000;

/// 增量分页使用的时间字段默认值
pub const DEFAULT_PAGE_UPDATE_FIELD: &str = "update";

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("toml")
}

/// 从文件读取配置，扩展名为 `toml` 时按TOML解析，否则按JSON解析
pub(crate) fn load_file<T: DeserializeOwned>(path: &Path) -> QuickDbResult<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| crate::quick_error!(config, format!("读取配置文件失败: {}", e)))?;

    let value = if is_toml(path) {
        toml::from_str(&content)
            .map_err(|e| crate::quick_error!(config, format!("解析TOML配置文件失败: {}", e)))?
    } else {
        serde_json::from_str(&content)
            .map_err(|e| crate::quick_error!(config, format!("解析JSON配置文件失败: {}", e)))?
    };

    info!("从文件加载配置: {:?}", path);
    Ok(value)
}

/// 按扩展名选择格式写入配置文件
pub(crate) fn save_file<T: Serialize>(value: &T, path: &Path) -> QuickDbResult<()> {
    let content = if is_toml(path) {
        toml::to_string_pretty(value)
            .map_err(|e| crate::quick_error!(config, format!("序列化TOML配置失败: {}", e)))?
    } else {
        serde_json::to_string_pretty(value)
            .map_err(|e| crate::quick_error!(config, format!("序列化JSON配置失败: {}", e)))?
    };

    std::fs::write(path, content)
        .map_err(|e| crate::quick_error!(config, format!("写入配置文件失败: {}", e)))?;

    info!("配置已保存到文件: {:?}", path);
    Ok(())
}

/// 数据库访问层配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbConfig {
    /// 连接地址，缺少 `mongodb://` 前缀时自动补上
    pub uri: String,
    /// 默认数据库名
    pub database: String,
    /// 未指定时的每页数量
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    /// 每页数量上限
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    /// 增量分页使用的字段名
    #[serde(default = "default_page_update_field")]
    pub page_update_field: String,
    /// 连接池管理器配置
    #[serde(default)]
    pub pool: PoolConfig,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> usize {
    DEFAULT_MAX_PAGE_SIZE
}

fn default_page_update_field() -> String {
    DEFAULT_PAGE_UPDATE_FIELD.to_string()
}

impl DbConfig {
    /// 创建数据库配置构建器
    pub fn builder() -> super::builders::DbConfigBuilder {
        super::builders::DbConfigBuilder::new()
    }

    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> QuickDbResult<Self> {
        load_file(config_path.as_ref())
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, config_path: P) -> QuickDbResult<()> {
        save_file(self, config_path.as_ref())
    }
}
