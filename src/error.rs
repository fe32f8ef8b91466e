//! 错误处理模块
//!
//! 定义库内统一使用的错误类型，以及业务错误/网络错误的判定规则

use std::fmt;
use thiserror::Error;

/// 库结果类型
pub type QuickDbResult<T> = Result<T, QuickDbError>;

/// 存储层错误分类
///
/// 由驱动错误转换而来，决定守护执行时是否需要触发恢复
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// 网络不可达、连接被重置等
    Network,
    /// 各类超时
    Timeout,
    /// 唯一键冲突
    DuplicateKey,
    /// 写入类型不匹配
    TypeMismatch,
    /// 服务端返回的命令错误
    Command,
    /// 其他
    Other,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreErrorKind::Network => "network",
            StoreErrorKind::Timeout => "timeout",
            StoreErrorKind::DuplicateKey => "duplicate_key",
            StoreErrorKind::TypeMismatch => "type_mismatch",
            StoreErrorKind::Command => "command",
            StoreErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// 库错误类型
#[derive(Error, Debug, Clone)]
pub enum QuickDbError {
    #[error("连接错误: {message}")]
    ConnectionError { message: String },

    #[error("连接池错误: {message}")]
    PoolError { message: String },

    #[error("查询错误: {message}")]
    QueryError { message: String },

    #[error("序列化错误: {message}")]
    SerializationError { message: String },

    #[error("验证错误 [{field}]: {message}")]
    ValidationError { field: String, message: String },

    #[error("配置错误: {message}")]
    ConfigError { message: String },

    #[error("IO错误: {message}")]
    IoError { message: String },

    #[error("存储错误({kind}): {message}")]
    StoreError {
        kind: StoreErrorKind,
        code: Option<i32>,
        message: String,
    },

    #[error("无法恢复数据库连接: {source}")]
    RecoveryFailed {
        #[source]
        source: Box<QuickDbError>,
    },

    #[error("操作已取消: {message}")]
    Cancelled { message: String },

    #[error("无效的目标值: {message}")]
    InvalidValue { message: String },

    #[error("缺少where条件，拒绝执行全表操作")]
    MissingWhereClause,

    #[error("已经设置了Omit字段，不能再使用Select")]
    SelectOnOmitsExist,

    #[error("已经设置了Select字段，不能再使用Omit")]
    OmitOnSelectsExist,

    #[error("不支持的输入类型: {kind}")]
    UnsupportedType { kind: String },

    #[error("未设置集合名称，请通过 model 或 table 指定")]
    TableNotSet,
}

/// 业务错误关键字（驱动未能精确分类时使用）
const BUSINESS_KEYWORDS: &[&str] = &[
    "duplicate key",
    "e11000",
    "bad value type",
    "bson type",
    "cannot convert",
    "type mismatch",
    "invalid type",
];

/// 网络错误关键字（驱动未能精确分类时使用）
const NETWORK_KEYWORDS: &[&str] = &[
    "connection refused",
    "connection timeout",
    "server selection timeout",
    "socket timeout",
    "network unreachable",
    "no reachable servers",
    "connection reset by peer",
    "i/o timeout",
    "context deadline exceeded",
    "dial tcp",
    "network error",
];

fn contains_keyword(message: &str, keywords: &[&str]) -> bool {
    let lower = message.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

impl QuickDbError {
    /// 是否为业务/数据错误（唯一键冲突、类型不匹配等）
    ///
    /// 业务错误原样返回给调用者，不会触发连接恢复
    pub fn is_business_error(&self) -> bool {
        match self {
            QuickDbError::StoreError { kind, message, .. } => match kind {
                StoreErrorKind::DuplicateKey | StoreErrorKind::TypeMismatch => true,
                StoreErrorKind::Network | StoreErrorKind::Timeout => false,
                _ => contains_keyword(message, BUSINESS_KEYWORDS),
            },
            QuickDbError::QueryError { message } => contains_keyword(message, BUSINESS_KEYWORDS),
            _ => false,
        }
    }

    /// 是否为瞬时网络错误
    pub fn is_network_error(&self) -> bool {
        match self {
            QuickDbError::StoreError { kind, message, .. } => match kind {
                StoreErrorKind::Network | StoreErrorKind::Timeout => true,
                StoreErrorKind::DuplicateKey | StoreErrorKind::TypeMismatch => false,
                _ => contains_keyword(message, NETWORK_KEYWORDS),
            },
            QuickDbError::ConnectionError { .. } => true,
            QuickDbError::QueryError { message } | QuickDbError::PoolError { message } => {
                contains_keyword(message, NETWORK_KEYWORDS)
            }
            _ => false,
        }
    }

    /// 是否为本地校验错误（不会到达存储层，永不重试）
    pub fn is_local_error(&self) -> bool {
        matches!(
            self,
            QuickDbError::ValidationError { .. }
                | QuickDbError::InvalidValue { .. }
                | QuickDbError::MissingWhereClause
                | QuickDbError::SelectOnOmitsExist
                | QuickDbError::OmitOnSelectsExist
                | QuickDbError::UnsupportedType { .. }
                | QuickDbError::TableNotSet
                | QuickDbError::SerializationError { .. }
                | QuickDbError::Cancelled { .. }
        )
    }
}

impl From<serde_json::Error> for QuickDbError {
    fn from(err: serde_json::Error) -> Self {
        QuickDbError::SerializationError {
            message: format!("JSON序列化失败: {}", err),
        }
    }
}

impl From<toml::de::Error> for QuickDbError {
    fn from(err: toml::de::Error) -> Self {
        QuickDbError::ConfigError {
            message: format!("TOML解析失败: {}", err),
        }
    }
}

impl From<std::io::Error> for QuickDbError {
    fn from(err: std::io::Error) -> Self {
        QuickDbError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<mongodb::bson::ser::Error> for QuickDbError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        QuickDbError::SerializationError {
            message: format!("BSON序列化失败: {}", err),
        }
    }
}

impl From<mongodb::bson::de::Error> for QuickDbError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        QuickDbError::SerializationError {
            message: format!("BSON反序列化失败: {}", err),
        }
    }
}

impl From<mongodb::error::Error> for QuickDbError {
    fn from(err: mongodb::error::Error) -> Self {
        let (kind, code) = crate::adapter::mongodb::classify_driver_error(&err);
        QuickDbError::StoreError {
            kind,
            code,
            message: err.to_string(),
        }
    }
}

/// 快速构造错误的宏
#[macro_export]
macro_rules! quick_error {
    (connection, $msg:expr) => {
        $crate::error::QuickDbError::ConnectionError { message: $msg.to_string() }
    };
    (pool, $msg:expr) => {
        $crate::error::QuickDbError::PoolError { message: $msg.to_string() }
    };
    (query, $msg:expr) => {
        $crate::error::QuickDbError::QueryError { message: $msg.to_string() }
    };
    (serialization, $msg:expr) => {
        $crate::error::QuickDbError::SerializationError { message: $msg.to_string() }
    };
    (config, $msg:expr) => {
        $crate::error::QuickDbError::ConfigError { message: $msg.to_string() }
    };
    (validation, $field:expr, $msg:expr) => {
        $crate::error::QuickDbError::ValidationError {
            field: $field.to_string(),
            message: $msg.to_string(),
        }
    };
    (store, $kind:ident, $msg:expr) => {
        $crate::error::QuickDbError::StoreError {
            kind: $crate::error::StoreErrorKind::$kind,
            code: None,
            message: $msg.to_string(),
        }
    };
}
