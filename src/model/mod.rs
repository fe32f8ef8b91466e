//! 模型定义模块
//!
//! 模型元数据、结构解析缓存和零值判定

pub mod field_types;
pub mod macros;
pub mod schema;
pub mod traits;

pub use field_types::{FieldMeta, IndexDefinition, ModelMeta};
pub use schema::{Schema, SchemaCache, is_zero_value};
pub use traits::Model;
