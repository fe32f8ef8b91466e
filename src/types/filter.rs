//! 原生过滤文档
//!
//! 对 bson 文档的薄封装，负责相同字段条件的合并规则

use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// 主键字段名
pub const PRIMARY_KEY: &str = "_id";

/// 需要按数组累加的操作符
const ARRAY_OPERATORS: &[&str] = &["$in", "$nin"];

fn operator(op: &str) -> String {
    if op.starts_with('$') {
        op.to_string()
    } else {
        format!("${}", op)
    }
}

/// 将值展开为数组元素
pub(crate) fn to_array(value: Bson) -> Vec<Bson> {
    match value {
        Bson::Array(items) => items,
        other => vec![other],
    }
}

/// 过滤文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(Document);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 相等条件，同一字段再次相等时转换为 `$in`
    pub fn eq(&mut self, key: &str, value: impl Into<Bson>) {
        let value = value.into();
        if self.0.contains_key(key) {
            self.any("$in", key, value);
        } else {
            self.0.insert(key, value);
        }
    }

    /// 主键相等
    pub fn primary(&mut self, value: impl Into<Bson>) {
        self.eq(PRIMARY_KEY, value);
    }

    /// 向字段追加任意操作符条件
    ///
    /// 字段已有的非文档值会先改写为 `{"$in": [旧值]}`
    pub fn any(&mut self, op: &str, key: &str, value: impl Into<Bson>) {
        let op = operator(op);
        let value = value.into();
        let mut data = match self.0.remove(key) {
            None => Document::new(),
            Some(Bson::Document(existing)) => existing,
            Some(old) => {
                let mut d = Document::new();
                d.insert("$in", Bson::Array(vec![old]));
                d
            }
        };
        if ARRAY_OPERATORS.contains(&op.as_str()) {
            let mut items = match data.remove(&op) {
                Some(Bson::Array(existing)) => existing,
                Some(other) => vec![other],
                None => Vec::new(),
            };
            items.extend(to_array(value));
            data.insert(op, Bson::Array(items));
        } else {
            data.insert(op, value);
        }
        self.0.insert(key, data);
    }

    pub fn gt(&mut self, key: &str, value: impl Into<Bson>) {
        self.any("$gt", key, value);
    }

    pub fn gte(&mut self, key: &str, value: impl Into<Bson>) {
        self.any("$gte", key, value);
    }

    pub fn lt(&mut self, key: &str, value: impl Into<Bson>) {
        self.any("$lt", key, value);
    }

    pub fn lte(&mut self, key: &str, value: impl Into<Bson>) {
        self.any("$lte", key, value);
    }

    pub fn ne(&mut self, key: &str, value: impl Into<Bson>) {
        self.any("$ne", key, value);
    }

    pub fn r#in(&mut self, key: &str, value: impl Into<Bson>) {
        self.any("$in", key, value);
    }

    pub fn nin(&mut self, key: &str, value: impl Into<Bson>) {
        self.any("$nin", key, value);
    }

    /// 向组合操作符（`$or`/`$and`/`$not`/`$nor`）数组追加元素
    pub fn match_op(&mut self, op: &str, value: impl Into<Bson>) {
        let op = operator(op);
        let mut items = match self.0.remove(&op) {
            Some(Bson::Array(existing)) => existing,
            Some(other) => vec![other],
            None => Vec::new(),
        };
        items.extend(to_array(value.into()));
        self.0.insert(op, Bson::Array(items));
    }

    /// 合并另一个过滤文档，同名字段被覆盖
    pub fn merge(&mut self, other: Filter) {
        for (k, v) in other.0 {
            self.0.insert(k, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }
}

impl From<Document> for Filter {
    fn from(doc: Document) -> Self {
        Filter(doc)
    }
}

impl From<Filter> for Document {
    fn from(filter: Filter) -> Self {
        filter.0
    }
}

impl From<Filter> for Bson {
    fn from(filter: Filter) -> Self {
        Bson::Document(filter.0)
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = Bson::Document(self.0.clone()).into_relaxed_extjson();
        write!(f, "{}", json)
    }
}

/// 判断操作是否作用于多条记录
///
/// 主键缺失或主键条件为文档/数组时视为批量操作
pub fn multiple(filter: &Filter) -> bool {
    match filter.get(PRIMARY_KEY) {
        None => true,
        Some(Bson::Document(_)) | Some(Bson::Array(_)) => true,
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{bson, doc};

    #[test]
    fn test_repeated_eq_folds_into_in() {
        let mut f = Filter::new();
        Filter::eq(&mut f, "uid", "a");
        Filter::eq(&mut f, "uid", "b");
        Filter::eq(&mut f, "uid", "c");
        assert_eq!(f.into_document(), doc! { "uid": { "$in": ["a", "b", "c"] } });
    }

    #[test]
    fn test_any_merges_on_same_key() {
        let mut f = Filter::new();
        f.gt("age", 18);
        f.lt("age", 60);
        assert_eq!(f.into_document(), doc! { "age": { "$gt": 18, "$lt": 60 } });
    }

    #[test]
    fn test_in_flattens_arrays() {
        let mut f = Filter::new();
        f.r#in("_id", bson!([1, 2]));
        f.r#in("_id", 3);
        assert_eq!(f.into_document(), doc! { "_id": { "$in": [1, 2, 3] } });
    }

    #[test]
    fn test_multiple_classification() {
        let mut single = Filter::new();
        single.primary(42);
        assert!(!multiple(&single));

        let mut batch = Filter::new();
        batch.r#in("_id", bson!([1, 2, 3]));
        assert!(multiple(&batch));

        let mut no_pk = Filter::new();
        Filter::eq(&mut no_pk, "name", "x");
        assert!(multiple(&no_pk));

        let raw = Filter::from(doc! { "_id": [1, 2, 3] });
        assert!(multiple(&raw));
    }

    #[test]
    fn test_owned_filter_builder_methods() {
        let mut filter = Filter::new();
        Filter::eq(&mut filter, PRIMARY_KEY, "r1");
        Filter::ne(&mut filter, "name", "x");
        assert!(!multiple(&filter));
        assert_eq!(
            filter.as_document(),
            &doc! { "_id": "r1", "name": { "$ne": "x" } }
        );
    }
}
