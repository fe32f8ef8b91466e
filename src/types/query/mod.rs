//! 查询条件构建
//!
//! 收集条件节点，渲染时按模型结构把字段名翻译为数据库字段名

mod parser;

pub use parser::is_query_format;

use mongodb::bson::{Bson, Document};
use std::collections::{BTreeMap, HashMap};

use crate::model::Schema;
use crate::types::filter::{Filter, PRIMARY_KEY};

/// 组合条件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Composite {
    Or,
    And,
    Not,
    Nor,
}

impl Composite {
    /// 解析与渲染顺序
    pub const ORDER: [Composite; 4] = [Composite::Or, Composite::And, Composite::Not, Composite::Nor];

    /// 条件字符串中的连接词
    pub fn keyword(self) -> &'static str {
        match self {
            Composite::Or => "OR",
            Composite::And => "AND",
            Composite::Not => "NOT",
            Composite::Nor => "NOR",
        }
    }

    /// MongoDB 操作符
    pub fn operator(self) -> &'static str {
        match self {
            Composite::Or => "$or",
            Composite::And => "$and",
            Composite::Not => "$not",
            Composite::Nor => "$nor",
        }
    }
}

/// 条件节点
///
/// `op` 为空字符串表示相等条件
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub op: String,
    pub key: String,
    pub value: Bson,
}

impl Node {
    pub fn new(op: &str, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        let op = if op.is_empty() || op.starts_with('$') {
            op.to_string()
        } else {
            format!("${}", op)
        };
        Self {
            op,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn eq(key: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::new("", key, value)
    }

    pub fn gt(key: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::new("$gt", key, value)
    }

    pub fn gte(key: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::new("$gte", key, value)
    }

    pub fn lt(key: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::new("$lt", key, value)
    }

    pub fn lte(key: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::new("$lte", key, value)
    }

    pub fn ne(key: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::new("$ne", key, value)
    }

    pub fn r#in(key: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::new("$in", key, value)
    }

    pub fn nin(key: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::new("$nin", key, value)
    }

    fn render_into(&self, schema: Option<&Schema>, filter: &mut Filter) {
        let key = match schema {
            Some(schema) => schema.field_db_name(&self.key),
            None => self.key.as_str(),
        };
        if self.op.is_empty() {
            filter.eq(key, self.value.clone());
        } else {
            filter.any(&self.op, key, self.value.clone());
        }
    }
}

/// where 条件的输入形态
#[derive(Debug, Clone)]
pub enum Condition {
    /// 条件字符串或字段名
    Text(String),
    /// 主键值
    Primary(Bson),
    /// 字段到值的映射，逐项按相等条件处理
    Map(Vec<(String, Bson)>),
    /// 原生过滤文档，原样合并
    Filter(Document),
}

impl From<&str> for Condition {
    fn from(s: &str) -> Self {
        Condition::Text(s.to_string())
    }
}

impl From<String> for Condition {
    fn from(s: String) -> Self {
        Condition::Text(s)
    }
}

impl From<&String> for Condition {
    fn from(s: &String) -> Self {
        Condition::Text(s.clone())
    }
}

impl From<Document> for Condition {
    fn from(doc: Document) -> Self {
        Condition::Filter(doc)
    }
}

impl From<Filter> for Condition {
    fn from(filter: Filter) -> Self {
        Condition::Filter(filter.into_document())
    }
}

impl From<Bson> for Condition {
    fn from(value: Bson) -> Self {
        Condition::Primary(value)
    }
}

impl From<i32> for Condition {
    fn from(value: i32) -> Self {
        Condition::Primary(Bson::Int32(value))
    }
}

impl From<i64> for Condition {
    fn from(value: i64) -> Self {
        Condition::Primary(Bson::Int64(value))
    }
}

impl From<mongodb::bson::oid::ObjectId> for Condition {
    fn from(value: mongodb::bson::oid::ObjectId) -> Self {
        Condition::Primary(Bson::ObjectId(value))
    }
}

impl<V: Into<Bson>> From<HashMap<String, V>> for Condition {
    fn from(map: HashMap<String, V>) -> Self {
        Condition::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<V: Into<Bson>> From<BTreeMap<String, V>> for Condition {
    fn from(map: BTreeMap<String, V>) -> Self {
        Condition::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// 构建参数列表
///
/// ```ignore
/// query.where_clause("age > ? AND name = ?", args![18, "John"]);
/// ```
#[macro_export]
macro_rules! args {
    () => { Vec::<$crate::bson::Bson>::new() };
    ($($arg:expr),+ $(,)?) => {
        vec![$($crate::bson::Bson::from($arg)),+]
    };
}

/// 是否为标量值（单值匹配用相等，其余用 `$in`）
fn is_scalar(value: &Bson) -> bool {
    !matches!(value, Bson::Array(_) | Bson::Document(_))
}

/// 查询条件
#[derive(Debug, Clone, Default)]
pub struct Query {
    filter: Option<Filter>,
    nodes: Vec<Node>,
    complex: Vec<(Composite, Vec<Node>)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// 条件节点总数
    pub fn len(&self) -> usize {
        self.nodes.len() + self.complex.iter().map(|(_, n)| n.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.filter.as_ref().is_none_or(|f| f.is_empty())
    }

    /// 追加一个条件节点
    pub fn push_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    fn push_composite(&mut self, composite: Composite, nodes: Vec<Node>) {
        if nodes.is_empty() {
            return;
        }
        match self.complex.iter_mut().find(|(c, _)| *c == composite) {
            Some((_, existing)) => existing.extend(nodes),
            None => self.complex.push((composite, nodes)),
        }
    }

    pub fn primary(&mut self, value: impl Into<Bson>) {
        self.eq(PRIMARY_KEY, value);
    }

    pub fn eq(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        self.push_node(Node::eq(key, value));
    }

    pub fn gt(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        self.push_node(Node::gt(key, value));
    }

    pub fn gte(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        self.push_node(Node::gte(key, value));
    }

    pub fn lt(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        self.push_node(Node::lt(key, value));
    }

    pub fn lte(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        self.push_node(Node::lte(key, value));
    }

    pub fn ne(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        self.push_node(Node::ne(key, value));
    }

    pub fn r#in(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        self.push_node(Node::r#in(key, value));
    }

    pub fn nin(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        self.push_node(Node::nin(key, value));
    }

    pub fn or(&mut self, nodes: Vec<Node>) {
        self.push_composite(Composite::Or, nodes);
    }

    pub fn and(&mut self, nodes: Vec<Node>) {
        self.push_composite(Composite::And, nodes);
    }

    pub fn not(&mut self, nodes: Vec<Node>) {
        self.push_composite(Composite::Not, nodes);
    }

    pub fn nor(&mut self, nodes: Vec<Node>) {
        self.push_composite(Composite::Nor, nodes);
    }

    /// where 条件入口
    ///
    /// - 条件字符串：`"age > ? AND name = ?"`，`AND` 连接的条件平铺到顶层
    /// - 不含操作符的字符串且无参数：视为主键值
    /// - 字段名加一个参数：标量相等，数组为 `$in`
    /// - 字段名加多个参数：`$in` 全部参数
    /// - 映射：逐项相等；原生文档：原样合并
    pub fn where_clause(&mut self, condition: impl Into<Condition>, args: Vec<Bson>) {
        match condition.into() {
            Condition::Text(text) => {
                if is_query_format(&text) {
                    self.form_clause(&text, &args);
                } else {
                    match args.len() {
                        0 => self.form_primary(Bson::String(text)),
                        1 => {
                            let value = args.into_iter().next().unwrap_or(Bson::Null);
                            self.form_field(text, value);
                        }
                        _ => self.r#in(text, Bson::Array(args)),
                    }
                }
            }
            Condition::Primary(value) => self.form_primary(value),
            Condition::Map(entries) => {
                for (k, v) in entries {
                    self.eq(k, v);
                }
            }
            Condition::Filter(doc) => match self.filter.as_mut() {
                Some(existing) => existing.merge(Filter::from(doc)),
                None => self.filter = Some(Filter::from(doc)),
            },
        }
    }

    fn form_primary(&mut self, value: Bson) {
        if is_scalar(&value) {
            self.eq(PRIMARY_KEY, value);
        } else {
            self.r#in(PRIMARY_KEY, value);
        }
    }

    fn form_field(&mut self, key: String, value: Bson) {
        if is_scalar(&value) {
            self.eq(key, value);
        } else {
            self.r#in(key, value);
        }
    }

    fn form_clause(&mut self, text: &str, args: &[Bson]) {
        let parsed = parser::parse_clause(text, args);
        debug_log!("解析条件 `{}` -> {:?} {:?}", text, parsed.composite, parsed.nodes);
        match parsed.composite {
            Composite::And => self.nodes.extend(parsed.nodes),
            other => self.push_composite(other, parsed.nodes),
        }
    }

    /// 渲染为过滤文档
    ///
    /// 纯函数，多次调用结果相同
    pub fn build(&self, schema: Option<&Schema>) -> Filter {
        let mut filter = Filter::new();
        if let Some(base) = &self.filter {
            filter.merge(base.clone());
        }
        for node in &self.nodes {
            node.render_into(schema, &mut filter);
        }
        for composite in Composite::ORDER {
            let Some((_, nodes)) = self.complex.iter().find(|(c, _)| *c == composite) else {
                continue;
            };
            for node in nodes {
                let mut sub = Filter::new();
                node.render_into(schema, &mut sub);
                filter.match_op(composite.operator(), sub);
            }
        }
        filter
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.build(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldMeta, ModelMeta};
    use mongodb::bson::{bson, doc};

    fn schema() -> Schema {
        let meta = ModelMeta::new("role")
            .field(FieldMeta::new("id", "_id").primary())
            .field(FieldMeta::new("nick_name", "nick"))
            .field(FieldMeta::plain("age"));
        Schema::from_meta("Role", meta).unwrap()
    }

    #[test]
    fn test_sql_like_and_flattens() {
        let mut q = Query::new();
        q.where_clause("age > ? AND name = ?", args![18, "John"]);
        assert_eq!(
            q.build(None).into_document(),
            doc! { "age": { "$gt": 18 }, "name": "John" }
        );
    }

    #[test]
    fn test_sql_like_or_nests() {
        let mut q = Query::new();
        q.where_clause("_id = ? OR uid = ? OR iid IN ?", args![100, "GM", vec![1, 2, 3]]);
        assert_eq!(
            q.build(None).into_document(),
            doc! { "$or": [ { "_id": 100 }, { "uid": "GM" }, { "iid": { "$in": [1, 2, 3] } } ] }
        );
    }

    #[test]
    fn test_not_equal_renders_nin() {
        let mut q = Query::new();
        q.where_clause("_id!=?", args![180]);
        assert_eq!(q.build(None).into_document(), doc! { "_id": { "$nin": [180] } });
    }

    #[test]
    fn test_primary_shorthand() {
        let mut q = Query::new();
        q.where_clause("r1", args![]);
        assert_eq!(q.build(None).into_document(), doc! { "_id": "r1" });

        let mut q = Query::new();
        q.where_clause(bson!([1, 2]), args![]);
        assert_eq!(q.build(None).into_document(), doc! { "_id": { "$in": [1, 2] } });
    }

    #[test]
    fn test_field_shorthand() {
        let mut q = Query::new();
        q.where_clause("uid", args!["u1"]);
        q.where_clause("lv", args![1, 2, 3]);
        q.where_clause("tag", args![vec!["a", "b"]]);
        assert_eq!(
            q.build(None).into_document(),
            doc! { "uid": "u1", "lv": { "$in": [1, 2, 3] }, "tag": { "$in": ["a", "b"] } }
        );
    }

    #[test]
    fn test_map_and_filter_inputs() {
        let mut q = Query::new();
        let mut map = HashMap::new();
        map.insert("nick_name".to_string(), "x");
        q.where_clause(map, args![]);
        q.where_clause(doc! { "raw": { "$exists": true } }, args![]);
        let schema = schema();
        assert_eq!(
            q.build(Some(&schema)).into_document(),
            doc! { "raw": { "$exists": true }, "nick": "x" }
        );
    }

    #[test]
    fn test_schema_translation() {
        let mut q = Query::new();
        q.where_clause("nick_name = ? AND age >= ?", args!["a", 3]);
        let schema = schema();
        assert_eq!(
            q.build(Some(&schema)).into_document(),
            doc! { "nick": "a", "age": { "$gte": 3 } }
        );
    }

    #[test]
    fn test_build_is_idempotent() {
        let mut q = Query::new();
        q.where_clause("_id", args![130]);
        q.where_clause("_id IN ? AND uid = ?", args![vec![110, 120], "myUid"]);
        q.or(vec![Node::eq("a", 1), Node::gt("b", 2)]);
        let first = q.build(None);
        let second = q.build(None);
        assert_eq!(first, second);
        assert_eq!(
            first.into_document(),
            doc! {
                "_id": { "$in": [130, 110, 120] },
                "uid": "myUid",
                "$or": [ { "a": 1 }, { "b": { "$gt": 2 } } ]
            }
        );
    }

    #[test]
    fn test_composites_without_simple_nodes() {
        let mut q = Query::new();
        q.nor(vec![Node::eq("a", 1)]);
        assert_eq!(q.build(None).into_document(), doc! { "$nor": [ { "a": 1 } ] });
    }
}
