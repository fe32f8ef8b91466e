//! 字段选择器
//!
//! 三态：不限制、仅选择列出字段、排除列出字段。查询投影和更新字段过滤共用同一套判定

use mongodb::bson::Document;

use crate::model::{FieldMeta, Schema};

/// 选择器模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectorMode {
    #[default]
    None,
    Select,
    Omit,
}

/// 字段选择器
#[derive(Debug, Clone, Default)]
pub struct Selector {
    mode: SelectorMode,
    fields: Vec<String>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> SelectorMode {
        self.mode
    }

    /// 设置要选择的字段
    ///
    /// 已处于排除模式时返回 false 且不做任何修改
    pub fn select<I, S>(&mut self, fields: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accumulate(SelectorMode::Select, fields)
    }

    /// 设置要排除的字段
    ///
    /// 已处于选择模式时返回 false 且不做任何修改
    pub fn omit<I, S>(&mut self, fields: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accumulate(SelectorMode::Omit, fields)
    }

    fn accumulate<I, S>(&mut self, mode: SelectorMode, fields: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.mode != SelectorMode::None && self.mode != mode {
            return false;
        }
        self.mode = mode;
        for field in fields {
            let field = field.into();
            if !self.fields.contains(&field) {
                self.fields.push(field);
            }
        }
        true
    }

    /// 字段是否被列出
    fn listed(&self, key: &str) -> bool {
        self.fields.iter().any(|f| f == key)
    }

    /// 字段是否被选中（不考虑零值）
    pub fn has(&self, key: &str) -> bool {
        match self.mode {
            SelectorMode::None => true,
            SelectorMode::Select => self.listed(key),
            SelectorMode::Omit => !self.listed(key),
        }
    }

    /// 字段是否参与本次操作
    ///
    /// 不限制时只有非零值通过；选择模式只看是否列出；排除模式列出的字段之外全部通过
    pub fn is(&self, key: &str, is_zero: bool) -> bool {
        match self.mode {
            SelectorMode::None => !is_zero,
            _ => self.has(key),
        }
    }

    /// 同时按模型字段名和数据库字段名判定
    pub fn admits(&self, field: &FieldMeta, is_zero: bool) -> bool {
        match self.mode {
            SelectorMode::None => !is_zero,
            SelectorMode::Select => self.listed(&field.name) || self.listed(&field.db_name),
            SelectorMode::Omit => !(self.listed(&field.name) || self.listed(&field.db_name)),
        }
    }

    /// 重置为不限制
    pub fn release(&mut self) {
        self.mode = SelectorMode::None;
        self.fields.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.mode == SelectorMode::None
    }

    /// 查询投影，字段名翻译为数据库字段名
    pub fn projection(&self, schema: Option<&Schema>) -> Option<Document> {
        let flag = match self.mode {
            SelectorMode::None => return None,
            SelectorMode::Select => 1,
            SelectorMode::Omit => 0,
        };
        let mut doc = Document::new();
        for field in &self.fields {
            let key = match schema {
                Some(schema) => schema.field_db_name(field),
                None => field.as_str(),
            };
            doc.insert(key, flag);
        }
        if doc.is_empty() { None } else { Some(doc) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelMeta;
    use mongodb::bson::doc;

    #[test]
    fn test_select_then_omit_fails() {
        let mut s = Selector::new();
        assert!(s.select(["name"]));
        assert!(!s.omit(["lv"]));
        assert_eq!(s.mode(), SelectorMode::Select);
        assert!(s.has("name"));
        assert!(!s.has("lv"));
    }

    #[test]
    fn test_omit_then_select_fails() {
        let mut s = Selector::new();
        assert!(s.omit(["lv"]));
        assert!(!s.select(["name"]));
        assert_eq!(s.mode(), SelectorMode::Omit);
        assert!(s.has("name"));
        assert!(!s.has("lv"));
    }

    #[test]
    fn test_is_semantics() {
        let none = Selector::new();
        assert!(none.is("a", false));
        assert!(!none.is("a", true));

        let mut select = Selector::new();
        select.select(["a"]);
        assert!(select.is("a", true));
        assert!(!select.is("b", false));

        let mut omit = Selector::new();
        omit.omit(["a"]);
        assert!(!omit.is("a", false));
        assert!(omit.is("b", true));
    }

    #[test]
    fn test_projection_uses_db_names() {
        let meta = ModelMeta::new("t").field(FieldMeta::new("nick_name", "nick"));
        let schema = Schema::from_meta("T", meta).unwrap();
        let mut s = Selector::new();
        s.select(["nick_name", "lv"]);
        assert_eq!(s.projection(Some(&schema)), Some(doc! { "nick": 1, "lv": 1 }));

        s.release();
        assert!(s.projection(None).is_none());
        assert!(s.omit(["lv"]));
        assert_eq!(s.projection(None), Some(doc! { "lv": 0 }));
    }
}
