//! 类SQL条件字符串解析
//!
//! 支持 `= != <> >= <= > < IN NIN` 以及单一类型的 `AND`/`OR`/`NOT`/`NOR` 连接，
//! `?` 按位置取参数，`int(1)`、`float64(0.5)` 形式的字面量会转换为数值

use mongodb::bson::Bson;
use once_cell::sync::Lazy;
use rat_logger::warn;
use regex::Regex;

use super::{Composite, Node};

/// 条件操作符，按检测顺序排列
const CONDITIONS: &[&str] = &["NIN", "IN", "!=", "<>", ">=", "<=", ">", "<", "="];

static TYPED_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(int|int32|int64|float|float32|float64)\((.*)\)$")
        .unwrap_or_else(|e| panic!("类型字面量正则无效: {}", e))
});

/// 条件在字符串中的匹配形式，IN/NIN 两侧必须有空格
fn condition_token(cond: &str) -> String {
    match cond {
        "IN" | "NIN" => format!(" {} ", cond),
        other => other.to_string(),
    }
}

/// 条件对应的 MongoDB 操作符，空字符串表示相等
fn mongo_operator(cond: &str) -> &'static str {
    match cond {
        "=" => "",
        "!=" | "<>" => "$nin",
        ">=" => "$gte",
        "<=" => "$lte",
        ">" => "$gt",
        "<" => "$lt",
        "IN" => "$in",
        "NIN" => "$nin",
        _ => "",
    }
}

/// 判断字符串是否为条件表达式
pub fn is_query_format(s: &str) -> bool {
    CONDITIONS.iter().any(|c| s.contains(&condition_token(c)))
}

/// 解析结果
#[derive(Debug)]
pub(crate) struct ParsedClause {
    pub composite: Composite,
    pub nodes: Vec<Node>,
}

/// 解析条件字符串
///
/// 只识别第一个出现的连接词类型，没有连接词时按 AND 处理
pub(crate) fn parse_clause(query: &str, args: &[Bson]) -> ParsedClause {
    let mut composite = Composite::And;
    let mut pieces: Vec<&str> = Vec::new();
    for candidate in Composite::ORDER {
        let token = format!(" {} ", candidate.keyword());
        if query.contains(&token) {
            composite = candidate;
            pieces = query.split(token.as_str()).collect();
            break;
        }
    }
    if pieces.is_empty() {
        pieces.push(query);
    }

    let mut nodes = Vec::new();
    let mut arg_index = 0;
    for piece in pieces {
        let mut value = None;
        if piece.contains('?') && arg_index < args.len() {
            value = Some(args[arg_index].clone());
            arg_index += 1;
        }
        for cond in CONDITIONS {
            let token = condition_token(cond);
            if piece.contains(&token) {
                match parse_pair(piece, cond, &token, value) {
                    Some(node) => nodes.push(node),
                    None => warn!("无法解析条件片段: {}", piece),
                }
                break;
            }
        }
    }
    if arg_index < args.len() {
        warn!("条件 `{}` 有 {} 个参数未被使用", query, args.len() - arg_index);
    }
    ParsedClause { composite, nodes }
}

fn parse_pair(piece: &str, cond: &str, token: &str, value: Option<Bson>) -> Option<Node> {
    let parts: Vec<&str> = piece.split(token).collect();
    if parts.len() != 2 {
        return None;
    }
    let key = parts[0].trim();
    if key.is_empty() {
        return None;
    }
    let raw = parts[1].trim();
    let value = if raw == "?" {
        value.unwrap_or(Bson::Null)
    } else {
        format_literal(raw)
    };
    Some(Node::new(mongo_operator(cond), key, value))
}

/// 转换字面量
fn format_literal(raw: &str) -> Bson {
    if let Some(caps) = TYPED_LITERAL.captures(raw) {
        let kind = &caps[1];
        let inner = caps[2].trim();
        let parsed = if kind.starts_with("float") {
            inner.parse::<f64>().ok().map(Bson::Double)
        } else if kind == "int32" {
            inner.parse::<i32>().ok().map(Bson::Int32)
        } else if kind == "int64" {
            inner.parse::<i64>().ok().map(Bson::Int64)
        } else {
            inner.parse::<i64>().ok().map(|v| match i32::try_from(v) {
                Ok(small) => Bson::Int32(small),
                Err(_) => Bson::Int64(v),
            })
        };
        return parsed.unwrap_or_else(|| {
            warn!("类型字面量转换失败: {}", raw);
            Bson::String(raw.to_string())
        });
    }
    let unquoted = raw
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .unwrap_or(raw);
    Bson::String(unquoted.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_query_format() {
        assert!(is_query_format("age > ?"));
        assert!(is_query_format("_id IN ?"));
        assert!(is_query_format("name=?"));
        assert!(!is_query_format("LOGIN"));
        assert!(!is_query_format("uid"));
    }

    #[test]
    fn test_typed_literals() {
        assert_eq!(format_literal("int(5)"), Bson::Int32(5));
        assert_eq!(format_literal("int64(5)"), Bson::Int64(5));
        assert_eq!(format_literal("float(1.5)"), Bson::Double(1.5));
        assert_eq!(format_literal("'abc'"), Bson::String("abc".into()));
        assert_eq!(format_literal("int(x)"), Bson::String("int(x)".into()));
    }

    #[test]
    fn test_first_composite_wins() {
        let parsed = parse_clause(
            "a = ? OR b > ? AND c < ?",
            &[Bson::Int32(1), Bson::Int32(2), Bson::Int32(3)],
        );
        assert_eq!(parsed.composite, Composite::Or);
        // 第二段 "b > ? AND c < ?" 只消耗一个参数，按第一个匹配的条件解析
        assert_eq!(parsed.nodes.len(), 2);
    }

    #[test]
    fn test_operator_order() {
        let parsed = parse_clause("lv >= ?", &[Bson::Int32(3)]);
        assert_eq!(parsed.nodes[0].op, "$gte");
        let parsed = parse_clause("lv <> ?", &[Bson::Int32(3)]);
        assert_eq!(parsed.nodes[0].op, "$nin");
        let parsed = parse_clause("uid NIN ?", &[Bson::Int32(3)]);
        assert_eq!(parsed.nodes[0].op, "$nin");
        assert_eq!(parsed.nodes[0].key, "uid");
    }
}
