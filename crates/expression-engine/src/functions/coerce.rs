//! 尽力而为的类型转换
//!
//! 路径上取到的 JSON 值与表达式中的操作数类型不一致时，先尝试数值字符串与
//! 数值之间的互相转换，转换失败由调用方返回中性值。

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::Value as JsonValue;

use crate::value::Value;

/// 统一的数值表示
///
/// JSON 中没有小数部分的数按整数比较，其余按浮点数比较。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Integer(i128),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Integer(i) => i as f64,
            Numeric::Float(f) => f,
        }
    }

    /// 解析数值字符串，允许首尾空白；非有限值不算数值
    pub fn parse(text: &str) -> Option<Numeric> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Ok(i) = text.parse::<i128>() {
            return Some(Numeric::Integer(i));
        }
        text.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Numeric::Float)
    }

    pub fn compare(self, other: Numeric) -> Option<Ordering> {
        match (self, other) {
            (Numeric::Integer(a), Numeric::Integer(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    pub fn equals(self, other: Numeric) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// 转为 i64，浮点数需没有小数部分
    pub fn to_i64(self) -> Option<i64> {
        match self {
            Numeric::Integer(i) => i64::try_from(i).ok(),
            Numeric::Float(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                Some(f as i64)
            }
            Numeric::Float(_) => None,
        }
    }
}

/// JSON 值的数值形式：数值本身或数值字符串
pub fn json_numeric(json: &JsonValue) -> Option<Numeric> {
    match json {
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Numeric::Integer(i128::from(i)))
            } else if let Some(u) = n.as_u64() {
                Some(Numeric::Integer(i128::from(u)))
            } else {
                n.as_f64().map(Numeric::Float)
            }
        }
        JsonValue::String(s) => Numeric::parse(s),
        _ => None,
    }
}

/// 操作数的数值形式
pub fn value_numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Int(i) => Some(Numeric::Integer(i128::from(*i))),
        Value::Uint(u) => Some(Numeric::Integer(i128::from(*u))),
        Value::Double(d) if d.is_finite() => Some(Numeric::Float(*d)),
        Value::String(s) => Numeric::parse(s),
        _ => None,
    }
}

/// JSON 标量的文本形式；数组、对象和 null 没有文本形式
pub fn json_text(json: &JsonValue) -> Option<Cow<'_, str>> {
    match json {
        JsonValue::String(s) => Some(Cow::Borrowed(s.as_str())),
        JsonValue::Number(n) => Some(Cow::Owned(n.to_string())),
        JsonValue::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
        _ => None,
    }
}

/// JSON 值的布尔形式：布尔值或 "true" / "false" 字符串（忽略大小写）
pub fn json_bool(json: &JsonValue) -> Option<bool> {
    match json {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// 路径上的 JSON 值与表达式字面量是否相等
///
/// 字符串与数值之间双向转换比较（`"100"` 与 `100` 相等），
/// 其他类型按各自的自然形式比较。
pub fn json_equals_value(json: &JsonValue, literal: &Value) -> bool {
    match literal {
        Value::String(s) => {
            if let JsonValue::String(text) = json
                && text.as_str() == s.as_ref()
            {
                return true;
            }
            match (json_numeric(json), Numeric::parse(s)) {
                (Some(a), Some(b)) => a.equals(b),
                _ => match json {
                    JsonValue::Bool(b) => s.eq_ignore_ascii_case(if *b { "true" } else { "false" }),
                    _ => false,
                },
            }
        }
        Value::Int(_) | Value::Uint(_) | Value::Double(_) => {
            match (json_numeric(json), value_numeric(literal)) {
                (Some(a), Some(b)) => a.equals(b),
                _ => false,
            }
        }
        Value::Bool(b) => json_bool(json) == Some(*b),
        Value::Null => json.is_null(),
        other => crate::operators::equals(&Value::from_json(json), other),
    }
}
