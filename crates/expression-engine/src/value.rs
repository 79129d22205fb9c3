//! 运行时值模型
//!
//! `Value` 是表达式执行时流动的值，`TypeTag` 是输入变量的粗粒度类型，
//! `ValueSignature` 描述一次评估输入的形状，参与缓存键计算。

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;

/// 预解码的输入变量表
pub type ValueMap = HashMap<String, Value>;

/// 运行时值
///
/// 复合值与字符串使用 `Arc` 共享，克隆只增加引用计数。
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
    Timestamp(DateTime<Utc>),
    List(Arc<Vec<Value>>),
    Map(Arc<BTreeMap<String, Value>>),
    /// 未拆解的结构化记录，字段在访问时才转换
    Object(Arc<JsonValue>),
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self::String(s.into())
    }

    pub fn bytes(b: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes(b.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Arc::new(items))
    }

    pub fn map(entries: BTreeMap<String, Value>) -> Self {
        Self::Map(Arc::new(entries))
    }

    pub fn object(json: JsonValue) -> Self {
        Self::Object(Arc::new(json))
    }

    /// 获取值的粗粒度类型
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Self::Null => TypeTag::Null,
            Self::Bool(_) => TypeTag::Bool,
            Self::Int(_) => TypeTag::Int,
            Self::Uint(_) => TypeTag::Uint,
            Self::Double(_) => TypeTag::Double,
            Self::String(_) => TypeTag::String,
            Self::Bytes(_) => TypeTag::Bytes,
            Self::Timestamp(_) => TypeTag::Timestamp,
            Self::List(_) => TypeTag::List,
            Self::Map(_) => TypeTag::Map,
            Self::Object(_) => TypeTag::Object,
        }
    }

    /// 获取值的类型名称
    pub fn type_name(&self) -> &'static str {
        self.type_tag().as_str()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// 尝试将数值类型转换为 f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Uint(u) => Some(*u as f64),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Uint(_) | Self::Double(_))
    }

    /// 从 JSON 值转换
    ///
    /// 整数优先落在 `Int`，超出 i64 范围的正整数落在 `Uint`，
    /// 其余数值（含小数部分或指数形式）落在 `Double`。
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::Uint(u)
                } else {
                    Self::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Self::string(s.as_str()),
            JsonValue::Array(items) => Self::list(items.iter().map(Self::from_json).collect()),
            JsonValue::Object(members) => Self::map(
                members
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// 转换为 JSON 值
    ///
    /// 字节串编码为标准 base64，时间戳编码为 RFC 3339，非有限浮点数编码为 null。
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::from(*i),
            Self::Uint(u) => JsonValue::from(*u),
            Self::Double(d) => serde_json::Number::from_f64(*d)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(s) => JsonValue::String(s.to_string()),
            Self::Bytes(b) => JsonValue::String(base64::engine::general_purpose::STANDARD.encode(b)),
            Self::Timestamp(ts) => {
                JsonValue::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::List(items) => JsonValue::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => JsonValue::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Object(json) => json.as_ref().clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::Double(d) => write!(f, "{}", d),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Self::Uint(u)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::string(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::list(items)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<&JsonValue> for Value {
    fn from(json: &JsonValue) -> Self {
        Self::from_json(json)
    }
}

/// 输入变量的粗粒度类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeTag {
    Bool,
    String,
    Int,
    Uint,
    Double,
    Bytes,
    Timestamp,
    List,
    Map,
    Null,
    Object,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::String => "string",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Double => "double",
            Self::Bytes => "bytes",
            Self::Timestamp => "timestamp",
            Self::List => "list",
            Self::Map => "map",
            Self::Null => "null",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次评估输入的类型签名
///
/// 按变量名排序存储，与输入表的迭代顺序无关。
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ValueSignature {
    entries: BTreeMap<String, TypeTag>,
}

impl ValueSignature {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从输入变量表的顶层条目计算签名
    pub fn from_values(values: &ValueMap) -> Self {
        Self {
            entries: values
                .iter()
                .map(|(name, value)| (name.clone(), value.type_tag()))
                .collect(),
        }
    }

    /// 追加一个条目（构造测试签名用）
    pub fn with(mut self, name: impl Into<String>, tag: TypeTag) -> Self {
        self.entries.insert(name.into(), tag);
        self
    }

    pub fn get(&self, name: &str) -> Option<TypeTag> {
        self.entries.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TypeTag)> {
        self.entries.iter().map(|(name, tag)| (name.as_str(), *tag))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 规范化文本表示，变量名带长度前缀，避免名称中的分隔符造成歧义
    pub fn canonical(&self) -> String {
        let mut out = String::with_capacity(self.entries.len() * 16);
        for (name, tag) in &self.entries {
            out.push_str(&name.len().to_string());
            out.push(':');
            out.push_str(name);
            out.push('=');
            out.push_str(tag.as_str());
            out.push(';');
        }
        out
    }
}

impl fmt::Display for ValueSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, tag)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, tag)?;
        }
        write!(f, "}}")
    }
}
