//! 评估输入
//!
//! 调用方可以传入 JSON 文本、已解析的 JSON 值、预解码的变量表或任意可序列化
//! 的消息，统一规范化为「顶层变量表 + 原始 JSON 文本」。

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{EngineError, Result};
use crate::value::{Value, ValueMap, ValueSignature};

/// 一次评估的输入数据
#[derive(Debug, Clone)]
pub enum EventData {
    /// 原始 JSON 文本
    Json(Arc<str>),
    /// 已解析的 JSON 值
    Document(JsonValue),
    /// 预解码的变量表
    Values(ValueMap),
}

impl EventData {
    /// 从可序列化的消息构造
    pub fn message<T: Serialize + ?Sized>(message: &T) -> Result<Self> {
        Ok(Self::Document(serde_json::to_value(message)?))
    }
}

impl From<&str> for EventData {
    fn from(text: &str) -> Self {
        Self::Json(Arc::from(text))
    }
}

impl From<String> for EventData {
    fn from(text: String) -> Self {
        Self::Json(Arc::from(text))
    }
}

impl From<Arc<str>> for EventData {
    fn from(text: Arc<str>) -> Self {
        Self::Json(text)
    }
}

impl From<JsonValue> for EventData {
    fn from(json: JsonValue) -> Self {
        Self::Document(json)
    }
}

impl From<ValueMap> for EventData {
    fn from(values: ValueMap) -> Self {
        Self::Values(values)
    }
}

/// 规范化后的输入
#[derive(Debug, Clone)]
pub struct NormalizedInput {
    pub values: ValueMap,
    /// 路径感知函数读取的原始 JSON 文本
    pub raw: Arc<str>,
}

impl NormalizedInput {
    /// 规范化输入
    ///
    /// 空文本、空变量表、`null` 以及顶层不是对象的 JSON 都是无效输入；
    /// 空对象 `{}` 是有效输入。
    pub fn from_event(data: EventData) -> Result<Self> {
        match data {
            EventData::Json(text) => {
                if text.trim().is_empty() {
                    return Err(EngineError::InvalidInput("输入文本为空".to_string()));
                }
                let document: JsonValue = serde_json::from_str(&text)?;
                let values = top_level_values(&document)?;
                Ok(Self { values, raw: text })
            }
            EventData::Document(document) => {
                let values = top_level_values(&document)?;
                let raw = Arc::from(serde_json::to_string(&document)?);
                Ok(Self { values, raw })
            }
            EventData::Values(values) => {
                if values.is_empty() {
                    return Err(EngineError::InvalidInput("变量表为空".to_string()));
                }
                let document = JsonValue::Object(
                    values
                        .iter()
                        .map(|(name, value)| (name.clone(), value.to_json()))
                        .collect(),
                );
                let raw = Arc::from(serde_json::to_string(&document)?);
                Ok(Self { values, raw })
            }
        }
    }

    /// 输入的类型签名
    pub fn signature(&self) -> ValueSignature {
        ValueSignature::from_values(&self.values)
    }
}

fn top_level_values(document: &JsonValue) -> Result<ValueMap> {
    match document {
        JsonValue::Object(members) => Ok(members
            .iter()
            .map(|(name, value)| (name.clone(), Value::from_json(value)))
            .collect()),
        JsonValue::Null => Err(EngineError::InvalidInput("输入为 null".to_string())),
        other => Err(EngineError::InvalidInput(format!(
            "输入顶层必须是对象，实际为 {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
