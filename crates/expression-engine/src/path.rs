//! 路径访问器
//!
//! 按点号路径从原始 JSON 文本中提取单个值，不构建整棵文档树：
//! 路径之外的成员和元素通过 `IgnoredAny` 直接跳过。
//!
//! 路径规则：
//! - 顶层存在与完整路径相同的扁平键时（如 `{"a.b": 1}`）优先返回它
//! - 对象按成员名逐段下降，数组按数字下标下降
//! - 最后一段的值为 `null` 时视为存在，返回 `Some(Value::Null)`

use std::fmt;

use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;

/// 查找路径对应的值
///
/// 文本不是合法 JSON 时返回错误；路径不存在时返回 `Ok(None)`。
pub fn lookup(raw: &str, path: &str) -> Result<Option<Value>, serde_json::Error> {
    if path.is_empty() {
        return Ok(None);
    }

    let segments: Vec<&str> = path.split('.').collect();
    let seed = PathSeed {
        segments: &segments,
        flat_key: (segments.len() > 1).then_some(path),
    };

    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let found = seed.deserialize(&mut deserializer)?;
    deserializer.end()?;

    Ok(found)
}

/// 查找路径对应的值，解析失败视为不存在
///
/// 谓词函数使用此入口：数据形状问题不应成为错误。
pub fn resolve(raw: &str, path: &str) -> Option<Value> {
    lookup(raw, path).ok().flatten()
}

/// 判断路径是否存在
pub fn exists(raw: &str, path: &str) -> bool {
    resolve(raw, path).is_some()
}

struct PathSeed<'p> {
    segments: &'p [&'p str],
    /// 仅在根节点设置：整条路径作为扁平键的候选
    flat_key: Option<&'p str>,
}

impl<'de> DeserializeSeed<'de> for PathSeed<'_> {
    type Value = Option<Value>;

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        if self.segments.is_empty() {
            return Value::deserialize(deserializer).map(Some);
        }

        deserializer.deserialize_any(PathVisitor {
            segments: self.segments,
            flat_key: self.flat_key,
        })
    }
}

struct PathVisitor<'p> {
    segments: &'p [&'p str],
    flat_key: Option<&'p str>,
}

impl<'de> Visitor<'de> for PathVisitor<'_> {
    type Value = Option<Value>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let (head, rest) = (self.segments[0], &self.segments[1..]);
        let mut flat = None;
        let mut nested = None;

        // 必须消费完所有成员，反序列化器才能正确结束对象
        while let Some(key) = map.next_key::<String>()? {
            if flat.is_none() && self.flat_key == Some(key.as_str()) {
                flat = Some(map.next_value::<Value>()?);
            } else if nested.is_none() && key == head {
                nested = map.next_value_seed(PathSeed {
                    segments: rest,
                    flat_key: None,
                })?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }

        Ok(flat.or(nested))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let (head, rest) = (self.segments[0], &self.segments[1..]);
        let wanted: Option<usize> = head.parse().ok();
        let mut found = None;
        let mut index = 0usize;

        loop {
            if Some(index) == wanted {
                match seq.next_element_seed(PathSeed {
                    segments: rest,
                    flat_key: None,
                })? {
                    Some(value) => found = value,
                    None => break,
                }
            } else if seq.next_element::<IgnoredAny>()?.is_none() {
                break;
            }
            index += 1;
        }

        Ok(found)
    }

    // 标量无法继续下降
    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const EVENT: &str = r#"{
        "event": {"type": "login", "source": null},
        "user": {"name": "alice", "age": 30, "tags": ["admin", "ops"]},
        "hosts": [{"ip": "10.0.0.1"}, {"ip": "10.0.0.2"}],
        "score": 9.5
    }"#;

    #[test]
    fn test_nested_field() {
        assert_eq!(resolve(EVENT, "event.type"), Some(json!("login")));
        assert_eq!(resolve(EVENT, "user.age"), Some(json!(30)));
        assert_eq!(resolve(EVENT, "score"), Some(json!(9.5)));
    }

    #[test]
    fn test_returns_composite_values() {
        assert_eq!(resolve(EVENT, "user.tags"), Some(json!(["admin", "ops"])));
        assert_eq!(
            resolve(EVENT, "event"),
            Some(json!({"type": "login", "source": null}))
        );
    }

    #[test]
    fn test_array_index() {
        assert_eq!(resolve(EVENT, "user.tags.1"), Some(json!("ops")));
        assert_eq!(resolve(EVENT, "hosts.1.ip"), Some(json!("10.0.0.2")));
        assert_eq!(resolve(EVENT, "hosts.5.ip"), None);
        assert_eq!(resolve(EVENT, "hosts.ip"), None);
    }

    #[test]
    fn test_null_counts_as_present() {
        assert_eq!(resolve(EVENT, "event.source"), Some(Value::Null));
        assert!(exists(EVENT, "event.source"));
    }

    #[test]
    fn test_missing_field() {
        assert_eq!(resolve(EVENT, "nonexistent"), None);
        assert_eq!(resolve(EVENT, "user.name.first"), None);
        assert_eq!(resolve(EVENT, ""), None);
    }

    #[test]
    fn test_flat_key_precedence() {
        let raw = r#"{"actor": {"id": "nested"}, "actor.id": "flat"}"#;
        assert_eq!(resolve(raw, "actor.id"), Some(json!("flat")));

        let raw = r#"{"actor.id": "flat", "actor": {"id": "nested"}}"#;
        assert_eq!(resolve(raw, "actor.id"), Some(json!("flat")));
    }

    #[test]
    fn test_array_at_root() {
        let raw = r#"[{"name": "first"}, {"name": "second"}]"#;
        assert_eq!(resolve(raw, "1.name"), Some(json!("second")));
    }

    #[test]
    fn test_malformed_json() {
        assert!(lookup(r#"{"a": "#, "a").is_err());
        assert!(lookup(r#"{"a": 1} trailing"#, "a").is_err());
        assert_eq!(resolve(r#"{"a": "#, "a"), None);
    }
}
