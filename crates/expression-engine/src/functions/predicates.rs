//! 路径感知谓词
//!
//! 统一的解析策略：
//! - 路径不存在返回中性值（false 或默认值），不报错
//! - 类型不一致时先尝试数值字符串与数值互转，失败返回中性值
//! - 作者提供的操作数格式错误（无效 CIDR、无效正则）返回中性值
//! - 实参个数与重载不一致是集成缺陷，返回 `EvalError::Arity`

use std::cmp::Ordering;
use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::coerce::{json_bool, json_equals_value, json_numeric, json_text, value_numeric};
use super::{FunctionDecl, FunctionRegistry, expect_args};
use crate::error::EvalError;
use crate::expr::Type;
use crate::path;
use crate::pattern::PatternCache;
use crate::value::Value;

pub(super) fn register(registry: &mut FunctionRegistry, patterns: Arc<PatternCache>) {
    let strings = || Type::list(Type::String);

    registry
        .declare(
            FunctionDecl::new("exists")
                .path_aware()
                .overload("exists_string", vec![Type::String], Type::Bool),
        )
        .bind("exists_string", exists);

    registry.declare(
        FunctionDecl::new("safe")
            .path_aware()
            .overload("safe_string", vec![Type::String, Type::String], Type::String)
            .overload("safe_int", vec![Type::String, Type::Int], Type::Int)
            .overload("safe_double", vec![Type::String, Type::Double], Type::Double)
            .overload("safe_bool", vec![Type::String, Type::Bool], Type::Bool),
    );
    for id in ["safe_string", "safe_int", "safe_double", "safe_bool"] {
        registry.bind(id, safe);
    }

    registry.declare(
        FunctionDecl::new("equals")
            .path_aware()
            .overload("equals_string", vec![Type::String, Type::String], Type::Bool)
            .overload("equals_int", vec![Type::String, Type::Int], Type::Bool)
            .overload("equals_uint", vec![Type::String, Type::Uint], Type::Bool)
            .overload("equals_double", vec![Type::String, Type::Double], Type::Bool)
            .overload("equals_bool", vec![Type::String, Type::Bool], Type::Bool),
    );
    for id in [
        "equals_string",
        "equals_int",
        "equals_uint",
        "equals_double",
        "equals_bool",
    ] {
        registry.bind(id, equals);
    }

    registry
        .declare(
            FunctionDecl::new("equalsIgnoreCase").path_aware().overload(
                "equalsIgnoreCase_string",
                vec![Type::String, Type::String],
                Type::Bool,
            ),
        )
        .bind("equalsIgnoreCase_string", equals_ignore_case);

    registry
        .declare(
            FunctionDecl::new("contains")
                .path_aware()
                .overload("contains_string", vec![Type::String, Type::String], Type::Bool)
                .overload("contains_list", vec![Type::String, strings()], Type::Bool),
        )
        .bind("contains_string", contains)
        .bind("contains_list", contains);

    registry
        .declare(
            FunctionDecl::new("containsAll")
                .path_aware()
                .overload("containsAll_list", vec![Type::String, strings()], Type::Bool),
        )
        .bind("containsAll_list", contains_all);

    registry
        .declare(FunctionDecl::new("oneOf").path_aware().overload(
            "oneOf_list",
            vec![Type::String, Type::list(Type::Dyn)],
            Type::Bool,
        ))
        .bind("oneOf_list", one_of);

    registry
        .declare(
            FunctionDecl::new("startsWith")
                .path_aware()
                .overload("startsWith_string", vec![Type::String, Type::String], Type::Bool)
                .overload("startsWith_list", vec![Type::String, strings()], Type::Bool),
        )
        .bind("startsWith_string", starts_with)
        .bind("startsWith_list", starts_with);

    registry
        .declare(
            FunctionDecl::new("endsWith")
                .path_aware()
                .overload("endsWith_string", vec![Type::String, Type::String], Type::Bool)
                .overload("endsWith_list", vec![Type::String, strings()], Type::Bool),
        )
        .bind("endsWith_string", ends_with)
        .bind("endsWith_list", ends_with);

    registry
        .declare(FunctionDecl::new("regexMatch").path_aware().overload(
            "regexMatch_string",
            vec![Type::String, Type::String],
            Type::Bool,
        ))
        .bind("regexMatch_string", move |args| regex_match(&patterns, args));

    let orderings: [(&'static str, fn(Ordering) -> bool); 4] = [
        ("lessThan", Ordering::is_lt),
        ("greaterThan", Ordering::is_gt),
        ("lessOrEqual", Ordering::is_le),
        ("greaterOrEqual", Ordering::is_ge),
    ];
    for (name, accept) in orderings {
        let mut decl = FunctionDecl::new(name).path_aware();
        for (suffix, operand) in [
            ("int", Type::Int),
            ("uint", Type::Uint),
            ("double", Type::Double),
            ("string", Type::String),
        ] {
            let id = format!("{}_{}", name, suffix);
            decl = decl.overload(id.clone(), vec![Type::String, operand], Type::Bool);
            registry.bind(id, move |args| compare_path(name, args, accept));
        }
        registry.declare(decl);
    }

    registry
        .declare(FunctionDecl::new("inCIDR").path_aware().overload(
            "inCIDR_string",
            vec![Type::String, Type::String],
            Type::Bool,
        ))
        .bind("inCIDR_string", in_cidr);
}

/// 检查实参个数并解析路径
///
/// `arity` 包含隐藏的文档参数和路径参数。返回路径上的值与剩余操作数。
pub(super) fn resolve_target<'a>(
    function: &str,
    args: &'a [Value],
    arity: usize,
) -> Result<(Option<JsonValue>, &'a [Value]), EvalError> {
    let args = expect_args(function, args, arity)?;
    let found = match (&args[0], &args[1]) {
        (Value::String(document), Value::String(path)) => path::resolve(document, path),
        _ => None,
    };
    Ok((found, &args[2..]))
}

/// 字符串或字符串列表形式的操作数
fn alternatives(operand: &Value) -> Vec<&str> {
    match operand {
        Value::String(s) => vec![s.as_ref()],
        Value::List(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn exists(args: &[Value]) -> Result<Value, EvalError> {
    let (found, _) = resolve_target("exists", args, 2)?;
    Ok(Value::Bool(found.is_some()))
}

fn safe(args: &[Value]) -> Result<Value, EvalError> {
    let (found, rest) = resolve_target("safe", args, 3)?;
    let default = &rest[0];

    let coerced = found.as_ref().and_then(|json| match default {
        Value::String(_) => json_text(json).map(|text| Value::string(text.into_owned())),
        Value::Int(_) => json_numeric(json)
            .and_then(|n| n.to_i64())
            .map(Value::Int),
        Value::Double(_) => json_numeric(json).map(|n| Value::Double(n.as_f64())),
        Value::Bool(_) => json_bool(json).map(Value::Bool),
        _ => None,
    });

    Ok(coerced.unwrap_or_else(|| default.clone()))
}

fn equals(args: &[Value]) -> Result<Value, EvalError> {
    let (found, rest) = resolve_target("equals", args, 3)?;
    Ok(Value::Bool(
        found.is_some_and(|json| json_equals_value(&json, &rest[0])),
    ))
}

fn equals_ignore_case(args: &[Value]) -> Result<Value, EvalError> {
    let (found, rest) = resolve_target("equalsIgnoreCase", args, 3)?;
    let matched = match (found.as_ref().and_then(json_text), rest[0].as_str()) {
        (Some(text), Some(expected)) => text.to_lowercase() == expected.to_lowercase(),
        _ => false,
    };
    Ok(Value::Bool(matched))
}

/// 字符串取子串包含，数组取元素相等
fn contains_one(json: &JsonValue, needle: &str) -> bool {
    match json {
        JsonValue::Array(items) => items
            .iter()
            .any(|item| json_text(item).is_some_and(|text| text == needle)),
        other => json_text(other).is_some_and(|text| text.contains(needle)),
    }
}

fn contains(args: &[Value]) -> Result<Value, EvalError> {
    let (found, rest) = resolve_target("contains", args, 3)?;
    let matched = found.is_some_and(|json| {
        alternatives(&rest[0])
            .into_iter()
            .any(|needle| contains_one(&json, needle))
    });
    Ok(Value::Bool(matched))
}

fn contains_all(args: &[Value]) -> Result<Value, EvalError> {
    let (found, rest) = resolve_target("containsAll", args, 3)?;
    let needles = alternatives(&rest[0]);
    // 空列表不构成任何约束，按不匹配处理
    if needles.is_empty() {
        return Ok(Value::Bool(false));
    }
    let matched =
        found.is_some_and(|json| needles.iter().all(|needle| contains_one(&json, needle)));
    Ok(Value::Bool(matched))
}

fn one_of(args: &[Value]) -> Result<Value, EvalError> {
    let (found, rest) = resolve_target("oneOf", args, 3)?;
    let matched = match (&found, &rest[0]) {
        (Some(json), Value::List(items)) => {
            items.iter().any(|item| json_equals_value(json, item))
        }
        _ => false,
    };
    Ok(Value::Bool(matched))
}

fn affix(
    function: &str,
    args: &[Value],
    test: impl Fn(&str, &str) -> bool,
) -> Result<Value, EvalError> {
    let (found, rest) = resolve_target(function, args, 3)?;
    let matched = found.as_ref().and_then(json_text).is_some_and(|text| {
        alternatives(&rest[0])
            .into_iter()
            .any(|needle| test(text.as_ref(), needle))
    });
    Ok(Value::Bool(matched))
}

fn starts_with(args: &[Value]) -> Result<Value, EvalError> {
    affix("startsWith", args, |text, prefix| text.starts_with(prefix))
}

fn ends_with(args: &[Value]) -> Result<Value, EvalError> {
    affix("endsWith", args, |text, suffix| text.ends_with(suffix))
}

fn regex_match(patterns: &PatternCache, args: &[Value]) -> Result<Value, EvalError> {
    let (found, rest) = resolve_target("regexMatch", args, 3)?;
    let (Some(json), Some(pattern)) = (found, rest[0].as_str()) else {
        return Ok(Value::Bool(false));
    };
    let Some(text) = json_text(&json) else {
        return Ok(Value::Bool(false));
    };

    match patterns.get_compiled_pattern(pattern) {
        Ok(regex) => Ok(Value::Bool(regex.is_match(&text))),
        Err(err) => {
            debug!(pattern = %pattern, error = %err, "regexMatch 模式无效，按不匹配处理");
            Ok(Value::Bool(false))
        }
    }
}

fn compare_path(
    function: &str,
    args: &[Value],
    accept: fn(Ordering) -> bool,
) -> Result<Value, EvalError> {
    let (found, rest) = resolve_target(function, args, 3)?;
    let matched = found
        .as_ref()
        .and_then(json_numeric)
        .zip(value_numeric(&rest[0]))
        .and_then(|(actual, expected)| actual.compare(expected))
        .is_some_and(accept);
    Ok(Value::Bool(matched))
}

/// 解析 CIDR；单个地址视为主机网段
fn parse_network(cidr: &str) -> Option<IpNet> {
    let cidr = cidr.trim();
    cidr.parse::<IpNet>()
        .ok()
        .or_else(|| cidr.parse::<IpAddr>().ok().map(IpNet::from))
}

fn in_cidr(args: &[Value]) -> Result<Value, EvalError> {
    let (found, rest) = resolve_target("inCIDR", args, 3)?;
    let network = rest[0].as_str().and_then(parse_network);
    let address = found
        .as_ref()
        .and_then(json_text)
        .and_then(|text| text.trim().parse::<IpAddr>().ok());

    let matched = match (network, address) {
        (Some(network), Some(address)) => network.contains(&address),
        _ => false,
    };
    Ok(Value::Bool(matched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use filter_shared::config::CacheSettings;

    use crate::pattern::SharedPatternDictionary;

    const DOC: &str = r#"{
        "user": {"name": "Alice", "age": "30", "score": 88.5, "active": "true"},
        "age": 30,
        "ip": "192.168.1.42",
        "bad_ip": "garbage",
        "tags": ["admin", "ops"],
        "path": "/api/v1/users",
        "nothing": null
    }"#;

    fn call(
        f: fn(&[Value]) -> Result<Value, EvalError>,
        path: &str,
        operands: &[Value],
    ) -> Value {
        let mut args = vec![Value::from(DOC), Value::from(path)];
        args.extend_from_slice(operands);
        f(&args).unwrap()
    }

    fn strings(items: &[&str]) -> Value {
        Value::list(items.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn test_exists() {
        assert_eq!(call(exists, "user.name", &[]), Value::Bool(true));
        assert_eq!(call(exists, "nothing", &[]), Value::Bool(true));
        assert_eq!(call(exists, "user.email", &[]), Value::Bool(false));
    }

    #[test]
    fn test_safe_defaults() {
        assert_eq!(call(safe, "missing.path", &["default".into()]), Value::from("default"));
        assert_eq!(call(safe, "user.name", &["default".into()]), Value::from("Alice"));
        assert_eq!(call(safe, "user.score", &[Value::Double(0.0)]), Value::Double(88.5));
        assert_eq!(call(safe, "user.age", &[Value::Double(0.0)]), Value::Double(30.0));
        assert_eq!(call(safe, "user.name", &[Value::Double(0.0)]), Value::Double(0.0));
        assert_eq!(call(safe, "user.age", &[Value::Int(0)]), Value::Int(30));
        assert_eq!(call(safe, "user.score", &[Value::Int(-1)]), Value::Int(-1));
        assert_eq!(call(safe, "user.active", &[Value::Bool(false)]), Value::Bool(true));
        assert_eq!(call(safe, "nothing", &["d".into()]), Value::from("d"));
    }

    #[test]
    fn test_equals_with_coercion() {
        assert_eq!(call(equals, "age", &[Value::Int(30)]), Value::Bool(true));
        assert_eq!(call(equals, "user.age", &[Value::Int(30)]), Value::Bool(true));
        assert_eq!(call(equals, "age", &["30".into()]), Value::Bool(true));
        assert_eq!(call(equals, "age", &["not_number".into()]), Value::Bool(false));
        assert_eq!(call(equals, "missing", &[Value::Int(30)]), Value::Bool(false));
    }

    #[test]
    fn test_equals_ignore_case() {
        assert_eq!(call(equals_ignore_case, "user.name", &["ALICE".into()]), Value::Bool(true));
        assert_eq!(call(equals_ignore_case, "user.name", &["bob".into()]), Value::Bool(false));
    }

    #[test]
    fn test_contains_forms() {
        assert_eq!(call(contains, "path", &["/v1/".into()]), Value::Bool(true));
        assert_eq!(call(contains, "tags", &["ops".into()]), Value::Bool(true));
        assert_eq!(call(contains, "tags", &["op".into()]), Value::Bool(false));
        assert_eq!(call(contains, "path", &[strings(&["/v2/", "users"])]), Value::Bool(true));
        assert_eq!(call(contains, "missing", &["x".into()]), Value::Bool(false));
    }

    #[test]
    fn test_contains_all() {
        assert_eq!(call(contains_all, "tags", &[strings(&["admin", "ops"])]), Value::Bool(true));
        assert_eq!(call(contains_all, "tags", &[strings(&["admin", "dev"])]), Value::Bool(false));
        assert_eq!(call(contains_all, "path", &[strings(&["api", "users"])]), Value::Bool(true));
        assert_eq!(call(contains_all, "tags", &[strings(&[])]), Value::Bool(false));
    }

    #[test]
    fn test_one_of_hybrid_list() {
        let options = Value::list(vec!["x".into(), Value::Int(30)]);
        assert_eq!(call(one_of, "age", &[options.clone()]), Value::Bool(true));
        assert_eq!(call(one_of, "user.age", &[options.clone()]), Value::Bool(true));
        assert_eq!(call(one_of, "user.name", &[options]), Value::Bool(false));
    }

    #[test]
    fn test_affixes() {
        assert_eq!(call(starts_with, "path", &["/api".into()]), Value::Bool(true));
        assert_eq!(call(ends_with, "path", &[strings(&["/groups", "/users"])]), Value::Bool(true));
        assert_eq!(call(ends_with, "tags", &["ops".into()]), Value::Bool(false));
    }

    #[test]
    fn test_numeric_ordering() {
        let lt = |args: &[Value]| compare_path("lessThan", args, Ordering::is_lt);
        let ge = |args: &[Value]| compare_path("greaterOrEqual", args, Ordering::is_ge);
        let doc_args = |path: &str, operand: Value| vec![Value::from(DOC), Value::from(path), operand];

        assert_eq!(lt(&doc_args("age", Value::Int(31))).unwrap(), Value::Bool(true));
        assert_eq!(lt(&doc_args("user.age", "40".into())).unwrap(), Value::Bool(true));
        assert_eq!(ge(&doc_args("user.score", Value::Double(88.5))).unwrap(), Value::Bool(true));
        assert_eq!(lt(&doc_args("user.name", Value::Int(1))).unwrap(), Value::Bool(false));
        assert_eq!(lt(&doc_args("missing", Value::Int(1))).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_in_cidr() {
        let cidr = |path: &str, block: &str| call(in_cidr, path, &[block.into()]);
        assert_eq!(cidr("ip", "192.168.1.0/24"), Value::Bool(true));
        assert_eq!(cidr("ip", "10.0.0.0/8"), Value::Bool(false));
        assert_eq!(cidr("bad_ip", "192.168.1.0/24"), Value::Bool(false));
        assert_eq!(cidr("ip", "not-a-cidr"), Value::Bool(false));
        assert_eq!(cidr("ip", "192.168.1.42"), Value::Bool(true));
        assert_eq!(cidr("missing", "192.168.1.0/24"), Value::Bool(false));
    }

    #[test]
    fn test_regex_match_through_pattern_cache() {
        let patterns = PatternCache::new(
            &CacheSettings::new(8, 60),
            10,
            Arc::new(SharedPatternDictionary::from([("Version", r"v\d+")])),
        )
        .unwrap();

        let args = |pattern: &str| vec![Value::from(DOC), Value::from("path"), Value::from(pattern)];
        assert_eq!(
            regex_match(&patterns, &args("^/api/{{.Version}}/")).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(regex_match(&patterns, &args("^/admin")).unwrap(), Value::Bool(false));
        // 无效模式返回 false 而不是错误
        assert_eq!(regex_match(&patterns, &args("[unclosed")).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_wrong_arity_is_an_error() {
        let err = exists(&[Value::from(DOC)]).unwrap_err();
        assert_eq!(
            err,
            EvalError::Arity {
                function: "exists".into(),
                expected: 2,
                actual: 1,
            }
        );
        assert!(matches!(
            equals(&[Value::from(DOC), Value::from("age")]),
            Err(EvalError::Arity { .. })
        ));
    }

    #[test]
    fn test_malformed_document_is_missing() {
        let args = vec![Value::from("{not json"), Value::from("a")];
        assert_eq!(exists(&args).unwrap(), Value::Bool(false));
    }
}
