//! 核心内建函数
//!
//! 与路径无关，参数全部为常量时可在构建期折叠。
//! 这里的操作数是程序文本的一部分，格式错误按执行错误报告。

use std::sync::Arc;

use chrono::DateTime;

use super::time::parse_timestamp;
use super::{FunctionDecl, FunctionRegistry, expect_args};
use crate::error::EvalError;
use crate::expr::Type;
use crate::pattern::PatternCache;
use crate::value::Value;

pub(super) fn register(registry: &mut FunctionRegistry, patterns: Arc<PatternCache>) {
    registry
        .declare(
            FunctionDecl::new("size")
                .overload("size_string", vec![Type::String], Type::Int)
                .overload("size_bytes", vec![Type::Bytes], Type::Int)
                .overload("size_list", vec![Type::list(Type::Dyn)], Type::Int)
                .overload("size_map", vec![Type::map(Type::Dyn, Type::Dyn)], Type::Int),
        )
        .bind("size_string", size)
        .bind("size_bytes", size)
        .bind("size_list", size)
        .bind("size_map", size);

    registry
        .declare(
            FunctionDecl::new("int")
                .overload("int_int", vec![Type::Int], Type::Int)
                .overload("int_uint", vec![Type::Uint], Type::Int)
                .overload("int_double", vec![Type::Double], Type::Int)
                .overload("int_string", vec![Type::String], Type::Int)
                .overload("int_timestamp", vec![Type::Timestamp], Type::Int),
        )
        .bind("int_int", to_int)
        .bind("int_uint", to_int)
        .bind("int_double", to_int)
        .bind("int_string", to_int)
        .bind("int_timestamp", to_int);

    registry
        .declare(
            FunctionDecl::new("double")
                .overload("double_double", vec![Type::Double], Type::Double)
                .overload("double_int", vec![Type::Int], Type::Double)
                .overload("double_uint", vec![Type::Uint], Type::Double)
                .overload("double_string", vec![Type::String], Type::Double),
        )
        .bind("double_double", to_double)
        .bind("double_int", to_double)
        .bind("double_uint", to_double)
        .bind("double_string", to_double);

    let mut string_decl = FunctionDecl::new("string");
    for (suffix, ty) in [
        ("string", Type::String),
        ("int", Type::Int),
        ("uint", Type::Uint),
        ("double", Type::Double),
        ("bool", Type::Bool),
        ("bytes", Type::Bytes),
        ("timestamp", Type::Timestamp),
    ] {
        let id = format!("string_{}", suffix);
        string_decl = string_decl.overload(id.clone(), vec![ty], Type::String);
        registry.bind(id, to_string);
    }
    registry.declare(string_decl);

    registry
        .declare(
            FunctionDecl::new("timestamp")
                .overload("timestamp_string", vec![Type::String], Type::Timestamp)
                .overload("timestamp_int", vec![Type::Int], Type::Timestamp)
                .overload("timestamp_timestamp", vec![Type::Timestamp], Type::Timestamp),
        )
        .bind("timestamp_string", to_timestamp)
        .bind("timestamp_int", to_timestamp)
        .bind("timestamp_timestamp", to_timestamp);

    registry
        .declare(FunctionDecl::new("matches").overload(
            "matches_string",
            vec![Type::String, Type::String],
            Type::Bool,
        ))
        .bind("matches_string", move |args| matches(&patterns, args));
}

fn size(args: &[Value]) -> Result<Value, EvalError> {
    let args = expect_args("size", args, 1)?;
    let len = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.len(),
        Value::Map(entries) => entries.len(),
        Value::Object(json) => match json.as_ref() {
            serde_json::Value::Array(items) => items.len(),
            serde_json::Value::Object(members) => members.len(),
            _ => return Err(EvalError::type_mismatch("list or map", "object")),
        },
        other => {
            return Err(EvalError::NoMatchingOverload {
                function: "size".to_string(),
                arguments: other.type_name().to_string(),
            });
        }
    };
    i64::try_from(len)
        .map(Value::Int)
        .map_err(|_| EvalError::Overflow(format!("size {}", len)))
}

fn to_int(args: &[Value]) -> Result<Value, EvalError> {
    let args = expect_args("int", args, 1)?;
    let value = match &args[0] {
        Value::Int(i) => *i,
        Value::Uint(u) => {
            i64::try_from(*u).map_err(|_| EvalError::Overflow(format!("int({}u)", u)))?
        }
        Value::Double(d) => {
            if !d.is_finite() || *d <= i64::MIN as f64 || *d >= i64::MAX as f64 {
                return Err(EvalError::Overflow(format!("int({})", d)));
            }
            d.trunc() as i64
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| EvalError::InvalidArgument(format!("cannot convert '{}' to int", s)))?,
        Value::Timestamp(ts) => ts.timestamp(),
        other => return Err(EvalError::type_mismatch("int", other.type_name())),
    };
    Ok(Value::Int(value))
}

fn to_double(args: &[Value]) -> Result<Value, EvalError> {
    let args = expect_args("double", args, 1)?;
    let value = match &args[0] {
        Value::Double(d) => *d,
        Value::Int(i) => *i as f64,
        Value::Uint(u) => *u as f64,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| EvalError::InvalidArgument(format!("cannot convert '{}' to double", s)))?,
        other => return Err(EvalError::type_mismatch("double", other.type_name())),
    };
    Ok(Value::Double(value))
}

fn to_string(args: &[Value]) -> Result<Value, EvalError> {
    let args = expect_args("string", args, 1)?;
    match &args[0] {
        Value::String(_) => Ok(args[0].clone()),
        Value::Bytes(b) => std::str::from_utf8(b)
            .map(Value::from)
            .map_err(|_| EvalError::InvalidArgument("bytes are not valid UTF-8".to_string())),
        Value::Null | Value::List(_) | Value::Map(_) | Value::Object(_) => Err(
            EvalError::type_mismatch("scalar", args[0].type_name()),
        ),
        other => Ok(Value::string(other.to_string())),
    }
}

fn to_timestamp(args: &[Value]) -> Result<Value, EvalError> {
    let args = expect_args("timestamp", args, 1)?;
    match &args[0] {
        Value::Timestamp(_) => Ok(args[0].clone()),
        Value::String(s) => parse_timestamp(s)
            .map(Value::Timestamp)
            .ok_or_else(|| EvalError::InvalidArgument(format!("invalid timestamp '{}'", s))),
        Value::Int(seconds) => DateTime::from_timestamp(*seconds, 0)
            .map(Value::Timestamp)
            .ok_or_else(|| EvalError::Overflow(format!("timestamp({})", seconds))),
        other => Err(EvalError::type_mismatch("string or int", other.type_name())),
    }
}

fn matches(patterns: &PatternCache, args: &[Value]) -> Result<Value, EvalError> {
    let args = expect_args("matches", args, 2)?;
    let (Some(text), Some(pattern)) = (args[0].as_str(), args[1].as_str()) else {
        return Err(EvalError::type_mismatch(
            "(string, string)",
            format!("({}, {})", args[0].type_name(), args[1].type_name()),
        ));
    };

    let regex = patterns
        .get_compiled_pattern(pattern)
        .map_err(|err| EvalError::InvalidArgument(err.to_string()))?;
    Ok(Value::Bool(regex.is_match(text)))
}
