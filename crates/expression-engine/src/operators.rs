//! 运算符语义
//!
//! 程序执行时二元运算、成员访问和下标访问的取值规则。
//! 数值在 int / uint / double 之间按数学值比较；混合类型的算术结果为 double。

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::error::EvalError;
use crate::expr::ast::BinaryOp;
use crate::value::Value;

/// 执行非逻辑二元运算（`&&` / `||` 由执行器短路处理）
pub fn apply(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(equals(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!equals(left, right))),
        BinaryOp::Lt => ordering(op, left, right, |o| o == Ordering::Less),
        BinaryOp::Le => ordering(op, left, right, |o| o != Ordering::Greater),
        BinaryOp::Gt => ordering(op, left, right, |o| o == Ordering::Greater),
        BinaryOp::Ge => ordering(op, left, right, |o| o != Ordering::Less),
        BinaryOp::In => contains_element(right, left).map(Value::Bool),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, left, right)
        }
        BinaryOp::And | BinaryOp::Or => Err(no_overload(op, left, right)),
    }
}

fn no_overload(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::NoMatchingOverload {
        function: format!("_{}_", op.symbol()),
        arguments: format!("{}, {}", left.type_name(), right.type_name()),
    }
}

/// 相等比较，类型不同的非数值视为不相等
pub fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bytes(a), Value::Bytes(b)) => a == b,
        (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| equals(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| equals(v, other)))
        }
        (Value::Object(a), Value::Object(b)) => a == b,
        (Value::Object(json), other) | (other, Value::Object(json)) => {
            equals(&Value::from_json(json), other)
        }
        (a, b) if a.is_numeric() && b.is_numeric() => {
            compare_numbers(a, b) == Some(Ordering::Equal)
        }
        _ => false,
    }
}

/// 数值比较，NaN 参与时返回 None
pub fn compare_numbers(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Uint(a), Value::Uint(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Uint(b)) => Some(if *a < 0 {
            Ordering::Less
        } else {
            (*a as u64).cmp(b)
        }),
        (Value::Uint(a), Value::Int(b)) => Some(if *b < 0 {
            Ordering::Greater
        } else {
            a.cmp(&(*b as u64))
        }),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}

fn ordering(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    accept: impl Fn(Ordering) -> bool,
) -> Result<Value, EvalError> {
    let ord = match (left, right) {
        (a, b) if a.is_numeric() && b.is_numeric() => compare_numbers(a, b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        _ => return Err(no_overload(op, left, right)),
    };

    Ok(Value::Bool(ord.is_some_and(accept)))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(op, *a, *b).map(Value::Int),
        (Value::Uint(a), Value::Uint(b)) => uint_arithmetic(op, *a, *b).map(Value::Uint),
        (a, b) if a.is_numeric() && b.is_numeric() => {
            let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            Ok(Value::Double(match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                BinaryOp::Div => x / y,
                _ => x % y,
            }))
        }
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Ok(Value::string(joined))
        }
        (Value::Bytes(a), Value::Bytes(b)) if op == BinaryOp::Add => {
            Ok(Value::bytes([a.as_ref(), b.as_ref()].concat()))
        }
        (Value::List(a), Value::List(b)) if op == BinaryOp::Add => {
            Ok(Value::list(a.iter().chain(b.iter()).cloned().collect()))
        }
        _ => Err(no_overload(op, left, right)),
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<i64, EvalError> {
    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => a.checked_div(b),
        _ => a.checked_rem(b),
    };
    result.ok_or_else(|| EvalError::Overflow(format!("int {} {} {}", a, op, b)))
}

fn uint_arithmetic(op: BinaryOp, a: u64, b: u64) -> Result<u64, EvalError> {
    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => a.checked_div(b),
        _ => a.checked_rem(b),
    };
    result.ok_or_else(|| EvalError::Overflow(format!("uint {} {} {}", a, op, b)))
}

/// `elem in container`
pub fn contains_element(container: &Value, elem: &Value) -> Result<bool, EvalError> {
    match container {
        Value::List(items) => Ok(items.iter().any(|item| equals(item, elem))),
        Value::Map(entries) => Ok(entries.contains_key(&map_key(elem)?)),
        Value::Object(json) => match json.as_ref() {
            JsonValue::Object(members) => Ok(members.contains_key(&map_key(elem)?)),
            JsonValue::Array(items) => Ok(items
                .iter()
                .any(|item| equals(&Value::from_json(item), elem))),
            _ => Err(EvalError::type_mismatch("list or map", "object")),
        },
        other => Err(EvalError::type_mismatch("list or map", other.type_name())),
    }
}

/// 映射键只允许字符串、整数和布尔值
pub fn map_key(key: &Value) -> Result<String, EvalError> {
    match key {
        Value::String(s) => Ok(s.to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Uint(u) => Ok(u.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(EvalError::type_mismatch("string, int, uint or bool", other.type_name())),
    }
}

/// 构造映射值
pub fn build_map(entries: Vec<(Value, Value)>) -> Result<Value, EvalError> {
    let mut map = BTreeMap::new();
    for (key, value) in entries {
        map.insert(map_key(&key)?, value);
    }
    Ok(Value::map(map))
}

/// `value.field`
pub fn member(value: &Value, field: &str) -> Result<Value, EvalError> {
    match value {
        Value::Map(entries) => entries
            .get(field)
            .cloned()
            .ok_or_else(|| EvalError::NoSuchKey(field.to_string())),
        Value::Object(json) => json
            .get(field)
            .map(Value::from_json)
            .ok_or_else(|| EvalError::NoSuchKey(field.to_string())),
        other => Err(EvalError::type_mismatch("map", other.type_name())),
    }
}

/// `value[index]`
pub fn index(value: &Value, index: &Value) -> Result<Value, EvalError> {
    match value {
        Value::List(items) => {
            let position = list_index(index, items.len())?;
            Ok(items[position].clone())
        }
        Value::Map(entries) => {
            let key = map_key(index)?;
            entries.get(&key).cloned().ok_or(EvalError::NoSuchKey(key))
        }
        Value::Object(json) => match json.as_ref() {
            JsonValue::Array(items) => {
                let position = list_index(index, items.len())?;
                Ok(Value::from_json(&items[position]))
            }
            JsonValue::Object(members) => {
                let key = map_key(index)?;
                members
                    .get(&key)
                    .map(Value::from_json)
                    .ok_or(EvalError::NoSuchKey(key))
            }
            _ => Err(EvalError::type_mismatch("list or map", "object")),
        },
        other => Err(EvalError::type_mismatch("list or map", other.type_name())),
    }
}

fn list_index(index: &Value, len: usize) -> Result<usize, EvalError> {
    let raw = match index {
        Value::Int(i) => *i,
        Value::Uint(u) => i64::try_from(*u).unwrap_or(i64::MAX),
        Value::Double(d) if d.fract() == 0.0 => *d as i64,
        other => return Err(EvalError::type_mismatch("int", other.type_name())),
    };

    usize::try_from(raw)
        .ok()
        .filter(|position| *position < len)
        .ok_or(EvalError::IndexOutOfBounds { index: raw, len })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_equality_across_types() {
        assert!(equals(&Value::Int(100), &Value::Double(100.0)));
        assert!(equals(&Value::Int(7), &Value::Uint(7)));
        assert!(!equals(&Value::Int(-1), &Value::Uint(u64::MAX)));
        assert!(!equals(&Value::Int(1), &"1".into()));
        assert!(!equals(&Value::Double(f64::NAN), &Value::Double(f64::NAN)));
    }

    #[test]
    fn test_structural_equality() {
        let a = Value::list(vec![1i64.into(), "x".into()]);
        let b = Value::list(vec![Value::Double(1.0), "x".into()]);
        assert!(equals(&a, &b));

        let obj = Value::object(json!({"k": [1, 2]}));
        let map = Value::from_json(&json!({"k": [1, 2]}));
        assert!(equals(&obj, &map));
    }

    #[test]
    fn test_ordering() {
        let lt = |a: Value, b: Value| apply(BinaryOp::Lt, &a, &b).unwrap();
        assert_eq!(lt(Value::Int(-1), Value::Uint(0)), Value::Bool(true));
        assert_eq!(lt(Value::Double(1.5), Value::Int(2)), Value::Bool(true));
        assert_eq!(lt("a".into(), "b".into()), Value::Bool(true));
        assert_eq!(lt(Value::Double(f64::NAN), Value::Int(1)), Value::Bool(false));

        let err = apply(BinaryOp::Lt, &Value::Int(1), &"a".into()).unwrap_err();
        assert!(matches!(err, EvalError::NoMatchingOverload { .. }));
    }

    #[test]
    fn test_int_arithmetic_is_checked() {
        assert_eq!(
            apply(BinaryOp::Add, &Value::Int(2), &Value::Int(3)).unwrap(),
            Value::Int(5)
        );
        assert_eq!(
            apply(BinaryOp::Div, &Value::Int(1), &Value::Int(0)).unwrap_err(),
            EvalError::DivisionByZero
        );
        assert!(matches!(
            apply(BinaryOp::Add, &Value::Int(i64::MAX), &Value::Int(1)).unwrap_err(),
            EvalError::Overflow(_)
        ));
        assert!(matches!(
            apply(BinaryOp::Sub, &Value::Uint(0), &Value::Uint(1)).unwrap_err(),
            EvalError::Overflow(_)
        ));
    }

    #[test]
    fn test_mixed_arithmetic_is_double() {
        assert_eq!(
            apply(BinaryOp::Mul, &Value::Int(2), &Value::Double(1.5)).unwrap(),
            Value::Double(3.0)
        );
    }

    #[test]
    fn test_concatenation() {
        assert_eq!(
            apply(BinaryOp::Add, &"ab".into(), &"cd".into()).unwrap(),
            Value::from("abcd")
        );
        let joined = apply(
            BinaryOp::Add,
            &Value::list(vec![1i64.into()]),
            &Value::list(vec![2i64.into()]),
        )
        .unwrap();
        assert_eq!(joined, Value::list(vec![1i64.into(), 2i64.into()]));
    }

    #[test]
    fn test_membership() {
        let list = Value::list(vec!["a".into(), Value::Int(3)]);
        assert!(contains_element(&list, &"a".into()).unwrap());
        assert!(contains_element(&list, &Value::Double(3.0)).unwrap());
        let map = Value::from_json(&json!({"k": 1}));
        assert!(contains_element(&map, &"k".into()).unwrap());
        assert!(contains_element(&Value::Int(1), &Value::Int(1)).is_err());
    }

    #[test]
    fn test_member_and_index() {
        let map = Value::from_json(&json!({"user": {"tags": ["x", "y"]}}));
        let user = member(&map, "user").unwrap();
        let tags = member(&user, "tags").unwrap();
        assert_eq!(index(&tags, &Value::Int(1)).unwrap(), Value::from("y"));
        assert_eq!(
            index(&tags, &Value::Int(5)).unwrap_err(),
            EvalError::IndexOutOfBounds { index: 5, len: 2 }
        );
        assert_eq!(
            member(&map, "missing").unwrap_err(),
            EvalError::NoSuchKey("missing".into())
        );

        let obj = Value::object(json!({"a": {"b": 2}}));
        assert_eq!(member(&member(&obj, "a").unwrap(), "b").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_build_map_rejects_bad_keys() {
        assert!(build_map(vec![(Value::Double(1.0), Value::Null)]).is_err());
        let map = build_map(vec![(Value::Int(1), "one".into())]).unwrap();
        assert_eq!(index(&map, &"1".into()).unwrap(), Value::from("one"));
    }
}
