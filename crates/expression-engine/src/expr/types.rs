//! 静态类型

use std::fmt;

use crate::value::{TypeTag, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// 动态类型，检查推迟到运行时
    Dyn,
    /// 已报告过问题的子表达式，避免级联报错
    Error,
    Null,
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    Timestamp,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
}

impl Type {
    pub fn list(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    /// 输入变量的声明类型
    pub fn from_tag(tag: TypeTag) -> Type {
        match tag {
            TypeTag::Bool => Type::Bool,
            TypeTag::String => Type::String,
            TypeTag::Int => Type::Int,
            TypeTag::Uint => Type::Uint,
            TypeTag::Double => Type::Double,
            TypeTag::Bytes => Type::Bytes,
            TypeTag::Timestamp => Type::Timestamp,
            TypeTag::List => Type::list(Type::Dyn),
            TypeTag::Map => Type::map(Type::String, Type::Dyn),
            TypeTag::Null => Type::Null,
            TypeTag::Object => Type::Dyn,
        }
    }

    /// 字面量值的类型
    pub fn of_value(value: &Value) -> Type {
        match value {
            Value::List(items) => Type::list(Type::join_all(items.iter().map(Type::of_value))),
            Value::Map(entries) => Type::map(
                Type::String,
                Type::join_all(entries.values().map(Type::of_value)),
            ),
            other => Type::from_tag(other.type_tag()),
        }
    }

    pub fn is_dyn(&self) -> bool {
        matches!(self, Type::Dyn | Type::Error)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Uint | Type::Double)
    }

    /// 形参类型 `self` 能否接受实参类型 `arg`
    pub fn accepts(&self, arg: &Type) -> bool {
        if self.is_dyn() || arg.is_dyn() {
            return true;
        }
        match (self, arg) {
            (Type::List(p), Type::List(a)) => p.accepts(a),
            (Type::Map(pk, pv), Type::Map(ak, av)) => pk.accepts(ak) && pv.accepts(av),
            (p, a) => p == a,
        }
    }

    /// 运行时值是否满足该类型，用于动态分派
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Dyn | Type::Error, _) => true,
            (Type::Null, Value::Null) => true,
            (Type::Bool, Value::Bool(_)) => true,
            (Type::Int, Value::Int(_)) => true,
            (Type::Uint, Value::Uint(_)) => true,
            (Type::Double, Value::Double(_)) => true,
            (Type::String, Value::String(_)) => true,
            (Type::Bytes, Value::Bytes(_)) => true,
            (Type::Timestamp, Value::Timestamp(_)) => true,
            (Type::List(elem), Value::List(items)) => {
                elem.is_dyn() || items.iter().all(|item| elem.matches(item))
            }
            (Type::Map(_, v), Value::Map(entries)) => {
                v.is_dyn() || entries.values().all(|item| v.matches(item))
            }
            (Type::List(elem), Value::Object(json)) => elem.is_dyn() && json.is_array(),
            (Type::Map(_, v), Value::Object(json)) => v.is_dyn() && json.is_object(),
            _ => false,
        }
    }

    /// 两个类型的最小公共类型，不一致时退化为 `Dyn`
    pub fn join(a: &Type, b: &Type) -> Type {
        match (a, b) {
            (Type::Error, other) | (other, Type::Error) => other.clone(),
            (Type::List(x), Type::List(y)) => Type::list(Type::join(x, y)),
            (Type::Map(xk, xv), Type::Map(yk, yv)) => {
                Type::map(Type::join(xk, yk), Type::join(xv, yv))
            }
            (x, y) if x == y => x.clone(),
            _ => Type::Dyn,
        }
    }

    /// 空序列的公共类型为 `Dyn`
    pub fn join_all(types: impl Iterator<Item = Type>) -> Type {
        let mut joined: Option<Type> = None;
        for ty in types {
            joined = Some(match joined {
                Some(prev) => Type::join(&prev, &ty),
                None => ty,
            });
        }
        joined.unwrap_or(Type::Dyn)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Dyn => f.write_str("dyn"),
            Type::Error => f.write_str("*error*"),
            Type::Null => f.write_str("null"),
            Type::Bool => f.write_str("bool"),
            Type::Int => f.write_str("int"),
            Type::Uint => f.write_str("uint"),
            Type::Double => f.write_str("double"),
            Type::String => f.write_str("string"),
            Type::Bytes => f.write_str("bytes"),
            Type::Timestamp => f.write_str("timestamp"),
            Type::List(elem) => write!(f, "list({})", elem),
            Type::Map(k, v) => write!(f, "map({}, {})", k, v),
        }
    }
}
