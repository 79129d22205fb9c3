//! 函数库
//!
//! 声明（名称、重载、参数与返回类型）供类型检查使用，实现按重载 ID
//! 单独绑定，由程序构建阶段解析。两者分离使得"声明了但没有实现"
//! 成为程序构建错误而不是类型检查错误。
//!
//! 路径感知函数的第一个实参是隐藏的原始 JSON 文本变量，由检查器自动
//! 插入；表达式作者只写 `fn(path, ...)`。

mod builtins;
mod coerce;
mod predicates;
mod time;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::EvalError;
use crate::expr::Type;
use crate::pattern::PatternCache;
use crate::value::Value;

pub use coerce::{Numeric, json_equals_value, json_numeric, json_text};

/// 隐藏的原始 JSON 文本变量名
pub const DOCUMENT_VARIABLE: &str = "__raw_json__";

/// 函数实现
pub type FunctionImpl = Arc<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// 一个重载
#[derive(Debug, Clone, PartialEq)]
pub struct Overload {
    pub id: String,
    /// 表达式作者可见的参数（不含隐藏的文档参数）
    pub params: Vec<Type>,
    pub result: Type,
}

/// 函数声明
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub overloads: Vec<Overload>,
    /// 是否接收隐藏的文档参数
    pub path_aware: bool,
    /// 结果只取决于实参，可在构建期折叠
    pub pure: bool,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overloads: Vec::new(),
            path_aware: false,
            pure: true,
        }
    }

    /// 标记为路径感知函数（同时不可折叠）
    pub fn path_aware(mut self) -> Self {
        self.path_aware = true;
        self.pure = false;
        self
    }

    pub fn overload(mut self, id: impl Into<String>, params: Vec<Type>, result: Type) -> Self {
        self.overloads.push(Overload {
            id: id.into(),
            params,
            result,
        });
        self
    }

    /// 重载的完整形参列表（路径感知函数前置文档参数）
    pub fn full_params(&self, overload: &Overload) -> Vec<Type> {
        let mut params = Vec::with_capacity(overload.params.len() + 1);
        if self.path_aware {
            params.push(Type::String);
        }
        params.extend(overload.params.iter().cloned());
        params
    }
}

/// 函数注册表
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    declarations: HashMap<String, FunctionDecl>,
    implementations: HashMap<String, FunctionImpl>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 标准函数库：核心内建函数与路径感知谓词
    ///
    /// `time_predicates` 控制是否声明 `timeBetween` / `dayOfWeekIn`。
    pub fn standard(patterns: Arc<PatternCache>, time_predicates: bool) -> Self {
        let mut registry = Self::new();
        builtins::register(&mut registry, Arc::clone(&patterns));
        predicates::register(&mut registry, patterns);
        if time_predicates {
            time::register(&mut registry);
        }
        registry
    }

    /// 添加声明；同名函数的重载会被追加
    pub fn declare(&mut self, decl: FunctionDecl) -> &mut Self {
        match self.declarations.get_mut(&decl.name) {
            Some(existing) => existing.overloads.extend(decl.overloads),
            None => {
                self.declarations.insert(decl.name.clone(), decl);
            }
        }
        self
    }

    /// 为重载绑定实现
    pub fn bind<F>(&mut self, overload_id: impl Into<String>, implementation: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.implementations
            .insert(overload_id.into(), Arc::new(implementation));
        self
    }

    pub fn declaration(&self, name: &str) -> Option<&FunctionDecl> {
        self.declarations.get(name)
    }

    pub fn implementation(&self, overload_id: &str) -> Option<FunctionImpl> {
        self.implementations.get(overload_id).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.declarations.contains_key(name)
    }

    /// 按名称排序的函数名列表
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.declarations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.function_names())
            .field("implementations", &self.implementations.len())
            .finish()
    }
}

/// 检查实参个数
///
/// 个数不符说明重载注册与实现不一致，属于集成缺陷，必须报错而不是返回 false。
pub(crate) fn expect_args<'a>(
    function: &str,
    args: &'a [Value],
    expected: usize,
) -> Result<&'a [Value], EvalError> {
    if args.len() != expected {
        return Err(EvalError::Arity {
            function: function.to_string(),
            expected,
            actual: args.len(),
        });
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_merges_overloads() {
        let mut registry = FunctionRegistry::new();
        registry.declare(FunctionDecl::new("f").overload("f_int", vec![Type::Int], Type::Int));
        registry.declare(FunctionDecl::new("f").overload("f_str", vec![Type::String], Type::Int));

        let decl = registry.declaration("f").unwrap();
        assert_eq!(decl.overloads.len(), 2);
    }

    #[test]
    fn test_bind_and_lookup() {
        let mut registry = FunctionRegistry::new();
        registry
            .declare(FunctionDecl::new("one").overload("one", vec![], Type::Int))
            .bind("one", |_| Ok(Value::Int(1)));

        let imp = registry.implementation("one").unwrap();
        assert_eq!(imp(&[]).unwrap(), Value::Int(1));
        assert!(registry.implementation("two").is_none());
    }

    #[test]
    fn test_path_aware_full_params() {
        let decl = FunctionDecl::new("exists")
            .path_aware()
            .overload("exists_path", vec![Type::String], Type::Bool);
        assert!(!decl.pure);
        assert_eq!(
            decl.full_params(&decl.overloads[0]),
            vec![Type::String, Type::String]
        );
    }

    #[test]
    fn test_expect_args() {
        let args = [Value::Int(1)];
        assert!(expect_args("f", &args, 1).is_ok());
        assert_eq!(
            expect_args("f", &args, 3).unwrap_err(),
            EvalError::Arity {
                function: "f".into(),
                expected: 3,
                actual: 1,
            }
        );
    }
}
