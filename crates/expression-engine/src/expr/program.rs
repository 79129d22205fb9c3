//! 可执行程序
//!
//! 由检查结果构建：函数调用按重载 ID 绑定实现，常量子树在构建期折叠。
//! 构建完成的程序不可变，可在线程间共享并发执行。

use std::fmt;
use std::sync::Arc;

use super::ast::{BinaryOp, UnaryOp};
use super::checker::{Checked, TypedExpr, TypedKind};
use super::types::Type;
use crate::error::EvalError;
use crate::functions::{DOCUMENT_VARIABLE, FunctionImpl, FunctionRegistry};
use crate::operators;
use crate::value::{Value, ValueMap};

/// 一次执行的变量绑定
#[derive(Debug, Clone, Copy, Default)]
pub struct Activation<'a> {
    values: Option<&'a ValueMap>,
    document: Option<&'a Arc<str>>,
}

impl<'a> Activation<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定输入变量表
    pub fn with_values(mut self, values: &'a ValueMap) -> Self {
        self.values = Some(values);
        self
    }

    /// 绑定原始 JSON 文本，供路径感知函数使用
    pub fn with_document(mut self, document: &'a Arc<str>) -> Self {
        self.document = Some(document);
        self
    }

    pub fn resolve(&self, name: &str) -> Option<Value> {
        if name == DOCUMENT_VARIABLE {
            return self.document.map(|doc| Value::String(Arc::clone(doc)));
        }
        self.values?.get(name).cloned()
    }
}

enum Node {
    Const(Value),
    Var(String),
    List(Vec<Node>),
    Map(Vec<(Node, Node)>),
    Not(Box<Node>),
    Neg(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Conditional(Box<Node>, Box<Node>, Box<Node>),
    Member(Box<Node>, String),
    Index(Box<Node>, Box<Node>),
    Call {
        imp: FunctionImpl,
        args: Vec<Node>,
    },
    /// 实参类型静态不确定，按运行时值选择重载
    Dispatch {
        function: String,
        candidates: Vec<(Vec<Type>, FunctionImpl)>,
        args: Vec<Node>,
    },
}

impl Node {
    fn as_const(&self) -> Option<&Value> {
        match self {
            Node::Const(value) => Some(value),
            _ => None,
        }
    }
}

/// 可执行程序
pub struct Program {
    root: Node,
}

impl Program {
    /// 从检查结果构建程序
    ///
    /// 重载没有绑定实现或常量折叠失败时返回错误描述。
    pub fn build(checked: &Checked, registry: &FunctionRegistry) -> Result<Self, String> {
        let root = Builder { registry }.lower(&checked.root)?;
        Ok(Self { root })
    }

    /// 整个程序是否已折叠为常量
    pub fn is_constant(&self) -> bool {
        matches!(self.root, Node::Const(_))
    }

    pub fn execute(&self, activation: &Activation<'_>) -> Result<Value, EvalError> {
        eval(&self.root, activation)
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("constant", &self.is_constant())
            .finish()
    }
}

struct Builder<'r> {
    registry: &'r FunctionRegistry,
}

impl Builder<'_> {
    fn lower(&self, expr: &TypedExpr) -> Result<Node, String> {
        let node = match &expr.kind {
            TypedKind::Literal(value) => return Ok(Node::Const(value.clone())),
            TypedKind::Ident(name) => return Ok(Node::Var(name.clone())),
            TypedKind::List(items) => Node::List(self.lower_all(items)?),
            TypedKind::Map(entries) => Node::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((self.lower(k)?, self.lower(v)?)))
                    .collect::<Result<_, String>>()?,
            ),
            TypedKind::Unary(UnaryOp::Not, operand) => Node::Not(Box::new(self.lower(operand)?)),
            TypedKind::Unary(UnaryOp::Neg, operand) => Node::Neg(Box::new(self.lower(operand)?)),
            TypedKind::Binary(op, left, right) => {
                let left = Box::new(self.lower(left)?);
                let right = Box::new(self.lower(right)?);
                match op {
                    BinaryOp::And => Node::And(left, right),
                    BinaryOp::Or => Node::Or(left, right),
                    _ => Node::Binary(*op, left, right),
                }
            }
            TypedKind::Conditional(cond, then, otherwise) => Node::Conditional(
                Box::new(self.lower(cond)?),
                Box::new(self.lower(then)?),
                Box::new(self.lower(otherwise)?),
            ),
            TypedKind::Member(operand, field) => {
                Node::Member(Box::new(self.lower(operand)?), field.clone())
            }
            TypedKind::Index(operand, index) => Node::Index(
                Box::new(self.lower(operand)?),
                Box::new(self.lower(index)?),
            ),
            TypedKind::Call {
                function,
                args,
                candidates,
                pure,
            } => {
                // 含动态类型实参时即使只有一个候选也要在运行时校验
                let dynamic = args.iter().any(|arg| arg.ty.is_dyn());
                let args = self.lower_all(args)?;
                let mut bound = Vec::with_capacity(candidates.len());
                for candidate in candidates {
                    let imp = self.registry.implementation(&candidate.id).ok_or_else(|| {
                        format!(
                            "no implementation bound for overload '{}' of function '{}'",
                            candidate.id, function
                        )
                    })?;
                    bound.push((candidate.params.clone(), imp));
                }

                let node = match bound.len() {
                    0 => return Err(format!("function '{}' has no candidate overload", function)),
                    1 if !dynamic => {
                        let (_, imp) = bound.remove(0);
                        Node::Call { imp, args }
                    }
                    _ => Node::Dispatch {
                        function: function.clone(),
                        candidates: bound,
                        args,
                    },
                };
                if !pure {
                    return Ok(node);
                }
                node
            }
        };

        fold(node)
    }

    fn lower_all(&self, items: &[TypedExpr]) -> Result<Vec<Node>, String> {
        items.iter().map(|item| self.lower(item)).collect()
    }
}

/// 子节点全部为常量时在构建期求值
fn fold(node: Node) -> Result<Node, String> {
    let foldable = match &node {
        Node::Const(_) | Node::Var(_) => false,
        Node::List(items) => items.iter().all(|n| n.as_const().is_some()),
        Node::Map(entries) => entries
            .iter()
            .all(|(k, v)| k.as_const().is_some() && v.as_const().is_some()),
        Node::Not(operand) | Node::Neg(operand) | Node::Member(operand, _) => {
            operand.as_const().is_some()
        }
        Node::And(l, r) | Node::Or(l, r) | Node::Binary(_, l, r) | Node::Index(l, r) => {
            l.as_const().is_some() && r.as_const().is_some()
        }
        Node::Conditional(c, t, e) => {
            c.as_const().is_some() && t.as_const().is_some() && e.as_const().is_some()
        }
        Node::Call { args, .. } | Node::Dispatch { args, .. } => {
            args.iter().all(|n| n.as_const().is_some())
        }
    };

    if !foldable {
        return Ok(node);
    }

    eval(&node, &Activation::new())
        .map(Node::Const)
        .map_err(|err| format!("constant folding failed: {}", err))
}

fn eval(node: &Node, activation: &Activation<'_>) -> Result<Value, EvalError> {
    match node {
        Node::Const(value) => Ok(value.clone()),
        Node::Var(name) => activation
            .resolve(name)
            .ok_or_else(|| EvalError::UnknownVariable(name.clone())),
        Node::List(items) => Ok(Value::list(
            items
                .iter()
                .map(|item| eval(item, activation))
                .collect::<Result<_, _>>()?,
        )),
        Node::Map(entries) => {
            let entries = entries
                .iter()
                .map(|(k, v)| Ok((eval(k, activation)?, eval(v, activation)?)))
                .collect::<Result<Vec<_>, EvalError>>()?;
            operators::build_map(entries)
        }
        Node::Not(operand) => match eval(operand, activation)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(unary_no_overload("!_", &other)),
        },
        Node::Neg(operand) => match eval(operand, activation)? {
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| EvalError::Overflow(format!("-({})", i))),
            Value::Double(d) => Ok(Value::Double(-d)),
            other => Err(unary_no_overload("-_", &other)),
        },
        Node::And(left, right) => logical(left, right, activation, false),
        Node::Or(left, right) => logical(left, right, activation, true),
        Node::Binary(op, left, right) => {
            let left = eval(left, activation)?;
            let right = eval(right, activation)?;
            operators::apply(*op, &left, &right)
        }
        Node::Conditional(cond, then, otherwise) => match eval(cond, activation)? {
            Value::Bool(true) => eval(then, activation),
            Value::Bool(false) => eval(otherwise, activation),
            other => Err(unary_no_overload("_?_:_", &other)),
        },
        Node::Member(operand, field) => operators::member(&eval(operand, activation)?, field),
        Node::Index(operand, index) => {
            let operand = eval(operand, activation)?;
            let index = eval(index, activation)?;
            operators::index(&operand, &index)
        }
        Node::Call { imp, args, .. } => {
            let values = eval_args(args, activation)?;
            imp(&values)
        }
        Node::Dispatch {
            function,
            candidates,
            args,
        } => {
            let values = eval_args(args, activation)?;
            let imp = candidates
                .iter()
                .find(|(params, _)| {
                    params.len() == values.len()
                        && params.iter().zip(&values).all(|(ty, v)| ty.matches(v))
                })
                .map(|(_, imp)| imp)
                .ok_or_else(|| EvalError::NoMatchingOverload {
                    function: function.clone(),
                    arguments: values
                        .iter()
                        .map(Value::type_name)
                        .collect::<Vec<_>>()
                        .join(", "),
                })?;
            imp(&values)
        }
    }
}

fn eval_args(args: &[Node], activation: &Activation<'_>) -> Result<Vec<Value>, EvalError> {
    args.iter().map(|arg| eval(arg, activation)).collect()
}

/// `&&` / `||`
///
/// 任一侧能决定结果（`||` 的 true，`&&` 的 false）时忽略另一侧的错误，
/// 否则传播错误。
fn logical(
    left: &Node,
    right: &Node,
    activation: &Activation<'_>,
    absorbing: bool,
) -> Result<Value, EvalError> {
    let symbol = if absorbing { "_||_" } else { "_&&_" };

    let left = eval(left, activation);
    if let Ok(Value::Bool(b)) = left
        && b == absorbing
    {
        return Ok(Value::Bool(absorbing));
    }

    let right = eval(right, activation);
    if let Ok(Value::Bool(b)) = right
        && b == absorbing
    {
        return Ok(Value::Bool(absorbing));
    }

    match (left?, right?) {
        (Value::Bool(_), Value::Bool(_)) => Ok(Value::Bool(!absorbing)),
        (Value::Bool(_), other) | (other, _) => Err(unary_no_overload(symbol, &other)),
    }
}

fn unary_no_overload(function: &str, value: &Value) -> EvalError {
    EvalError::NoMatchingOverload {
        function: function.to_string(),
        arguments: value.type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::checker::{Environment, check};
    use crate::expr::parser::parse;
    use crate::functions::FunctionDecl;

    fn registry() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        registry
            .declare(FunctionDecl::new("double_it").overload(
                "double_it_int",
                vec![Type::Int],
                Type::Int,
            ))
            .bind("double_it_int", |args| match args {
                [Value::Int(i)] => Ok(Value::Int(i * 2)),
                _ => Err(EvalError::type_mismatch("int", "other")),
            })
            .declare(FunctionDecl::new("doc_len").path_aware().overload(
                "doc_len",
                vec![],
                Type::Int,
            ))
            .bind("doc_len", |args| match args {
                [Value::String(doc)] => Ok(Value::Int(doc.len() as i64)),
                _ => Err(EvalError::type_mismatch("string", "other")),
            })
            .declare(FunctionDecl::new("unbound").overload("unbound_int", vec![Type::Int], Type::Int));
        registry
    }

    fn build(source: &str, vars: &[(&str, Type)]) -> Result<Program, String> {
        let registry = Arc::new(registry());
        let mut env = Environment::new(Arc::clone(&registry));
        for (name, ty) in vars {
            env.declare(*name, ty.clone());
        }
        let checked = check(&parse(source).unwrap(), &env).unwrap();
        Program::build(&checked, &registry)
    }

    fn run(source: &str, values: &[(&str, Value)]) -> Result<Value, EvalError> {
        let vars: Vec<(&str, Type)> = values
            .iter()
            .map(|(name, value)| (*name, Type::from_tag(value.type_tag())))
            .collect();
        let program = build(source, &vars).unwrap();
        let map: ValueMap = values
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        program.execute(&Activation::new().with_values(&map))
    }

    #[test]
    fn test_constant_folding() {
        let program = build("1 + 2 * 3 == 7", &[]).unwrap();
        assert!(program.is_constant());
        assert_eq!(program.execute(&Activation::new()).unwrap(), Value::Bool(true));

        let program = build("double_it(4) > 5", &[]).unwrap();
        assert!(program.is_constant());

        let program = build("x + 1 > 2", &[("x", Type::Int)]).unwrap();
        assert!(!program.is_constant());
    }

    #[test]
    fn test_fold_failure_is_construction_error() {
        let err = build("1 / 0 == 1", &[]).unwrap_err();
        assert!(err.contains("constant folding failed"));
    }

    #[test]
    fn test_missing_implementation() {
        let err = build("unbound(1) == 1", &[]).unwrap_err();
        assert!(err.contains("unbound_int"));
    }

    #[test]
    fn test_variables_and_arithmetic() {
        assert_eq!(
            run("age >= 18 && name == 'bob'", &[("age", 20i64.into()), ("name", "bob".into())]),
            Ok(Value::Bool(true))
        );
        assert_eq!(run("x / y", &[("x", 7i64.into()), ("y", 2i64.into())]), Ok(Value::Int(3)));
        assert_eq!(
            run("x / y", &[("x", 7i64.into()), ("y", 0i64.into())]),
            Err(EvalError::DivisionByZero)
        );
        assert!(matches!(
            run("-x", &[("x", Value::Int(i64::MIN))]),
            Err(EvalError::Overflow(_))
        ));
    }

    #[test]
    fn test_logical_absorbs_errors() {
        let values = [("x", Value::Int(1)), ("y", Value::Int(0))];
        assert_eq!(run("x / y > 0 || true", &values), Ok(Value::Bool(true)));
        assert_eq!(run("false && x / y > 0", &values), Ok(Value::Bool(false)));
        assert_eq!(run("x / y > 0 || false", &values), Err(EvalError::DivisionByZero));
        assert_eq!(run("true && x / y > 0", &values), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_path_aware_reads_document() {
        let program = build("doc_len()", &[]).unwrap();
        let doc: Arc<str> = Arc::from(r#"{"a":1}"#);
        assert_eq!(
            program.execute(&Activation::new().with_document(&doc)),
            Ok(Value::Int(7))
        );
        assert_eq!(
            program.execute(&Activation::new()),
            Err(EvalError::UnknownVariable(DOCUMENT_VARIABLE.to_string()))
        );
    }

    #[test]
    fn test_runtime_dispatch() {
        let mut map = std::collections::BTreeMap::new();
        map.insert("n".to_string(), Value::Int(21));
        let user = Value::map(map);
        assert_eq!(run("double_it(user.n)", &[("user", user.clone())]), Ok(Value::Int(42)));

        let mut map = std::collections::BTreeMap::new();
        map.insert("n".to_string(), Value::from("21"));
        assert!(matches!(
            run("double_it(user.n)", &[("user", Value::map(map))]),
            Err(EvalError::NoMatchingOverload { .. })
        ));
    }

    #[test]
    fn test_collections() {
        assert_eq!(
            run("'b' in tags", &[("tags", Value::list(vec!["a".into(), "b".into()]))]),
            Ok(Value::Bool(true))
        );
        assert_eq!(run("{'k': 1}['k'] == 1", &[]), Ok(Value::Bool(true)));
        assert!(matches!(
            run("tags[5]", &[("tags", Value::list(vec![]))]),
            Err(EvalError::IndexOutOfBounds { .. })
        ));
    }
}
