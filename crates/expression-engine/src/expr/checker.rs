//! 类型检查
//!
//! 遍历语法树，按环境中的变量类型和函数声明为每个节点推导类型，
//! 一次收集全部问题。已报告过问题的子表达式类型为 `Type::Error`，
//! 上层不再重复报告。
//!
//! 函数调用在这里完成重载解析：实参类型静态确定时只保留一个候选，
//! 含 `dyn` 实参时保留全部可接受的候选，由运行时按实际值分派。

use std::collections::HashMap;
use std::sync::Arc;

use super::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use super::types::Type;
use super::{Issue, Position};
use crate::functions::{DOCUMENT_VARIABLE, FunctionRegistry};
use crate::value::Value;

/// 检查环境：变量类型与函数库
#[derive(Debug, Clone)]
pub struct Environment {
    variables: HashMap<String, Type>,
    functions: Arc<FunctionRegistry>,
}

impl Environment {
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        Self {
            variables: HashMap::new(),
            functions,
        }
    }

    /// 声明一个变量
    pub fn declare(&mut self, name: impl Into<String>, ty: Type) -> &mut Self {
        self.variables.insert(name.into(), ty);
        self
    }

    pub fn variable(&self, name: &str) -> Option<&Type> {
        self.variables.get(name)
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }
}

/// 带类型的语法树节点
#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpr {
    pub kind: TypedKind,
    pub ty: Type,
    pub position: Position,
}

/// 重载候选，`params` 为完整形参列表
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub params: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedKind {
    Literal(Value),
    Ident(String),
    List(Vec<TypedExpr>),
    Map(Vec<(TypedExpr, TypedExpr)>),
    Unary(UnaryOp, Box<TypedExpr>),
    Binary(BinaryOp, Box<TypedExpr>, Box<TypedExpr>),
    Conditional(Box<TypedExpr>, Box<TypedExpr>, Box<TypedExpr>),
    Member(Box<TypedExpr>, String),
    Index(Box<TypedExpr>, Box<TypedExpr>),
    Call {
        function: String,
        args: Vec<TypedExpr>,
        candidates: Vec<Candidate>,
        pure: bool,
    },
}

/// 检查通过的表达式
#[derive(Debug, Clone, PartialEq)]
pub struct Checked {
    pub root: TypedExpr,
    pub result_type: Type,
}

/// 检查语法树，存在任何问题时返回全部问题
pub fn check(expr: &Expr, env: &Environment) -> Result<Checked, Vec<Issue>> {
    let mut checker = Checker {
        env,
        issues: Vec::new(),
    };
    let root = checker.check(expr);

    if checker.issues.is_empty() {
        let result_type = root.ty.clone();
        Ok(Checked { root, result_type })
    } else {
        Err(checker.issues)
    }
}

struct Checker<'e> {
    env: &'e Environment,
    issues: Vec<Issue>,
}

impl Checker<'_> {
    fn report(&mut self, message: String, position: Position) -> Type {
        self.issues.push(Issue::new(message, position));
        Type::Error
    }

    fn no_overload(&mut self, function: &str, args: &[&Type], position: Position) -> Type {
        let rendered = args
            .iter()
            .map(|ty| ty.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        self.report(
            format!(
                "found no matching overload for '{}' applied to '({})'",
                function, rendered
            ),
            position,
        )
    }

    fn check(&mut self, expr: &Expr) -> TypedExpr {
        let position = expr.position;
        let (kind, ty) = match &expr.kind {
            ExprKind::Literal(value) => (TypedKind::Literal(value.clone()), Type::of_value(value)),
            ExprKind::Ident(name) => {
                let ty = match self.env.variable(name) {
                    Some(ty) => ty.clone(),
                    None => self.report(format!("undeclared reference to '{}'", name), position),
                };
                (TypedKind::Ident(name.clone()), ty)
            }
            ExprKind::List(items) => {
                let items: Vec<TypedExpr> = items.iter().map(|item| self.check(item)).collect();
                let elem = Type::join_all(items.iter().map(|item| item.ty.clone()));
                (TypedKind::List(items), Type::list(elem))
            }
            ExprKind::Map(entries) => self.check_map(entries),
            ExprKind::Unary(op, operand) => {
                let operand = self.check(operand);
                let ty = self.unary_type(*op, &operand.ty, position);
                (TypedKind::Unary(*op, Box::new(operand)), ty)
            }
            ExprKind::Binary(op, left, right) => {
                let left = self.check(left);
                let right = self.check(right);
                let ty = self.binary_type(*op, &left.ty, &right.ty, position);
                (TypedKind::Binary(*op, Box::new(left), Box::new(right)), ty)
            }
            ExprKind::Conditional(cond, then, otherwise) => {
                let cond = self.check(cond);
                let then = self.check(then);
                let otherwise = self.check(otherwise);
                let ty = if cond.ty == Type::Error {
                    Type::Error
                } else if !Type::Bool.accepts(&cond.ty) {
                    self.no_overload("_?_:_", &[&cond.ty, &then.ty, &otherwise.ty], position)
                } else {
                    Type::join(&then.ty, &otherwise.ty)
                };
                (
                    TypedKind::Conditional(Box::new(cond), Box::new(then), Box::new(otherwise)),
                    ty,
                )
            }
            ExprKind::Member(operand, field) => {
                let operand = self.check(operand);
                let ty = match &operand.ty {
                    Type::Error => Type::Error,
                    Type::Dyn => Type::Dyn,
                    Type::Map(key, value) if key.accepts(&Type::String) => (**value).clone(),
                    other => self.report(
                        format!("type '{}' does not support field selection", other),
                        position,
                    ),
                };
                (TypedKind::Member(Box::new(operand), field.clone()), ty)
            }
            ExprKind::Index(operand, index) => {
                let operand = self.check(operand);
                let index = self.check(index);
                let ty = self.index_type(&operand.ty, &index.ty, position);
                (TypedKind::Index(Box::new(operand), Box::new(index)), ty)
            }
            ExprKind::Call(function, args) => return self.check_call(function, args, position),
        };

        TypedExpr { kind, ty, position }
    }

    fn check_map(&mut self, entries: &[(Expr, Expr)]) -> (TypedKind, Type) {
        let mut checked = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let key = self.check(key);
            let value = self.check(value);
            if !matches!(
                key.ty,
                Type::String | Type::Int | Type::Uint | Type::Bool | Type::Dyn | Type::Error
            ) {
                self.report(
                    format!("unsupported map key type '{}'", key.ty),
                    key.position,
                );
            }
            checked.push((key, value));
        }

        let key_type = Type::join_all(checked.iter().map(|(k, _)| k.ty.clone()));
        let value_type = Type::join_all(checked.iter().map(|(_, v)| v.ty.clone()));
        (TypedKind::Map(checked), Type::map(key_type, value_type))
    }

    fn unary_type(&mut self, op: UnaryOp, operand: &Type, position: Position) -> Type {
        match (op, operand) {
            (_, Type::Error) => Type::Error,
            (UnaryOp::Not, Type::Bool | Type::Dyn) => Type::Bool,
            (UnaryOp::Neg, Type::Int | Type::Double | Type::Dyn) => operand.clone(),
            (UnaryOp::Not, _) => self.no_overload("!_", &[operand], position),
            (UnaryOp::Neg, _) => self.no_overload("-_", &[operand], position),
        }
    }

    fn binary_type(&mut self, op: BinaryOp, left: &Type, right: &Type, position: Position) -> Type {
        if *left == Type::Error || *right == Type::Error {
            return Type::Error;
        }

        let result = match op {
            BinaryOp::And | BinaryOp::Or => {
                (Type::Bool.accepts(left) && Type::Bool.accepts(right)).then_some(Type::Bool)
            }
            BinaryOp::Eq | BinaryOp::Ne => comparable(left, right).then_some(Type::Bool),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                orderable(left, right).then_some(Type::Bool)
            }
            BinaryOp::In => match right {
                Type::Dyn => Some(Type::Bool),
                Type::List(elem) => comparable(elem, left).then_some(Type::Bool),
                Type::Map(key, _) => key.accepts(left).then_some(Type::Bool),
                _ => None,
            },
            BinaryOp::Add => arithmetic_type(left, right).or_else(|| match (left, right) {
                (Type::String, Type::String) => Some(Type::String),
                (Type::Bytes, Type::Bytes) => Some(Type::Bytes),
                (Type::List(a), Type::List(b)) => Some(Type::list(Type::join(a, b))),
                _ => None,
            }),
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                arithmetic_type(left, right)
            }
        };

        match result {
            Some(ty) => ty,
            None => self.no_overload(&format!("_{}_", op.symbol()), &[left, right], position),
        }
    }

    fn index_type(&mut self, operand: &Type, index: &Type, position: Position) -> Type {
        if *operand == Type::Error || *index == Type::Error {
            return Type::Error;
        }
        match operand {
            Type::Dyn => Type::Dyn,
            Type::List(elem) if matches!(index, Type::Int | Type::Uint | Type::Dyn) => {
                (**elem).clone()
            }
            Type::Map(key, value) if key.accepts(index) => (**value).clone(),
            _ => self.no_overload("_[_]", &[operand, index], position),
        }
    }

    fn check_call(&mut self, function: &str, args: &[Expr], position: Position) -> TypedExpr {
        let mut checked: Vec<TypedExpr> = args.iter().map(|arg| self.check(arg)).collect();

        let registry = Arc::clone(self.env.functions());
        let Some(decl) = registry.declaration(function) else {
            let ty = self.report(format!("undeclared reference to '{}'", function), position);
            return TypedExpr {
                kind: TypedKind::Call {
                    function: function.to_string(),
                    args: checked,
                    candidates: Vec::new(),
                    pure: false,
                },
                ty,
                position,
            };
        };

        if decl.path_aware {
            checked.insert(
                0,
                TypedExpr {
                    kind: TypedKind::Ident(DOCUMENT_VARIABLE.to_string()),
                    ty: Type::String,
                    position,
                },
            );
        }

        let arg_types: Vec<&Type> = checked.iter().map(|arg| &arg.ty).collect();
        let candidates: Vec<(Candidate, Type)> = decl
            .overloads
            .iter()
            .filter_map(|overload| {
                let params = decl.full_params(overload);
                let accepted = params.len() == arg_types.len()
                    && params.iter().zip(&arg_types).all(|(p, a)| p.accepts(a));
                accepted.then(|| {
                    (
                        Candidate {
                            id: overload.id.clone(),
                            params,
                        },
                        overload.result.clone(),
                    )
                })
            })
            .collect();

        let ty = if arg_types.iter().any(|ty| **ty == Type::Error) {
            Type::Error
        } else if candidates.is_empty() {
            // 报告作者可见的实参类型
            let visible = if decl.path_aware {
                &arg_types[1..]
            } else {
                &arg_types[..]
            };
            self.no_overload(function, visible, position)
        } else {
            Type::join_all(candidates.iter().map(|(_, result)| result.clone()))
        };

        TypedExpr {
            kind: TypedKind::Call {
                function: function.to_string(),
                args: checked,
                candidates: candidates.into_iter().map(|(c, _)| c).collect(),
                pure: decl.pure,
            },
            ty,
            position,
        }
    }
}

/// 相等比较要求两侧类型可比
fn comparable(left: &Type, right: &Type) -> bool {
    left.is_dyn()
        || right.is_dyn()
        || *left == Type::Null
        || *right == Type::Null
        || (left.is_numeric() && right.is_numeric())
        || left.accepts(right)
}

fn orderable(left: &Type, right: &Type) -> bool {
    match (left, right) {
        (Type::Dyn, _) | (_, Type::Dyn) => true,
        (a, b) if a.is_numeric() && b.is_numeric() => true,
        (Type::String, Type::String)
        | (Type::Bytes, Type::Bytes)
        | (Type::Bool, Type::Bool)
        | (Type::Timestamp, Type::Timestamp) => true,
        _ => false,
    }
}

/// 同类型数值保持原类型，混合数值为 double
fn arithmetic_type(left: &Type, right: &Type) -> Option<Type> {
    match (left, right) {
        (Type::Dyn, _) | (_, Type::Dyn) => Some(Type::Dyn),
        (a, b) if a.is_numeric() && a == b => Some(a.clone()),
        (a, b) if a.is_numeric() && b.is_numeric() => Some(Type::Double),
        _ => None,
    }
}
