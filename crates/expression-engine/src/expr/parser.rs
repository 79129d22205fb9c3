//! Pratt 语法分析器

use super::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use super::lexer::tokenize;
use super::token::{Token, TokenKind};
use super::{Issue, Position};
use crate::value::Value;

/// 最大嵌套深度，防止恶意输入耗尽栈空间
const MAX_DEPTH: usize = 128;

/// 运算符优先级（数值越大结合越紧）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Precedence {
    #[default]
    Lowest,
    /// `?:`
    Conditional,
    /// `||`
    Or,
    /// `&&`
    And,
    /// `== != < <= > >= in`
    Relation,
    /// `+ -`
    Sum,
    /// `* / %`
    Product,
    /// 一元 `! -`
    Prefix,
    /// `.field` `[index]` `(args)`
    Postfix,
}

impl Precedence {
    fn of(kind: &TokenKind) -> Precedence {
        match kind {
            TokenKind::Question => Precedence::Conditional,
            TokenKind::OrOr => Precedence::Or,
            TokenKind::AndAnd => Precedence::And,
            TokenKind::EqEq
            | TokenKind::NotEq
            | TokenKind::Lt
            | TokenKind::Le
            | TokenKind::Gt
            | TokenKind::Ge
            | TokenKind::In => Precedence::Relation,
            TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Product,
            TokenKind::Dot | TokenKind::LBracket | TokenKind::LParen => Precedence::Postfix,
            _ => Precedence::Lowest,
        }
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::OrOr => BinaryOp::Or,
        TokenKind::AndAnd => BinaryOp::And,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::Ne,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Le => BinaryOp::Le,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Ge => BinaryOp::Ge,
        TokenKind::In => BinaryOp::In,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Rem,
        _ => return None,
    })
}

pub struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    depth: usize,
    issues: Vec<Issue>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            cursor: 0,
            depth: 0,
            issues: Vec::new(),
        }
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.cursor.min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(&kind) {
            return Some(self.advance());
        }
        let found = self.peek().clone();
        self.error(
            format!("expected '{}', found '{}'", kind, found.kind),
            found.position,
        );
        None
    }

    fn error(&mut self, message: impl Into<String>, position: Position) {
        self.issues.push(Issue::new(message, position));
    }

    pub fn parse_expression(&mut self, precedence: Precedence) -> Option<Expr> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            let position = self.peek().position;
            self.error(
                format!("expression nesting exceeds maximum depth of {}", MAX_DEPTH),
                position,
            );
            self.depth -= 1;
            return None;
        }

        let result = self.parse_expression_inner(precedence);
        self.depth -= 1;
        result
    }

    fn parse_expression_inner(&mut self, precedence: Precedence) -> Option<Expr> {
        let mut left = self.parse_prefix()?;

        loop {
            let next = Precedence::of(&self.peek().kind);
            if next <= precedence {
                break;
            }
            left = self.parse_infix(left, next)?;
        }

        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expr> {
        let token = self.advance();
        let position = token.position;

        let kind = match token.kind {
            TokenKind::Int(i) => ExprKind::Literal(Value::Int(i)),
            TokenKind::Uint(u) => ExprKind::Literal(Value::Uint(u)),
            TokenKind::Double(d) => ExprKind::Literal(Value::Double(d)),
            TokenKind::Str(s) => ExprKind::Literal(Value::string(s)),
            TokenKind::Bytes(b) => ExprKind::Literal(Value::bytes(b)),
            TokenKind::True => ExprKind::Literal(Value::Bool(true)),
            TokenKind::False => ExprKind::Literal(Value::Bool(false)),
            TokenKind::Null => ExprKind::Literal(Value::Null),
            TokenKind::Ident(name) => {
                if self.eat(&TokenKind::LParen) {
                    let args = self.parse_list(TokenKind::RParen)?;
                    ExprKind::Call(name, args)
                } else {
                    ExprKind::Ident(name)
                }
            }
            TokenKind::Bang => {
                let operand = self.parse_expression(Precedence::Prefix)?;
                ExprKind::Unary(UnaryOp::Not, Box::new(operand))
            }
            TokenKind::Minus => {
                let operand = self.parse_expression(Precedence::Prefix)?;
                match operand.kind {
                    // 数字字面量直接取负
                    ExprKind::Literal(Value::Int(i)) => ExprKind::Literal(Value::Int(-i)),
                    ExprKind::Literal(Value::Double(d)) => ExprKind::Literal(Value::Double(-d)),
                    _ => ExprKind::Unary(UnaryOp::Neg, Box::new(operand)),
                }
            }
            TokenKind::LParen => {
                let inner = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::RParen)?;
                return Some(inner);
            }
            TokenKind::LBracket => ExprKind::List(self.parse_list(TokenKind::RBracket)?),
            TokenKind::LBrace => ExprKind::Map(self.parse_map_entries()?),
            other => {
                self.error(format!("unexpected token '{}'", other), position);
                return None;
            }
        };

        Some(Expr::new(kind, position))
    }

    fn parse_infix(&mut self, left: Expr, precedence: Precedence) -> Option<Expr> {
        let token = self.advance();
        let position = token.position;

        let kind = match token.kind {
            TokenKind::Question => {
                let then = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::Colon)?;
                // 右结合：a ? b : c ? d : e
                let otherwise = self.parse_expression(Precedence::Lowest)?;
                ExprKind::Conditional(Box::new(left), Box::new(then), Box::new(otherwise))
            }
            TokenKind::Dot => {
                let field_token = self.advance();
                let TokenKind::Ident(field) = field_token.kind else {
                    self.error(
                        format!("expected field name after '.', found '{}'", field_token.kind),
                        field_token.position,
                    );
                    return None;
                };

                if self.eat(&TokenKind::LParen) {
                    // 接收者调用：x.f(a) 等价于 f(x, a)
                    let mut args = vec![left];
                    args.extend(self.parse_list(TokenKind::RParen)?);
                    ExprKind::Call(field, args)
                } else {
                    ExprKind::Member(Box::new(left), field)
                }
            }
            TokenKind::LBracket => {
                let index = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::RBracket)?;
                ExprKind::Index(Box::new(left), Box::new(index))
            }
            TokenKind::LParen => {
                self.error("only named functions can be called", position);
                return None;
            }
            ref other => {
                let Some(op) = binary_op(other) else {
                    self.error(format!("unexpected token '{}'", other), position);
                    return None;
                };
                let right = self.parse_expression(precedence)?;
                ExprKind::Binary(op, Box::new(left), Box::new(right))
            }
        };

        Some(Expr::new(kind, position))
    }

    /// 逗号分隔的表达式列表，允许尾随逗号
    fn parse_list(&mut self, close: TokenKind) -> Option<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check(&close) {
            items.push(self.parse_expression(Precedence::Lowest)?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Some(items)
    }

    fn parse_map_entries(&mut self) -> Option<Vec<(Expr, Expr)>> {
        let mut entries = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expression(Precedence::Lowest)?;
            entries.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Some(entries)
    }
}

/// 解析表达式文本
///
/// 词法问题与第一个语法问题一并返回。
pub fn parse(source: &str) -> Result<Expr, Vec<Issue>> {
    let (tokens, mut issues) = tokenize(source);
    let mut parser = Parser::new(tokens);

    let expr = parser.parse_expression(Precedence::Lowest);
    if expr.is_some() && !parser.check(&TokenKind::Eof) {
        let token = parser.peek().clone();
        parser.error(format!("unexpected token '{}'", token.kind), token.position);
    }

    issues.append(&mut parser.issues);
    match expr {
        Some(expr) if issues.is_empty() => Ok(expr),
        _ => {
            if issues.is_empty() {
                issues.push(Issue::new("failed to parse expression", Position::default()));
            }
            Err(issues)
        }
    }
}
