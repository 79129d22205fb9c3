//! 表达式前端
//!
//! 文本 → 词法分析 → Pratt 语法分析 → 类型检查（收集全部问题）→ 程序构建。
//! 类型检查失败与程序构建失败是两类不同的错误。

pub mod ast;
pub mod checker;
pub mod lexer;
pub mod parser;
pub mod program;
pub mod token;
pub mod types;

use std::fmt;

pub use checker::{Checked, Environment};
pub use program::{Activation, Program};
pub use types::Type;

/// 源文本中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// 字节偏移，从 0 开始
    pub offset: usize,
    /// 行号，从 1 开始
    pub line: usize,
    /// 列号（字符），从 1 开始
    pub column: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// 一条诊断问题
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub message: String,
    pub position: Position,
}

impl Issue {
    pub fn new(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR: {}: {}", self.position, self.message)
    }
}

/// 解析并检查表达式
///
/// 词法与语法问题会与类型问题一起返回；只要存在任何问题就不会产出检查结果。
pub fn parse_and_check(source: &str, env: &Environment) -> Result<Checked, Vec<Issue>> {
    let ast = parser::parse(source)?;
    checker::check(&ast, env)
}
