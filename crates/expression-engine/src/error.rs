//! 表达式引擎错误类型
//!
//! `EngineError` 面向调用方，`EvalError` 是程序执行期内部的错误。

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::expr::Issue;

/// 诊断问题列表，显示时逐条换行
#[derive(Debug, Clone, PartialEq)]
pub struct Issues(pub Vec<Issue>);

impl Issues {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Issue> {
        self.0.iter()
    }
}

impl fmt::Display for Issues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {}", issue)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("无效的输入数据: {0}")]
    InvalidInput(String),

    #[error("JSON 解析失败: {0}")]
    Json(#[from] serde_json::Error),

    #[error("表达式编译失败: '{expression}'，共 {} 个问题:\n{issues}", .issues.len())]
    Compile { expression: String, issues: Issues },

    #[error("程序构建失败: '{expression}': {message}")]
    ProgramConstruction { expression: String, message: String },

    #[error("表达式执行失败: '{expression}': {source}")]
    Evaluation {
        expression: String,
        #[source]
        source: EvalError,
    },

    #[error("表达式结果不是布尔值: '{expression}' 得到 {actual}")]
    NonBooleanResult { expression: String, actual: String },

    #[error("正则表达式编译失败: '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("无效的引擎配置: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Json(_) => "INVALID_JSON",
            Self::Compile { .. } => "COMPILE_ERROR",
            Self::ProgramConstruction { .. } => "PROGRAM_CONSTRUCTION_ERROR",
            Self::Evaluation { .. } => "EVALUATION_ERROR",
            Self::NonBooleanResult { .. } => "NON_BOOLEAN_RESULT",
            Self::Pattern { .. } => "PATTERN_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// 是否属于输入数据问题（调用方不应重试）
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::Json(_))
    }

    /// 结构化元数据，供外部错误上报附加到日志
    ///
    /// 至少包含 `code`，以及失败的 `expression` 或 `pattern`。
    pub fn metadata(&self) -> BTreeMap<&'static str, String> {
        let mut meta = BTreeMap::new();
        meta.insert("code", self.code().to_string());

        match self {
            Self::Compile { expression, issues } => {
                meta.insert("expression", expression.clone());
                meta.insert("issue_count", issues.len().to_string());
            }
            Self::ProgramConstruction { expression, .. }
            | Self::NonBooleanResult { expression, .. } => {
                meta.insert("expression", expression.clone());
            }
            Self::Evaluation { expression, source } => {
                meta.insert("expression", expression.clone());
                meta.insert("eval_error", source.kind().to_string());
            }
            Self::Pattern { pattern, .. } => {
                meta.insert("pattern", pattern.clone());
            }
            Self::InvalidInput(_) | Self::Json(_) | Self::Config(_) => {}
        }

        meta
    }
}

/// 程序执行期错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// 函数实现收到的参数个数与注册的重载不一致，属于集成缺陷
    #[error("函数 {function} 参数个数错误: 期望 {expected}, 实际 {actual}")]
    Arity {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("函数 {function} 没有匹配的重载: ({arguments})")]
    NoMatchingOverload { function: String, arguments: String },

    #[error("类型不匹配: 期望 {expected}, 实际 {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("除数为零")]
    DivisionByZero,

    #[error("数值溢出: {0}")]
    Overflow(String),

    #[error("键不存在: {0}")]
    NoSuchKey(String),

    #[error("下标越界: {index} (长度 {len})")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("变量未绑定: {0}")]
    UnknownVariable(String),

    #[error("无效的参数: {0}")]
    InvalidArgument(String),
}

impl EvalError {
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// 错误种类名称
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Arity { .. } => "arity",
            Self::NoMatchingOverload { .. } => "no_matching_overload",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::DivisionByZero => "division_by_zero",
            Self::Overflow(_) => "overflow",
            Self::NoSuchKey(_) => "no_such_key",
            Self::IndexOutOfBounds { .. } => "index_out_of_bounds",
            Self::UnknownVariable(_) => "unknown_variable",
            Self::InvalidArgument(_) => "invalid_argument",
        }
    }
}
