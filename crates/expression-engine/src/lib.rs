//! 表达式过滤引擎
//!
//! 对结构化事件评估布尔表达式，提供：
//! - 按 (表达式, 输入类型签名) 缓存的编译程序，同一键最多编译一次
//! - 路径感知的谓词函数库，直接从原始 JSON 文本中取值
//! - 支持占位符展开的正则模式缓存
//! - 统一的评估入口与结构化错误

pub mod cache;
pub mod compile;
pub mod engine;
pub mod error;
pub mod expr;
pub mod functions;
pub mod input;
pub mod operators;
pub mod path;
pub mod pattern;
pub mod value;

pub use cache::{CacheKey, CacheStats};
pub use compile::{CompiledProgram, ExpressionCache};
pub use engine::{EngineStats, ExpressionEngine, ExpressionEngineBuilder, default_engine, evaluate};
pub use error::{EngineError, EvalError, Result};
pub use functions::{FunctionDecl, FunctionRegistry};
pub use input::{EventData, NormalizedInput};
pub use pattern::{PatternCache, PatternDictionary, SharedPatternDictionary};
pub use value::{TypeTag, Value, ValueMap, ValueSignature};
