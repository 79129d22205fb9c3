//! 评估入口
//!
//! `ExpressionEngine` 持有表达式编译缓存、模式缓存和函数库，
//! 一次评估的流程：
//!
//! 1. 规范化输入，得到顶层变量表与原始 JSON 文本
//! 2. 由变量表计算类型签名，与表达式文本一起计算缓存键
//! 3. 从编译缓存取得程序（未命中时编译）
//! 4. 执行程序，结果必须是布尔值

use std::sync::{Arc, OnceLock};

use filter_shared::config::EngineConfig;
use filter_shared::observability::metrics as engine_metrics;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::{CacheKey, CacheStats};
use crate::compile::{CompiledProgram, ExpressionCache};
use crate::error::{EngineError, Result};
use crate::expr::Activation;
use crate::functions::FunctionRegistry;
use crate::input::{EventData, NormalizedInput};
use crate::pattern::{PatternCache, PatternDictionary, SharedPatternDictionary};
use crate::value::{Value, ValueSignature};

/// 两个缓存的统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub expressions: CacheStats,
    pub patterns: CacheStats,
}

type FunctionExtension = Box<dyn FnOnce(&mut FunctionRegistry)>;

/// 引擎构建器
pub struct ExpressionEngineBuilder {
    config: EngineConfig,
    dictionary: Option<Arc<dyn PatternDictionary>>,
    extensions: Vec<FunctionExtension>,
}

impl ExpressionEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// 注入占位符字典，缺省为空的 `SharedPatternDictionary`
    pub fn dictionary(mut self, dictionary: Arc<dyn PatternDictionary>) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    /// 在标准函数库之上追加声明与实现
    pub fn extend_functions<F>(mut self, extension: F) -> Self
    where
        F: FnOnce(&mut FunctionRegistry) + 'static,
    {
        self.extensions.push(Box::new(extension));
        self
    }

    pub fn build(self) -> Result<ExpressionEngine> {
        self.config
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        let dictionary = self
            .dictionary
            .unwrap_or_else(|| Arc::new(SharedPatternDictionary::default()));
        let patterns = Arc::new(PatternCache::from_config(&self.config, dictionary)?);

        let mut registry =
            FunctionRegistry::standard(Arc::clone(&patterns), self.config.time_predicates);
        for extension in self.extensions {
            extension(&mut registry);
        }

        let expressions = ExpressionCache::new(&self.config.expression_cache, Arc::new(registry))?;

        info!(
            expression_capacity = self.config.expression_cache.capacity,
            pattern_capacity = self.config.pattern_cache.capacity,
            time_predicates = self.config.time_predicates,
            "表达式引擎已创建"
        );

        Ok(ExpressionEngine {
            config: self.config,
            patterns,
            expressions,
        })
    }
}

/// 表达式引擎
pub struct ExpressionEngine {
    config: EngineConfig,
    patterns: Arc<PatternCache>,
    expressions: ExpressionCache,
}

impl ExpressionEngine {
    pub fn builder() -> ExpressionEngineBuilder {
        ExpressionEngineBuilder {
            config: EngineConfig::default(),
            dictionary: None,
            extensions: Vec::new(),
        }
    }

    /// 按配置创建引擎，使用空的占位符字典
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// 评估表达式，结果必须是布尔值
    pub fn evaluate(&self, expression: &str, data: impl Into<EventData>) -> Result<bool> {
        let result = self
            .evaluate_value(expression, data)
            .and_then(|value| match value {
                Value::Bool(matched) => Ok(matched),
                other => Err(EngineError::NonBooleanResult {
                    expression: expression.to_string(),
                    actual: other.type_name().to_string(),
                }),
            });

        engine_metrics::record_evaluation(match &result {
            Ok(true) => "true",
            Ok(false) => "false",
            Err(_) => "error",
        });
        result
    }

    /// 评估表达式并返回原始结果值
    pub fn evaluate_value(&self, expression: &str, data: impl Into<EventData>) -> Result<Value> {
        let input = NormalizedInput::from_event(data.into())?;
        let signature = input.signature();
        let key = CacheKey::for_expression(expression, &signature);

        let program = self
            .expressions
            .get_or_compile(&key, expression, &signature)?;

        let activation = Activation::new()
            .with_values(&input.values)
            .with_document(&input.raw);
        let value = program
            .execute(&activation)
            .map_err(|source| EngineError::Evaluation {
                expression: expression.to_string(),
                source,
            })?;

        debug!(program_id = program.id(), result = %value, "表达式已评估");
        Ok(value)
    }

    /// 按签名编译（或取出缓存中的）程序
    pub fn compile(
        &self,
        expression: &str,
        signature: &ValueSignature,
    ) -> Result<Arc<CompiledProgram>> {
        self.expressions.get(expression, signature)
    }

    pub fn patterns(&self) -> &Arc<PatternCache> {
        &self.patterns
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        self.expressions.functions()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            expressions: self.expressions.stats(),
            patterns: self.patterns.stats(),
        }
    }

    /// 清理两个缓存中的过期条目
    pub fn purge_expired(&self) -> usize {
        self.expressions.purge_expired() + self.patterns.purge_expired()
    }

    /// 清空两个缓存
    pub fn clear(&self) {
        self.expressions.clear();
        self.patterns.clear();
    }
}

static DEFAULT_ENGINE: OnceLock<std::result::Result<ExpressionEngine, String>> = OnceLock::new();

/// 进程级默认引擎，按默认配置创建
pub fn default_engine() -> Result<&'static ExpressionEngine> {
    DEFAULT_ENGINE
        .get_or_init(|| ExpressionEngine::new(EngineConfig::default()).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|message| EngineError::Config(message.clone()))
}

/// 使用默认引擎评估表达式
pub fn evaluate(expression: &str, data: impl Into<EventData>) -> Result<bool> {
    default_engine()?.evaluate(expression, data)
}
