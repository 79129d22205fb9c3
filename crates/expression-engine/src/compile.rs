//! 表达式编译缓存
//!
//! 按 (表达式文本, 输入类型签名) 缓存编译后的程序。同一表达式在不同签名
//! 下会编译出互相独立的程序；编译失败不写入缓存。

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use filter_shared::config::CacheSettings;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheKey, CacheStats, ShardedCache};
use crate::error::{EngineError, EvalError, Issues, Result};
use crate::expr::{self, Activation, Environment, Program, Type};
use crate::functions::{DOCUMENT_VARIABLE, FunctionRegistry};
use crate::value::{Value, ValueSignature};

/// 程序序号，进程内单调递增
static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

/// 编译后的程序
///
/// 创建后不可变，通过 `Arc` 在调用方之间共享。
#[derive(Debug)]
pub struct CompiledProgram {
    id: u64,
    expression: String,
    signature: ValueSignature,
    result_type: Type,
    program: Program,
}

impl CompiledProgram {
    /// 进程内唯一的程序序号
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn signature(&self) -> &ValueSignature {
        &self.signature
    }

    /// 检查阶段推导出的结果类型
    pub fn result_type(&self) -> &Type {
        &self.result_type
    }

    pub fn execute(&self, activation: &Activation<'_>) -> std::result::Result<Value, EvalError> {
        self.program.execute(activation)
    }
}

/// 构建编译环境
///
/// 声明隐藏的原始 JSON 文本变量，并为签名中的每个条目声明一个变量；
/// 与隐藏变量同名的条目被忽略。
pub fn build_environment(signature: &ValueSignature, functions: Arc<FunctionRegistry>) -> Environment {
    let mut env = Environment::new(functions);
    env.declare(DOCUMENT_VARIABLE, Type::String);
    for (name, tag) in signature.iter() {
        if name == DOCUMENT_VARIABLE {
            continue;
        }
        env.declare(name, Type::from_tag(tag));
    }
    env
}

/// 编译表达式，不经过缓存
pub fn compile(
    expression: &str,
    signature: &ValueSignature,
    functions: Arc<FunctionRegistry>,
) -> Result<CompiledProgram> {
    let env = build_environment(signature, Arc::clone(&functions));

    let checked = expr::parse_and_check(expression, &env).map_err(|issues| {
        warn!(expression = %expression, issues = issues.len(), "表达式检查失败");
        EngineError::Compile {
            expression: expression.to_string(),
            issues: Issues(issues),
        }
    })?;

    let program = Program::build(&checked, &functions).map_err(|message| {
        warn!(expression = %expression, error = %message, "程序构建失败");
        EngineError::ProgramConstruction {
            expression: expression.to_string(),
            message,
        }
    })?;

    Ok(CompiledProgram {
        id: NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed),
        expression: expression.to_string(),
        signature: signature.clone(),
        result_type: checked.result_type,
        program,
    })
}

/// 表达式编译缓存
pub struct ExpressionCache {
    cache: ShardedCache<Arc<CompiledProgram>>,
    functions: Arc<FunctionRegistry>,
}

impl ExpressionCache {
    pub fn new(settings: &CacheSettings, functions: Arc<FunctionRegistry>) -> Result<Self> {
        let capacity = NonZeroUsize::new(settings.capacity)
            .ok_or_else(|| EngineError::Config("表达式缓存容量必须大于 0".to_string()))?;
        if settings.ttl_seconds == 0 {
            return Err(EngineError::Config("表达式缓存 TTL 必须大于 0".to_string()));
        }

        Ok(Self {
            cache: ShardedCache::new(
                "expression",
                capacity,
                Duration::from_secs(settings.ttl_seconds),
            ),
            functions,
        })
    }

    /// 获取或编译程序
    #[instrument(skip(self, key, signature), fields(key = ?key))]
    pub fn get_or_compile(
        &self,
        key: &CacheKey,
        expression: &str,
        signature: &ValueSignature,
    ) -> Result<Arc<CompiledProgram>> {
        self.cache.get_or_try_insert_with(key, || {
            let program = compile(expression, signature, Arc::clone(&self.functions))?;
            debug!(
                program_id = program.id(),
                signature = %signature,
                result_type = %program.result_type(),
                "表达式已编译"
            );
            Ok(Arc::new(program))
        })
    }

    /// 按表达式与签名计算键后获取或编译
    pub fn get(&self, expression: &str, signature: &ValueSignature) -> Result<Arc<CompiledProgram>> {
        let key = CacheKey::for_expression(expression, signature);
        self.get_or_compile(&key, expression, signature)
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}
