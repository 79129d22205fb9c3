//! 指标模块
//!
//! 基于 metrics crate 记录缓存与编译指标。
//! 未安装 recorder 时所有记录调用都是空操作，宿主进程可自行安装导出器。

/// 缓存查找命中
pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
/// 缓存查找未命中
pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
/// 实际执行的编译次数
pub const CACHE_COMPILATIONS_TOTAL: &str = "cache_compilations_total";
/// 编译失败次数（失败结果不会进入缓存）
pub const CACHE_COMPILE_FAILURES_TOTAL: &str = "cache_compile_failures_total";
/// 编译耗时
pub const CACHE_COMPILE_DURATION_SECONDS: &str = "cache_compile_duration_seconds";
/// 表达式评估次数
pub const EXPRESSION_EVALUATIONS_TOTAL: &str = "expression_evaluations_total";

/// 注册指标描述
///
/// 这些描述会出现在导出端点的 HELP 注释中
pub fn describe_metrics() {
    metrics::describe_counter!(CACHE_HITS_TOTAL, "Total number of cache lookups served from the pool");
    metrics::describe_counter!(CACHE_MISSES_TOTAL, "Total number of cache lookups that missed the pool");
    metrics::describe_counter!(
        CACHE_COMPILATIONS_TOTAL,
        "Total number of compilations performed on cache miss"
    );
    metrics::describe_counter!(
        CACHE_COMPILE_FAILURES_TOTAL,
        "Total number of failed compilations"
    );
    metrics::describe_histogram!(
        CACHE_COMPILE_DURATION_SECONDS,
        "Compilation duration in seconds"
    );
    metrics::describe_counter!(
        EXPRESSION_EVALUATIONS_TOTAL,
        "Total number of expression evaluations"
    );
}

/// 记录缓存查找结果
#[inline]
pub fn record_cache_lookup(cache: &'static str, hit: bool) {
    if hit {
        metrics::counter!(CACHE_HITS_TOTAL, "cache" => cache).increment(1);
    } else {
        metrics::counter!(CACHE_MISSES_TOTAL, "cache" => cache).increment(1);
    }
}

/// 记录一次编译
#[inline]
pub fn record_compilation(cache: &'static str, succeeded: bool, duration_secs: f64) {
    if succeeded {
        metrics::counter!(CACHE_COMPILATIONS_TOTAL, "cache" => cache).increment(1);
    } else {
        metrics::counter!(CACHE_COMPILE_FAILURES_TOTAL, "cache" => cache).increment(1);
    }
    metrics::histogram!(CACHE_COMPILE_DURATION_SECONDS, "cache" => cache).record(duration_secs);
}

/// 记录表达式评估
#[inline]
pub fn record_evaluation(status: &'static str) {
    metrics::counter!(EXPRESSION_EVALUATIONS_TOTAL, "status" => status).increment(1);
}
