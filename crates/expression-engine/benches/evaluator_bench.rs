//! 表达式评估性能基准测试
//!
//! 覆盖缓存命中路径的完整评估、路径访问和模式缓存查找。

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use expression_engine::path;
use expression_engine::{ExpressionEngine, SharedPatternDictionary, TypeTag, ValueSignature};
use filter_shared::config::EngineConfig;
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;

/// 创建测试事件
fn create_event() -> String {
    json!({
        "order": {"id": "order-12345", "amount": 1500, "currency": "CNY"},
        "user": {"level": "gold", "tags": ["vip", "annual_pass"], "score": "88.5"},
        "client": {"ip": "10.12.0.7"}
    })
    .to_string()
}

fn create_engine() -> ExpressionEngine {
    ExpressionEngine::builder()
        .config(EngineConfig::default())
        .dictionary(Arc::new(SharedPatternDictionary::from([(
            "ORDER",
            r"order-\d+",
        )])))
        .build()
        .expect("engine")
}

/// 缓存命中时的完整评估
fn bench_cached_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_evaluation");
    let engine = create_engine();
    let event = create_event();

    let expressions = [
        ("member", "order.amount > 1000"),
        ("equals", r#"equals("order.currency", "CNY")"#),
        ("numeric_coercion", r#"greaterThan("user.score", 80)"#),
        ("cidr", r#"inCIDR("client.ip", "10.0.0.0/8")"#),
        ("regex", r#"regexMatch("order.id", "^{{.ORDER}}$")"#),
        (
            "compound",
            r#"order.amount > 1000 && oneOf("user.level", ["gold", "platinum"]) && "vip" in user.tags"#,
        ),
    ];

    for (name, expr) in expressions {
        // 预热，确保后续都走命中路径
        engine.evaluate(expr, event.as_str()).expect("warm up");
        group.bench_with_input(BenchmarkId::from_parameter(name), &expr, |b, expr| {
            b.iter(|| engine.evaluate(black_box(expr), black_box(event.as_str())))
        });
    }

    group.finish();
}

/// 编译缓存查找
fn bench_compile_lookup(c: &mut Criterion) {
    let engine = create_engine();
    let sig = ValueSignature::new()
        .with("amount", TypeTag::Int)
        .with("level", TypeTag::String);
    engine.compile("amount > 100", &sig).expect("warm up");

    c.bench_function("compile_cache_hit", |b| {
        b.iter(|| engine.compile(black_box("amount > 100"), black_box(&sig)))
    });
}

/// 路径访问
fn bench_path_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_lookup");
    let event = create_event();

    for path in ["order.id", "user.tags.1", "client.ip", "missing.path"] {
        group.bench_with_input(BenchmarkId::from_parameter(path), &path, |b, path| {
            b.iter(|| path::resolve(black_box(&event), black_box(path)))
        });
    }

    group.finish();
}

/// 模式缓存查找（含占位符展开）
fn bench_pattern_lookup(c: &mut Criterion) {
    let engine = create_engine();
    let patterns = engine.patterns();
    patterns.get_compiled_pattern("^{{.ORDER}}$").expect("warm up");

    c.bench_function("pattern_cache_hit", |b| {
        b.iter(|| patterns.get_compiled_pattern(black_box("^{{.ORDER}}$")))
    });
}

criterion_group!(
    benches,
    bench_cached_evaluation,
    bench_compile_lookup,
    bench_path_lookup,
    bench_pattern_lookup
);
criterion_main!(benches);
