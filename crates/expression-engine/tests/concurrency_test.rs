//! 并发编译测试
//!
//! 大量线程同时请求同一个键时只编译一次，且所有线程拿到同一个程序。

use std::sync::{Arc, Barrier};
use std::thread;

use expression_engine::{ExpressionEngine, TypeTag, ValueSignature};
use filter_shared::config::EngineConfig;

const THREADS: usize = 100;

#[test]
fn test_same_key_compiles_once() {
    let engine = Arc::new(ExpressionEngine::new(EngineConfig::default()).unwrap());
    let sig = ValueSignature::new()
        .with("amount", TypeTag::Int)
        .with("level", TypeTag::String);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let sig = sig.clone();
            thread::spawn(move || {
                barrier.wait();
                engine
                    .compile(r#"amount > 100 && level == "gold""#, &sig)
                    .unwrap()
            })
        })
        .collect();

    let programs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let first = &programs[0];
    assert!(programs.iter().all(|p| Arc::ptr_eq(p, first)));

    let stats = engine.stats().expressions;
    assert_eq!(stats.compilations, 1);
    assert_eq!(stats.hits + stats.misses, THREADS as u64);
}

#[test]
fn test_concurrent_evaluation_agrees() {
    let engine = Arc::new(ExpressionEngine::new(EngineConfig::default()).unwrap());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let event = format!(r#"{{"n": {}, "ip": "10.0.0.{}"}}"#, i, i % 250);
                barrier.wait();
                let matched = engine
                    .evaluate(r#"n % 2 == 0 && inCIDR("ip", "10.0.0.0/24")"#, event)
                    .unwrap();
                (i, matched)
            })
        })
        .collect();

    for handle in handles {
        let (i, matched) = handle.join().unwrap();
        assert_eq!(matched, i % 2 == 0);
    }
    assert_eq!(engine.stats().expressions.compilations, 1);
}

#[test]
fn test_distinct_keys_compile_independently() {
    let engine = Arc::new(ExpressionEngine::new(EngineConfig::default()).unwrap());
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine
                    .evaluate(&format!("x > {}", i), r#"{"x": 8}"#)
                    .unwrap()
            })
        })
        .collect();

    let matched = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|m| *m)
        .count();

    assert_eq!(matched, 8);
    assert_eq!(engine.stats().expressions.compilations, 16);
}
