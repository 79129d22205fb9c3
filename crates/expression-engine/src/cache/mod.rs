//! 分片编译缓存
//!
//! 表达式缓存与模式缓存共用的并发核心：
//!
//! 1. 快速路径：只依赖缓存池自身的同步直接查找，命中即返回
//! 2. 未命中时按键摘要选择分片锁并加锁
//! 3. 持锁后再次查找（双重检查），其他调用方可能刚刚完成编译
//! 4. 仍未命中则执行构建，成功后写入缓存池；失败结果不写入
//!
//! 同一个键在任意时刻最多只有一次构建在进行；构建完成的值通过缓存池的
//! 互斥锁发布，读者不会看到构建了一半的值。

mod key;
mod pool;
mod shard;

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use filter_shared::observability::metrics as engine_metrics;
use serde::Serialize;
use tracing::debug;

pub use key::CacheKey;
pub use pool::CachePool;
pub use shard::{SHARD_COUNT, ShardLockTable};

/// 缓存统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub compilations: u64,
    pub compile_failures: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    compilations: AtomicU64,
    compile_failures: AtomicU64,
}

pub struct ShardedCache<V> {
    /// 指标标签（"expression" / "pattern"）
    name: &'static str,
    pool: CachePool<CacheKey, V>,
    locks: ShardLockTable,
    counters: Counters,
}

impl<V: Clone> ShardedCache<V> {
    pub fn new(name: &'static str, capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            name,
            pool: CachePool::new(capacity, ttl),
            locks: ShardLockTable::new(),
            counters: Counters::default(),
        }
    }

    /// 只查找，不构建
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.pool.get(key)
    }

    /// 查找或构建
    ///
    /// `build` 只会在持有该键分片锁且缓存池中确实没有该键时被调用。
    pub fn get_or_try_insert_with<E, F>(&self, key: &CacheKey, build: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.pool.get(key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            engine_metrics::record_cache_lookup(self.name, true);
            return Ok(value);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        engine_metrics::record_cache_lookup(self.name, false);

        let _guard = self.locks.lock(key.digest());

        if let Some(value) = self.pool.get(key) {
            debug!(cache = self.name, key = ?key, "等待分片锁期间已由其他调用方完成构建");
            return Ok(value);
        }

        let started = Instant::now();
        let built = build();
        let elapsed = started.elapsed().as_secs_f64();

        match built {
            Ok(value) => {
                self.counters.compilations.fetch_add(1, Ordering::Relaxed);
                engine_metrics::record_compilation(self.name, true, elapsed);

                if self.pool.insert(key.clone(), value.clone()) {
                    debug!(cache = self.name, "缓存已满，淘汰最久未使用的条目");
                }
                Ok(value)
            }
            Err(err) => {
                self.counters.compile_failures.fetch_add(1, Ordering::Relaxed);
                engine_metrics::record_compilation(self.name, false, elapsed);
                Err(err)
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            compilations: self.counters.compilations.load(Ordering::Relaxed),
            compile_failures: self.counters.compile_failures.load(Ordering::Relaxed),
            size: self.pool.len(),
            capacity: self.pool.capacity(),
        }
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.pool.contains(key)
    }

    /// 清理过期条目，返回清理数量
    pub fn purge_expired(&self) -> usize {
        self.pool.purge_expired()
    }

    /// 清空缓存（统计计数保留）
    pub fn clear(&self) {
        self.pool.clear();
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
