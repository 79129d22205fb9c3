//! 有界 LRU + 绝对 TTL 缓存池

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

struct PoolEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// 缓存池
///
/// 条目数永远不超过容量，满时插入会淘汰最久未使用的条目；
/// 每个条目自插入起经过 TTL 后即不可见，访问不会延长寿命。
pub struct CachePool<K, V> {
    entries: Mutex<LruCache<K, PoolEntry<V>>>,
    capacity: NonZeroUsize,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> CachePool<K, V> {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
            ttl,
        }
    }

    /// 查找条目，命中时提升为最近使用；过期条目在此处被移除
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
        }
        None
    }

    /// 判断条目是否存在且未过期，不影响 LRU 顺序
    pub fn contains(&self, key: &K) -> bool {
        self.entries
            .lock()
            .peek(key)
            .is_some_and(|entry| entry.inserted_at.elapsed() < self.ttl)
    }

    /// 插入条目，返回是否淘汰了其他条目
    pub fn insert(&self, key: K, value: V) -> bool {
        let entry = PoolEntry {
            value,
            inserted_at: Instant::now(),
        };

        let mut entries = self.entries.lock();
        let replacing = entries.contains(&key);
        let evicted = entries.push(key, entry);

        // push 在替换同键条目时也会返回旧条目，只有淘汰他键才算淘汰
        evicted.is_some() && !replacing
    }

    /// 当前条目数（可能包含尚未清理的过期条目）
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<K: Hash + Eq + Clone, V: Clone> CachePool<K, V> {
    /// 移除所有已过期的条目，返回移除数量
    ///
    /// LRU 顺序与插入顺序不同，需要检查全部条目。
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let expired: Vec<K> = entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }
}
