//! 分片锁表
//!
//! 固定数量的互斥锁，按键摘要取模选择。同一个键永远落在同一把锁上，
//! 不同键之间的竞争被限制在分片数以内，且不需要为每个键分配锁。

use parking_lot::{Mutex, MutexGuard};

/// 分片数量
pub const SHARD_COUNT: usize = 1024;

pub struct ShardLockTable {
    locks: Box<[Mutex<()>]>,
}

impl ShardLockTable {
    pub fn new() -> Self {
        let locks = (0..SHARD_COUNT).map(|_| Mutex::new(())).collect();
        Self { locks }
    }

    /// 摘要对应的分片下标
    #[inline]
    pub fn index_for(digest: u64) -> usize {
        (digest % SHARD_COUNT as u64) as usize
    }

    /// 获取摘要对应的分片锁
    pub fn lock(&self, digest: u64) -> MutexGuard<'_, ()> {
        self.locks[Self::index_for(digest)].lock()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Default for ShardLockTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_table_size() {
        assert_eq!(ShardLockTable::new().len(), SHARD_COUNT);
    }

    #[test]
    fn test_index_is_stable_and_bounded() {
        for digest in [0u64, 1, 1023, 1024, 1025, u64::MAX] {
            let index = ShardLockTable::index_for(digest);
            assert!(index < SHARD_COUNT);
            assert_eq!(index, ShardLockTable::index_for(digest));
        }
        assert_eq!(ShardLockTable::index_for(1), ShardLockTable::index_for(1025));
    }

    #[test]
    fn test_same_digest_is_serialized() {
        let table = Arc::new(ShardLockTable::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..100 {
                        let _guard = table.lock(42);
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_different_shards_do_not_block() {
        let table = ShardLockTable::new();
        let _a = table.lock(1);
        // 另一分片的锁可以立即获取
        assert!(table.locks[ShardLockTable::index_for(2)].try_lock().is_some());
    }
}
