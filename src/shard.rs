//! Hash maps split across independently locked shards.

use std::hash::{BuildHasher, Hash};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rustc_hash::{FxBuildHasher, FxHashMap};

pub const SHARD_COUNT: usize = 16;

/// A map whose keys are spread over [`SHARD_COUNT`] `RwLock`ed shards, so
/// access to one shard never waits on another.
pub struct ShardedMap<K, V> {
    shards: Vec<RwLock<FxHashMap<K, V>>>,
}

impl<K: Hash + Eq, V> ShardedMap<K, V> {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT)
                .map(|_| RwLock::new(FxHashMap::default()))
                .collect(),
        }
    }

    pub fn shard_index(&self, key: &K) -> usize {
        (FxBuildHasher.hash_one(key) as usize) % self.shards.len()
    }

    /// Read access to the shard holding `key`. A poisoned lock still yields
    /// the map; entries are only ever replaced whole.
    pub fn read(&self, key: &K) -> RwLockReadGuard<'_, FxHashMap<K, V>> {
        self.read_shard(self.shard_index(key))
    }

    pub fn write(&self, key: &K) -> RwLockWriteGuard<'_, FxHashMap<K, V>> {
        self.write_shard(self.shard_index(key))
    }

    pub fn read_shard(&self, index: usize) -> RwLockReadGuard<'_, FxHashMap<K, V>> {
        self.shards[index]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write_shard(&self, index: usize) -> RwLockWriteGuard<'_, FxHashMap<K, V>> {
        self.shards[index]
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn len(&self) -> usize {
        (0..self.shards.len())
            .map(|i| self.read_shard(i).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep only the entries for which `keep` returns true, shard by shard.
    pub fn retain(&self, mut keep: impl FnMut(&K, &mut V) -> bool) -> usize {
        let mut removed = 0;
        for i in 0..self.shards.len() {
            let mut shard = self.write_shard(i);
            let before = shard.len();
            shard.retain(|k, v| keep(k, v));
            removed += before - shard.len();
        }
        removed
    }

    pub fn clear(&self) {
        for i in 0..self.shards.len() {
            self.write_shard(i).clear();
        }
    }
}

impl<K: Hash + Eq, V> Default for ShardedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_land_in_a_stable_shard() {
        let map: ShardedMap<String, u32> = ShardedMap::new();
        let key = "example.com".to_string();
        assert_eq!(map.shard_index(&key), map.shard_index(&key.clone()));
        map.write(&key).insert(key.clone(), 1);
        assert_eq!(map.read(&key).get(&key), Some(&1));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn retain_spans_all_shards() {
        let map: ShardedMap<u32, u32> = ShardedMap::new();
        for i in 0..100 {
            map.write(&i).insert(i, i);
        }
        assert_eq!(map.retain(|_, v| *v % 2 == 0), 50);
        assert_eq!(map.len(), 50);
        map.clear();
        assert!(map.is_empty());
    }
}
