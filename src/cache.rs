//! Record set cache with TTL-based expiration.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::dns::{Question, Record, RecordSet};
use crate::shard::ShardedMap;

/// Bogus data is kept briefly so repeated queries do not hammer servers.
pub const BOGUS_TTL: u32 = 60;

/// DNSSEC validation state of cached or returned data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Security {
    Secure,
    Insecure,
    Bogus(String),
    /// Infrastructure data (delegations, glue, keys) that has not itself
    /// been validated yet.
    Unchecked,
}

impl Security {
    pub fn is_secure(&self) -> bool {
        matches!(self, Security::Secure)
    }

    pub fn is_bogus(&self) -> bool {
        matches!(self, Security::Bogus(_))
    }

    pub fn why_bogus(&self) -> Option<&str> {
        match self {
            Security::Bogus(reason) => Some(reason),
            _ => None,
        }
    }
}

/// What is known about a name/type/class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedData {
    Positive(RecordSet),
    /// NXDOMAIN or NODATA, with the authority records (SOA, denial proofs)
    /// that came with it.
    Negative { nxdomain: bool, authority: Vec<Record> },
}

impl CachedData {
    fn records_mut(&mut self) -> Box<dyn Iterator<Item = &mut Record> + '_> {
        match self {
            CachedData::Positive(set) => {
                Box::new(set.records.iter_mut().chain(set.signatures.iter_mut()))
            }
            CachedData::Negative { authority, .. } => Box::new(authority.iter_mut()),
        }
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, CachedData::Negative { .. })
    }
}

/// A cache hit. Record TTLs are the remaining lifetime of the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAnswer {
    pub data: CachedData,
    pub security: Security,
    pub ttl: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheLimits {
    pub min_ttl: u32,
    pub max_ttl: u32,
    pub max_negative_ttl: u32,
    pub max_entries: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            min_ttl: 0,
            max_ttl: 86400,
            max_negative_ttl: 3600,
            max_entries: 100_000,
        }
    }
}

struct CacheEntry {
    data: CachedData,
    security: Security,
    expires_at: Instant,
}

/// TTL-based cache keyed by (name, type, class).
///
/// Expired entries are misses and are dropped when next touched; [`sweep`]
/// clears the rest.
///
/// [`sweep`]: Cache::sweep
pub struct Cache {
    entries: ShardedMap<Question, CacheEntry>,
    limits: CacheLimits,
}

impl Cache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            entries: ShardedMap::new(),
            limits,
        }
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    pub fn lookup(&self, key: &Question) -> Option<CachedAnswer> {
        self.lookup_at(key, Instant::now())
    }

    pub fn lookup_at(&self, key: &Question, now: Instant) -> Option<CachedAnswer> {
        {
            let shard = self.entries.read(key);
            let entry = shard.get(key)?;
            if now < entry.expires_at {
                let ttl = remaining_secs(entry.expires_at, now);
                let mut data = entry.data.clone();
                for record in data.records_mut() {
                    record.ttl = ttl;
                }
                return Some(CachedAnswer {
                    data,
                    security: entry.security.clone(),
                    ttl,
                });
            }
        }

        let mut shard = self.entries.write(key);
        if shard.get(key).is_some_and(|e| now >= e.expires_at) {
            trace!(%key, "expired cache entry removed");
            shard.remove(key);
        }
        None
    }

    /// Store (replacing) the entry for `key`. The TTL is clamped to the
    /// configured bounds; nothing is stored when it clamps to zero.
    pub fn store(&self, key: Question, data: CachedData, ttl: u32, security: Security) {
        self.store_at(key, data, ttl, security, Instant::now())
    }

    pub fn store_at(
        &self,
        key: Question,
        data: CachedData,
        ttl: u32,
        security: Security,
        now: Instant,
    ) {
        let ttl = self.effective_ttl(&data, ttl, &security);
        if ttl == 0 {
            return;
        }

        let index = self.entries.shard_index(&key);
        let is_new = !self.entries.read_shard(index).contains_key(&key);
        if is_new && self.entries.len() >= self.limits.max_entries {
            self.make_room(index, now);
        }

        self.entries.write_shard(index).insert(
            key,
            CacheEntry {
                data,
                security,
                expires_at: now + Duration::from_secs(ttl as u64),
            },
        );
    }

    fn effective_ttl(&self, data: &CachedData, ttl: u32, security: &Security) -> u32 {
        let ttl = if data.is_negative() {
            ttl.min(self.limits.max_negative_ttl)
        } else {
            ttl.clamp(self.limits.min_ttl, self.limits.max_ttl.max(self.limits.min_ttl))
        };
        if security.is_bogus() {
            ttl.min(BOGUS_TTL)
        } else {
            ttl
        }
    }

    fn make_room(&self, preferred: usize, now: Instant) {
        let swept = self.sweep_at(now);
        if swept > 0 && self.entries.len() < self.limits.max_entries {
            return;
        }
        let count = self.entries.shard_count();
        for offset in 0..count {
            let mut shard = self.entries.write_shard((preferred + offset) % count);
            let victim = shard.keys().next().cloned();
            if let Some(victim) = victim {
                debug!(key = %victim, "cache full, evicting");
                shard.remove(&victim);
                return;
            }
        }
    }

    pub fn invalidate(&self, key: &Question) {
        self.entries.write(key).remove(key);
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        self.entries.retain(|_, entry| now < entry.expires_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(CacheLimits::default())
    }
}

fn remaining_secs(expires_at: Instant, now: Instant) -> u32 {
    let left = expires_at.saturating_duration_since(now);
    // Round up so a live entry never reports a zero TTL.
    (left.as_secs() + u64::from(left.subsec_nanos() > 0)).min(u32::MAX as u64) as u32
}

/// Periodically sweep `cache` until it is dropped.
pub fn spawn_sweeper(cache: &Arc<Cache>, period: Duration) -> tokio::task::JoinHandle<()> {
    let weak: Weak<Cache> = Arc::downgrade(cache);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let Some(cache) = weak.upgrade() else {
                return;
            };
            let removed = cache.sweep();
            if removed > 0 {
                debug!(removed, remaining = cache.len(), "cache sweep");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{RData, class, rtype};
    use std::net::Ipv4Addr;

    fn key(name: &str) -> Question {
        Question::new(name.parse().unwrap(), rtype::A, class::IN)
    }

    fn a_set(name: &str, ttl: u32) -> CachedData {
        CachedData::Positive(RecordSet::new(
            vec![Record::from_data(
                name.parse().unwrap(),
                class::IN,
                ttl,
                &RData::A(Ipv4Addr::new(192, 0, 2, 1)),
            )],
            Vec::new(),
        ))
    }

    #[test]
    fn entry_is_never_served_past_expiry() {
        let cache = Cache::default();
        let now = Instant::now();
        cache.store_at(key("example.com"), a_set("example.com", 300), 300, Security::Secure, now);

        let hit = cache.lookup_at(&key("example.com"), now + Duration::from_secs(100)).unwrap();
        assert_eq!(hit.ttl, 200);
        assert_eq!(hit.security, Security::Secure);
        match hit.data {
            CachedData::Positive(set) => assert_eq!(set.records[0].ttl, 200),
            other => panic!("unexpected {other:?}"),
        }

        assert!(cache.lookup_at(&key("example.com"), now + Duration::from_secs(300)).is_none());
        // The expired entry was removed lazily.
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn store_replaces_existing_entry() {
        let cache = Cache::default();
        let now = Instant::now();
        cache.store_at(key("a.example"), a_set("a.example", 60), 60, Security::Insecure, now);
        cache.store_at(key("a.example"), a_set("a.example", 90), 90, Security::Secure, now);
        let hit = cache.lookup_at(&key("a.example"), now).unwrap();
        assert_eq!(hit.ttl, 90);
        assert_eq!(hit.security, Security::Secure);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn ttl_is_clamped_to_limits() {
        let cache = Cache::new(CacheLimits {
            min_ttl: 30,
            max_ttl: 600,
            max_negative_ttl: 120,
            max_entries: 10,
        });
        let now = Instant::now();
        cache.store_at(key("low.example"), a_set("low.example", 5), 5, Security::Insecure, now);
        cache.store_at(key("high.example"), a_set("high.example", 9999), 9999, Security::Insecure, now);
        cache.store_at(
            key("neg.example"),
            CachedData::Negative {
                nxdomain: true,
                authority: Vec::new(),
            },
            3600,
            Security::Insecure,
            now,
        );
        assert_eq!(cache.lookup_at(&key("low.example"), now).unwrap().ttl, 30);
        assert_eq!(cache.lookup_at(&key("high.example"), now).unwrap().ttl, 600);
        assert_eq!(cache.lookup_at(&key("neg.example"), now).unwrap().ttl, 120);
    }

    #[test]
    fn bogus_entries_are_short_lived() {
        let cache = Cache::default();
        let now = Instant::now();
        let bogus = Security::Bogus("signature expired for example.com.".to_string());
        cache.store_at(key("example.com"), a_set("example.com", 3600), 3600, bogus, now);
        assert_eq!(cache.lookup_at(&key("example.com"), now).unwrap().ttl, BOGUS_TTL);
    }

    #[test]
    fn zero_ttl_is_not_stored() {
        let cache = Cache::default();
        cache.store(key("example.com"), a_set("example.com", 0), 0, Security::Insecure);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_and_sweep() {
        let cache = Cache::default();
        let now = Instant::now();
        cache.store_at(key("a.example"), a_set("a.example", 10), 10, Security::Insecure, now);
        cache.store_at(key("b.example"), a_set("b.example", 100), 100, Security::Insecure, now);
        cache.store_at(key("c.example"), a_set("c.example", 100), 100, Security::Insecure, now);

        cache.invalidate(&key("c.example"));
        assert!(cache.lookup_at(&key("c.example"), now).is_none());

        assert_eq!(cache.sweep_at(now + Duration::from_secs(50)), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn entry_bound_is_enforced() {
        let cache = Cache::new(CacheLimits {
            max_entries: 4,
            ..CacheLimits::default()
        });
        let now = Instant::now();
        for i in 0..10 {
            let name = format!("host{i}.example");
            cache.store_at(key(&name), a_set(&name, 300), 300, Security::Insecure, now);
        }
        assert_eq!(cache.len(), 4);
        // The newest entry always makes it in.
        assert!(cache.lookup_at(&key("host9.example"), now).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_stops_with_cache() {
        let cache = Arc::new(Cache::default());
        let task = spawn_sweeper(&cache, Duration::from_secs(1));
        drop(cache);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(task.is_finished());
    }
}
