use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::types::{Result, TrellisError};

use super::columns::ColumnScope;

const NIL: usize = usize::MAX;

/// Cache key for a chunked column: which entity class it belongs to plus the
/// column name.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct CacheKey {
    pub scope: ColumnScope,
    pub name: String,
}

impl CacheKey {
    pub fn node(name: impl Into<String>) -> Self {
        Self {
            scope: ColumnScope::Node,
            name: name.into(),
        }
    }

    pub fn edge(name: impl Into<String>) -> Self {
        Self {
            scope: ColumnScope::Edge,
            name: name.into(),
        }
    }
}

/// Replacement policy: bound the entry count, or bound the total byte size
/// reported by a user-supplied size function.
#[derive(Copy, Clone, Debug)]
pub enum EvictPolicy {
    Lru { capacity: usize },
    Bytes { capacity: usize },
}

type EvictCallback = dyn Fn(&CacheKey) + Send + Sync;
type SizeFn<V> = dyn Fn(&V) -> usize + Send + Sync;

struct MapEntry<V> {
    value: V,
    slot: usize,
}

/// Capacity-bounded concurrent cache for loaded property columns.
///
/// The key-to-value map is sharded with per-shard locks; recency lives in a
/// slab-backed MRU list behind a single lock. Writers (insert, eviction)
/// touch the map while holding the list lock, so a list node and its map
/// entry are only ever visible together; readers never wait on the list
/// while holding a map shard, which keeps that ordering free of cycles.
/// Eviction pops the LRU tail until the policy is satisfied and fires the
/// callback once per evicted key; under the byte policy the last entry
/// survives even when it alone exceeds the budget.
pub struct PropertyCache<V> {
    map: DashMap<CacheKey, MapEntry<V>>,
    list: Mutex<MruList>,
    policy: EvictPolicy,
    evict_cb: Option<Box<EvictCallback>>,
    size_of: Option<Box<SizeFn<V>>>,
}

impl<V: Clone> PropertyCache<V> {
    pub fn new(
        policy: EvictPolicy,
        evict_cb: Option<Box<EvictCallback>>,
        size_of: Option<Box<SizeFn<V>>>,
    ) -> Result<Self> {
        match policy {
            EvictPolicy::Lru { capacity: 0 } => {
                return Err(TrellisError::InvalidArgument(
                    "count policy requires a non-zero capacity".into(),
                ));
            }
            EvictPolicy::Bytes { capacity: 0 } => {
                return Err(TrellisError::InvalidArgument(
                    "byte policy requires a non-zero capacity".into(),
                ));
            }
            EvictPolicy::Bytes { .. } if size_of.is_none() => {
                return Err(TrellisError::InvalidArgument(
                    "byte policy requires a value size supplier".into(),
                ));
            }
            _ => {}
        }
        Ok(Self {
            map: DashMap::new(),
            list: Mutex::new(MruList::default()),
            policy,
            evict_cb,
            size_of,
        })
    }

    /// Inserts or replaces `key`, making it most recently used, then
    /// enforces the policy.
    pub fn insert(&self, key: CacheKey, value: V) {
        let bytes = self.size_of.as_ref().map_or(0, |f| f(&value));
        {
            // The list node and its map entry become visible together:
            // eviction reads the tail under this same lock, so it can never
            // observe a node whose map entry does not exist yet.
            let mut list = self.list.lock();
            let slot = list.push_front(key.clone(), bytes);
            if let Some(old) = self.map.insert(key.clone(), MapEntry { value, slot }) {
                // Replaced an existing entry: retire its list node.
                if old.slot != slot && list.occupied_with(old.slot, &key) {
                    list.unlink(old.slot);
                }
            }
        }
        self.evict_if_necessary();
    }

    /// Returns a copy of the value, splicing the entry to the MRU end.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let (value, slot) = {
            let entry = self.map.get(key)?;
            (entry.value.clone(), entry.slot)
        };
        let mut list = self.list.lock();
        // A racing eviction may have retired the slot already.
        if list.occupied_with(slot, key) {
            list.move_to_front(slot);
        }
        Some(value)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.list.lock().total_bytes
    }

    pub fn policy(&self) -> EvictPolicy {
        self.policy
    }

    /// Keys from most to least recently used.
    pub fn keys_mru(&self) -> Vec<CacheKey> {
        let list = self.list.lock();
        let mut keys = Vec::with_capacity(list.len);
        let mut slot = list.head;
        while slot != NIL {
            let node = &list.nodes[slot];
            if let Some(key) = &node.key {
                keys.push(key.clone());
            }
            slot = node.next;
        }
        keys
    }

    fn evict_if_necessary(&self) {
        loop {
            let victim = {
                let mut list = self.list.lock();
                let over = match self.policy {
                    EvictPolicy::Lru { capacity } => list.len > capacity,
                    EvictPolicy::Bytes { capacity } => {
                        list.total_bytes > capacity && list.len > 1
                    }
                };
                if !over {
                    break;
                }
                let tail = list.tail;
                debug_assert_ne!(tail, NIL);
                let Some(key) = list.nodes[tail].key.clone() else {
                    break;
                };
                list.unlink(tail);
                // Inserts create the map entry under this same lock, so the
                // tail's entry exists here and carries this slot; the slot
                // guard is defensive. No reader ever waits on the list while
                // holding a map shard, so holding the list lock across the
                // removal cannot deadlock.
                self.map
                    .remove_if(&key, |_, entry| entry.slot == tail)
                    .map(|_| key)
            };
            if let Some(key) = victim {
                debug!(scope = ?key.scope, name = %key.name, "evicting cached column");
                if let Some(cb) = &self.evict_cb {
                    cb(&key);
                }
            }
        }
    }
}

struct ListNode {
    key: Option<CacheKey>,
    bytes: usize,
    prev: usize,
    next: usize,
}

/// Intrusive doubly-linked recency list over a slab. Slot indices are
/// stable across splices, so map entries can keep them without updates.
struct MruList {
    nodes: Vec<ListNode>,
    head: usize,
    tail: usize,
    free: Vec<usize>,
    len: usize,
    total_bytes: usize,
}

impl Default for MruList {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            head: NIL,
            tail: NIL,
            free: Vec::new(),
            len: 0,
            total_bytes: 0,
        }
    }
}

impl MruList {
    fn push_front(&mut self, key: CacheKey, bytes: usize) -> usize {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.nodes.push(ListNode {
                    key: None,
                    bytes: 0,
                    prev: NIL,
                    next: NIL,
                });
                self.nodes.len() - 1
            }
        };
        let head = self.head;
        {
            let node = &mut self.nodes[slot];
            node.key = Some(key);
            node.bytes = bytes;
            node.prev = NIL;
            node.next = head;
        }
        if head != NIL {
            self.nodes[head].prev = slot;
        } else {
            self.tail = slot;
        }
        self.head = slot;
        self.len += 1;
        self.total_bytes += bytes;
        slot
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next, bytes) = {
            let node = &mut self.nodes[slot];
            debug_assert!(node.key.is_some());
            node.key = None;
            (node.prev, node.next, node.bytes)
        };
        self.detach(slot, prev, next);
        self.len -= 1;
        self.total_bytes -= bytes;
        self.free.push(slot);
    }

    fn move_to_front(&mut self, slot: usize) {
        if self.head == slot {
            return;
        }
        let (prev, next) = {
            let node = &self.nodes[slot];
            (node.prev, node.next)
        };
        self.detach(slot, prev, next);
        let head = self.head;
        {
            let node = &mut self.nodes[slot];
            node.prev = NIL;
            node.next = head;
        }
        if head != NIL {
            self.nodes[head].prev = slot;
        } else {
            self.tail = slot;
        }
        self.head = slot;
    }

    fn detach(&mut self, slot: usize, prev: usize, next: usize) {
        if prev != NIL {
            self.nodes[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.nodes[next].prev = prev;
        } else if self.tail == slot {
            self.tail = prev;
        }
    }

    fn occupied_with(&self, slot: usize, key: &CacheKey) -> bool {
        slot < self.nodes.len() && self.nodes[slot].key.as_ref() == Some(key)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn lru(capacity: usize) -> PropertyCache<u64> {
        PropertyCache::new(EvictPolicy::Lru { capacity }, None, None).unwrap()
    }

    #[test]
    fn constructor_validates_policy() {
        assert!(PropertyCache::<u64>::new(EvictPolicy::Lru { capacity: 0 }, None, None).is_err());
        assert!(PropertyCache::<u64>::new(EvictPolicy::Bytes { capacity: 0 }, None, None).is_err());
        assert!(matches!(
            PropertyCache::<u64>::new(EvictPolicy::Bytes { capacity: 10 }, None, None),
            Err(TrellisError::InvalidArgument(_))
        ));
    }

    #[test]
    fn lru_evicts_oldest_after_touch() {
        let evicted: Arc<Mutex<Vec<CacheKey>>> = Arc::new(Mutex::new(Vec::new()));
        let log = evicted.clone();
        let cache: PropertyCache<u64> = PropertyCache::new(
            EvictPolicy::Lru { capacity: 2 },
            Some(Box::new(move |key| log.lock().push(key.clone()))),
            None,
        )
        .unwrap();

        cache.insert(CacheKey::node("k1"), 1);
        cache.insert(CacheKey::node("k2"), 2);
        assert_eq!(cache.get(&CacheKey::node("k1")), Some(1));
        cache.insert(CacheKey::node("k3"), 3);

        assert!(cache.contains(&CacheKey::node("k1")));
        assert!(cache.contains(&CacheKey::node("k3")));
        assert!(!cache.contains(&CacheKey::node("k2")));
        assert_eq!(evicted.lock().as_slice(), &[CacheKey::node("k2")]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn byte_policy_keeps_the_last_entry() {
        let evictions = Arc::new(AtomicUsize::new(0));
        let count = evictions.clone();
        let cache: PropertyCache<Vec<u8>> = PropertyCache::new(
            EvictPolicy::Bytes { capacity: 100 },
            Some(Box::new(move |_| {
                count.fetch_add(1, Ordering::Relaxed);
            })),
            Some(Box::new(|v: &Vec<u8>| v.len())),
        )
        .unwrap();

        cache.insert(CacheKey::edge("k1"), vec![0; 60]);
        cache.insert(CacheKey::edge("k2"), vec![0; 60]);
        // k1 is evicted to get back under budget.
        assert!(!cache.contains(&CacheKey::edge("k1")));
        assert_eq!(cache.bytes(), 60);

        cache.insert(CacheKey::edge("k3"), vec![0; 60]);
        assert!(!cache.contains(&CacheKey::edge("k2")));
        assert!(cache.bytes() <= 100 || cache.len() == 1);
        assert_eq!(evictions.load(Ordering::Relaxed), 2);

        // A single oversized entry is kept.
        cache.insert(CacheKey::edge("huge"), vec![0; 500]);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&CacheKey::edge("huge")));
        assert_eq!(cache.bytes(), 500);
    }

    #[test]
    fn get_splices_to_mru_order() {
        let cache = lru(10);
        cache.insert(CacheKey::node("a"), 1);
        cache.insert(CacheKey::node("b"), 2);
        cache.insert(CacheKey::node("c"), 3);
        assert_eq!(
            cache.keys_mru(),
            vec![CacheKey::node("c"), CacheKey::node("b"), CacheKey::node("a")]
        );

        cache.get(&CacheKey::node("a"));
        cache.get(&CacheKey::node("b"));
        assert_eq!(
            cache.keys_mru(),
            vec![CacheKey::node("b"), CacheKey::node("a"), CacheKey::node("c")]
        );
        assert_eq!(cache.get(&CacheKey::node("missing")), None);
    }

    #[test]
    fn reinserting_a_key_retires_the_old_node() {
        let cache = lru(10);
        cache.insert(CacheKey::node("a"), 1);
        cache.insert(CacheKey::node("b"), 2);
        cache.insert(CacheKey::node("a"), 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.keys_mru(), vec![CacheKey::node("a"), CacheKey::node("b")]);
        assert_eq!(cache.get(&CacheKey::node("a")), Some(10));
    }

    #[test]
    fn byte_accounting_tracks_replacement() {
        let cache: PropertyCache<Vec<u8>> = PropertyCache::new(
            EvictPolicy::Bytes { capacity: 1000 },
            None,
            Some(Box::new(|v: &Vec<u8>| v.len())),
        )
        .unwrap();
        cache.insert(CacheKey::node("a"), vec![0; 100]);
        cache.insert(CacheKey::node("a"), vec![0; 40]);
        assert_eq!(cache.bytes(), 40);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_gets_and_inserts_stay_consistent() {
        let cache = Arc::new(lru(64));
        let mut handles = Vec::new();
        for t in 0..4 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..500u64 {
                    let key = CacheKey::node(format!("k{}", (t * 31 + i) % 100));
                    cache.insert(key.clone(), i);
                    cache.get(&key);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(cache.len() <= 64);
        assert_eq!(cache.keys_mru().len(), cache.len());
    }
}
