/*!
 * Object Tag Registry
 * Runtime kind tags for live handles plus per-kind debug name counters
 */

use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

// ============================================================================
// Tags and keys
// ============================================================================

/// Native host primitive backing a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectTag {
    Mutex,
    Semaphore,
    MessageQueue,
    Event,
    Timer,
    Thread,
}

impl ObjectTag {
    /// Prefix used for generated debug names
    pub const fn name_prefix(self) -> &'static str {
        match self {
            ObjectTag::Mutex => "mutex",
            ObjectTag::Semaphore => "sem",
            ObjectTag::MessageQueue => "mq",
            ObjectTag::Event => "event",
            ObjectTag::Timer => "timer",
            ObjectTag::Thread => "thread",
        }
    }

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ObjectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name_prefix())
    }
}

/// Stable address of a shim object, valid while any handle to it exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKey(usize);

impl ObjectKey {
    #[inline]
    pub fn of<T>(object: &T) -> Self {
        Self(object as *const T as usize)
    }

    #[inline]
    pub fn addr(self) -> usize {
        self.0
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Live-object counts per tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub mutexes: usize,
    pub semaphores: usize,
    pub message_queues: usize,
    pub events: usize,
    pub timers: usize,
    pub threads: usize,
}

/// Tag table keyed by object address
///
/// Tags are written once at creation and removed exactly once at delete;
/// removing an absent key is a double delete and panics.
pub struct ObjectRegistry {
    live: DashMap<ObjectKey, ObjectTag, RandomState>,
    counters: [AtomicU32; 6],
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            live: DashMap::with_hasher(RandomState::new()),
            counters: Default::default(),
        }
    }

    /// Next debug name for `tag`, e.g. "mutex_0", "sem_3"
    pub fn next_name(&self, tag: ObjectTag) -> String {
        let n = self.counters[tag.index()].fetch_add(1, Ordering::Relaxed);
        format!("{}_{}", tag.name_prefix(), n)
    }

    pub fn register(&self, key: ObjectKey, tag: ObjectTag) {
        if let Some(stale) = self.live.insert(key, tag) {
            // Previous owner of this address was dropped without delete
            tracing::debug!(addr = key.addr(), %stale, %tag, "replacing stale registry entry");
        }
    }

    #[inline]
    pub fn tag_of(&self, key: ObjectKey) -> Option<ObjectTag> {
        self.live.get(&key).map(|entry| *entry)
    }

    #[inline]
    pub fn is_live(&self, key: ObjectKey) -> bool {
        self.live.contains_key(&key)
    }

    /// Remove the tag of a deleted object
    ///
    /// # Panics
    ///
    /// On double delete, or when the stored tag differs from `expected`.
    pub fn retire(&self, key: ObjectKey, expected: ObjectTag) {
        match self.live.remove(&key) {
            Some((_, tag)) => assert_eq!(
                tag, expected,
                "object at {:#x} deleted as {} but registered as {}",
                key.addr(), expected, tag
            ),
            None => panic!(
                "double delete of {} object at {:#x}",
                expected,
                key.addr()
            ),
        }
    }

    /// Drop a tag without the double-delete check (handle dropped without delete)
    pub(crate) fn forget(&self, key: ObjectKey) {
        self.live.remove(&key);
    }

    pub fn live_count(&self, tag: ObjectTag) -> usize {
        self.live.iter().filter(|entry| *entry.value() == tag).count()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut counts = [0usize; 6];
        for entry in self.live.iter() {
            counts[entry.value().index()] += 1;
        }
        let [mutexes, semaphores, message_queues, events, timers, threads] = counts;
        RegistryStats {
            mutexes,
            semaphores,
            message_queues,
            events,
            timers,
            threads,
        }
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_count_per_kind() {
        let registry = ObjectRegistry::new();
        assert_eq!(registry.next_name(ObjectTag::Mutex), "mutex_0");
        assert_eq!(registry.next_name(ObjectTag::Mutex), "mutex_1");
        assert_eq!(registry.next_name(ObjectTag::Semaphore), "sem_0");
        assert_eq!(registry.next_name(ObjectTag::MessageQueue), "mq_0");
    }

    #[test]
    fn test_register_and_retire() {
        let registry = ObjectRegistry::new();
        let value = 7u64;
        let key = ObjectKey::of(&value);
        registry.register(key, ObjectTag::Event);
        assert_eq!(registry.tag_of(key), Some(ObjectTag::Event));
        assert_eq!(registry.stats().events, 1);
        registry.retire(key, ObjectTag::Event);
        assert!(!registry.is_live(key));
    }

    #[test]
    #[should_panic(expected = "double delete")]
    fn test_double_retire_panics() {
        let registry = ObjectRegistry::new();
        let value = 1u8;
        let key = ObjectKey::of(&value);
        registry.register(key, ObjectTag::Timer);
        registry.retire(key, ObjectTag::Timer);
        registry.retire(key, ObjectTag::Timer);
    }

    #[test]
    #[should_panic(expected = "registered as")]
    fn test_retire_wrong_kind_panics() {
        let registry = ObjectRegistry::new();
        let value = 1u8;
        let key = ObjectKey::of(&value);
        registry.register(key, ObjectTag::Mutex);
        registry.retire(key, ObjectTag::Semaphore);
    }
}
