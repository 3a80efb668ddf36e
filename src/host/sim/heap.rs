/*!
 * Tracked Heap
 * Host heap with live-block accounting and an optional capacity limit
 */

use crate::host::types::HeapBlock;
use ahash::RandomState;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

/// Heap usage snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeapStats {
    pub live_blocks: usize,
    pub bytes_in_use: usize,
    pub peak_bytes: usize,
    pub allocations: u64,
    pub frees: u64,
    pub failed: u64,
}

#[derive(Debug)]
struct Ledger {
    live: HashMap<u64, usize, RandomState>,
    next_id: u64,
    stats: HeapStats,
}

#[derive(Debug)]
pub(super) struct SimHeap {
    capacity: Option<usize>,
    ledger: Mutex<Ledger>,
}

impl SimHeap {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            ledger: Mutex::new(Ledger {
                live: HashMap::with_hasher(RandomState::new()),
                next_id: 1,
                stats: HeapStats::default(),
            }),
        }
    }

    pub fn alloc(&self, size: usize) -> Option<HeapBlock> {
        let mut ledger = self.ledger.lock();
        let in_use = ledger.stats.bytes_in_use;
        if self.capacity.is_some_and(|cap| in_use + size > cap) {
            ledger.stats.failed += 1;
            tracing::debug!(size, in_use, "heap exhausted");
            return None;
        }

        let id = ledger.next_id;
        ledger.next_id += 1;
        ledger.live.insert(id, size);

        let stats = &mut ledger.stats;
        stats.live_blocks += 1;
        stats.bytes_in_use += size;
        stats.allocations += 1;
        if stats.bytes_in_use > stats.peak_bytes {
            stats.peak_bytes = stats.bytes_in_use;
        }
        Some(HeapBlock::new(id, size))
    }

    /// # Panics
    ///
    /// When `block` was already freed or never came from this heap.
    pub fn free(&self, block: HeapBlock) {
        let mut ledger = self.ledger.lock();
        let Some(size) = ledger.live.remove(&block.id()) else {
            drop(ledger);
            panic!("heap block {} freed twice or foreign", block.id());
        };
        let stats = &mut ledger.stats;
        stats.live_blocks -= 1;
        stats.bytes_in_use -= size;
        stats.frees += 1;
    }

    pub fn stats(&self) -> HeapStats {
        self.ledger.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_free_accounting() {
        let heap = SimHeap::new(None);
        let a = heap.alloc(100).unwrap();
        let b = heap.alloc(50).unwrap();
        assert_eq!(heap.stats().bytes_in_use, 150);
        heap.free(a);
        let stats = heap.stats();
        assert_eq!(stats.live_blocks, 1);
        assert_eq!(stats.bytes_in_use, 50);
        assert_eq!(stats.peak_bytes, 150);
        heap.free(b);
        assert_eq!(heap.stats().frees, 2);
    }

    #[test]
    fn test_capacity_limit() {
        let heap = SimHeap::new(Some(64));
        let a = heap.alloc(60).unwrap();
        assert!(heap.alloc(8).is_none());
        assert_eq!(heap.stats().failed, 1);
        heap.free(a);
        assert!(heap.alloc(8).is_some());
    }

    #[test]
    #[should_panic(expected = "freed twice")]
    fn test_foreign_block_panics() {
        let heap = SimHeap::new(None);
        heap.free(HeapBlock::new(999, 4));
    }
}
