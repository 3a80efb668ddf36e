/*!
 * Control Block Bookkeeping
 * Heap reservations that back dynamically allocated shim objects
 */

use super::errors::{ShimError, ShimResult};
use super::types::AllocationMode;
use crate::host::{HeapBlock, HostKernel, Region};

/// Memory standing in for an object's control block
#[derive(Debug)]
pub(crate) enum ControlBlock {
    /// Caller-provided; nothing to release
    Static,
    /// Reserved from the host heap
    Dynamic(HeapBlock),
}

impl ControlBlock {
    /// Reserve `size` bytes when `mode` is Dynamic
    pub(crate) fn reserve<H: HostKernel + ?Sized>(
        host: &H,
        mode: AllocationMode,
        size: usize,
    ) -> ShimResult<Self> {
        match mode {
            AllocationMode::Static => Ok(ControlBlock::Static),
            AllocationMode::Dynamic => host
                .heap_alloc(size)
                .map(ControlBlock::Dynamic)
                .ok_or_else(|| {
                    tracing::warn!(size, "control block allocation failed");
                    ShimError::Allocation
                }),
        }
    }

    pub(crate) fn release<H: HostKernel + ?Sized>(self, host: &H) {
        if let ControlBlock::Dynamic(block) = self {
            host.heap_free(block);
        }
    }
}

/// Hand a stack or pool back to the heap it came from; caller storage is left alone
pub(crate) fn release_region<H: HostKernel + ?Sized>(host: &H, region: Region) {
    if let Region::Heap(block) = region {
        host.heap_free(block);
    }
}

/// Reserve a heap region of `size` bytes
pub(crate) fn reserve_region<H: HostKernel + ?Sized>(host: &H, size: usize) -> Option<Region> {
    host.heap_alloc(size).map(Region::Heap)
}
