/*!
 * Synchronization Objects
 *
 * Queues, mutexes and semaphores share one handle type and one
 * send/receive vocabulary, dispatching on the backing host primitive.
 */

mod isr;
pub(crate) mod object;
mod semaphore;
pub mod types;

pub use object::{Queue, SyncObject};
pub use types::{CopyPosition, QueueType, SyncKind};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ShimError;
    use crate::core::types::{AllocationMode, NO_WAIT};
    use crate::host::{SimConfig, SimKernel};
    use crate::shim::Shim;

    fn shim() -> (std::sync::Arc<SimKernel>, Shim<SimKernel>) {
        let kernel = SimKernel::new(SimConfig::default());
        (kernel.clone(), Shim::with_defaults(kernel))
    }

    #[test]
    fn test_queue_fifo_and_front() {
        let (_k, shim) = shim();
        let q = shim.queue_create(3, 2).unwrap();
        q.send_to_back(&[1, 1], NO_WAIT).unwrap();
        q.send_to_back(&[2, 2], NO_WAIT).unwrap();
        q.send_to_front(&[0, 0], NO_WAIT).unwrap();

        let mut buf = [0u8; 2];
        for expected in [[0, 0], [1, 1], [2, 2]] {
            q.receive(&mut buf, NO_WAIT).unwrap();
            assert_eq!(buf, expected);
        }
        assert_eq!(q.receive(&mut buf, NO_WAIT), Err(ShimError::Empty));
    }

    #[test]
    fn test_overwrite_replaces_item() {
        let (_k, shim) = shim();
        let mailbox = shim.queue_create(1, 4).unwrap();
        mailbox.overwrite(&7u32.to_le_bytes()).unwrap();
        mailbox.overwrite(&9u32.to_le_bytes()).unwrap();
        assert_eq!(mailbox.query_count(), 1);
        let mut buf = [0u8; 4];
        mailbox.receive(&mut buf, NO_WAIT).unwrap();
        assert_eq!(u32::from_le_bytes(buf), 9);
    }

    #[test]
    fn test_kind_specific_rejections() {
        let (_k, shim) = shim();
        let m = shim.mutex_create().unwrap();
        assert!(matches!(m.reset(), Err(ShimError::NotSupported(_))));
        let sem = shim.counting_semaphore_create(4, 0).unwrap();
        assert!(matches!(
            sem.send(&[], NO_WAIT, CopyPosition::Front),
            Err(ShimError::NotSupported(_))
        ));
        assert!(matches!(
            m.send(&[], NO_WAIT, CopyPosition::Overwrite),
            Err(ShimError::NotSupported(_))
        ));
    }

    #[test]
    fn test_reset_semaphore_and_queue() {
        let (_k, shim) = shim();
        let sem = shim.counting_semaphore_create(4, 3).unwrap();
        sem.reset().unwrap();
        assert_eq!(sem.query_count(), 0);

        let q = shim.queue_create(2, 1).unwrap();
        q.send_to_back(&[1], NO_WAIT).unwrap();
        q.reset().unwrap();
        assert_eq!(q.query_count(), 0);
        assert_eq!(q.spaces_available(), 2);
    }

    #[test]
    fn test_names_and_registry() {
        let (_k, shim) = shim();
        let m = shim.mutex_create().unwrap();
        let s = shim.binary_semaphore_create().unwrap();
        let q = shim.queue_create(1, 1).unwrap();
        assert_eq!(m.name(), "mutex_0");
        assert_eq!(s.name(), "sem_0");
        assert_eq!(q.name(), "mq_0");
        assert_eq!(shim.registry_stats().message_queues, 1);
        q.delete();
        assert_eq!(shim.registry_stats().message_queues, 0);
    }

    #[test]
    fn test_dynamic_queue_releases_heap() {
        let (kernel, shim) = shim();
        let q = shim.queue_create(4, 8).unwrap();
        // Control block and message pool
        assert_eq!(kernel.heap_stats().live_blocks, 2);
        q.delete();
        assert_eq!(kernel.heap_stats().live_blocks, 0);
    }

    #[test]
    fn test_static_queue_uses_caller_storage() {
        let (kernel, shim) = shim();
        let storage: &'static mut [u8] = Box::leak(vec![0u8; 16].into_boxed_slice());
        let q = shim.queue_create_static(4, 4, storage).unwrap();
        assert_eq!(q.allocation_mode(), AllocationMode::Static);
        assert_eq!(kernel.heap_stats().allocations, 0);
        q.send_to_back(&[1, 2, 3, 4], NO_WAIT).unwrap();
        q.delete();
        assert_eq!(kernel.heap_stats().frees, 0);
    }

    #[test]
    fn test_allocation_failure() {
        let kernel = SimKernel::new(SimConfig::with_heap_capacity(64));
        let shim = Shim::with_defaults(kernel);
        assert_eq!(shim.queue_create(100, 100).unwrap_err(), ShimError::Allocation);
    }

    #[test]
    #[should_panic(expected = "double delete")]
    fn test_double_delete_panics() {
        let (_k, shim) = shim();
        let q = shim.binary_semaphore_create().unwrap();
        let alias = q.clone();
        q.delete();
        alias.delete();
    }

    #[test]
    fn test_generic_create_types() {
        let (_k, shim) = shim();
        let counting = shim
            .queue_generic_create(5, 0, QueueType::CountingSemaphore)
            .unwrap();
        assert_eq!(counting.kind(), SyncKind::CountingSemaphore);
        assert_eq!(counting.max_count(), Some(5));
        let q = shim.queue_generic_create(2, 3, QueueType::Base).unwrap();
        assert_eq!(q.capacity(), Some(2));
        assert_eq!(q.item_size(), Some(3));
    }
}
