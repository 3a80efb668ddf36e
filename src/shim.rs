/*!
 * Shim Context
 *
 * `Shim` is the constructor surface of the emulated API. Every object handle
 * keeps an `Arc` of the shared context: the host kernel, the tag registry,
 * the configuration, scheduler state and the task table.
 */

use crate::core::{ObjectRegistry, RegistryStats, ShimConfig};
use crate::host::{CriticalSection, HostKernel};
use crate::scheduler::types::SchedulerCell;
use crate::task::TaskHandle;
use ahash::RandomState;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

pub(crate) struct ShimCore<H: HostKernel> {
    pub(crate) host: Arc<H>,
    pub(crate) config: ShimConfig,
    pub(crate) registry: ObjectRegistry,
    pub(crate) scheduler: SchedulerCell,
    /// Shim tasks by host thread id
    pub(crate) tasks: DashMap<H::ThreadId, TaskHandle<H>, RandomState>,
}

impl<H: HostKernel> ShimCore<H> {
    #[inline]
    pub(crate) fn critical(&self) -> CriticalSection<'_, H> {
        CriticalSection::enter(&*self.host)
    }

    /// Task running on the calling host thread
    pub(crate) fn current_task(&self) -> Option<TaskHandle<H>> {
        if !self.scheduler.is_running() {
            return None;
        }
        let id = self.host.thread_self();
        self.tasks.get(&id).map(|entry| entry.value().clone())
    }

    pub(crate) fn task_of(&self, id: &H::ThreadId) -> Option<TaskHandle<H>> {
        self.tasks.get(id).map(|entry| entry.value().clone())
    }
}

/// Emulated RTOS API bound to one host kernel
pub struct Shim<H: HostKernel> {
    pub(crate) core: Arc<ShimCore<H>>,
}

impl<H: HostKernel> Shim<H> {
    pub fn new(host: Arc<H>, config: ShimConfig) -> Self {
        tracing::debug!(
            notification_entries = config.notification_array_entries,
            max_priorities = config.max_priorities,
            "shim created"
        );
        Self {
            core: Arc::new(ShimCore {
                host,
                config,
                registry: ObjectRegistry::new(),
                scheduler: SchedulerCell::new(),
                tasks: DashMap::with_hasher(RandomState::new()),
            }),
        }
    }

    pub fn with_defaults(host: Arc<H>) -> Self {
        Self::new(host, ShimConfig::default())
    }

    #[inline]
    pub fn host(&self) -> &Arc<H> {
        &self.core.host
    }

    #[inline]
    pub fn config(&self) -> &ShimConfig {
        &self.core.config
    }

    /// Live objects per kind
    pub fn registry_stats(&self) -> RegistryStats {
        self.core.registry.stats()
    }
}

impl<H: HostKernel> Clone for Shim<H> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<H: HostKernel> fmt::Debug for Shim<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shim")
            .field("config", &self.core.config)
            .field("scheduler", &self.core.scheduler.state())
            .field("tasks", &self.core.tasks.len())
            .finish()
    }
}
