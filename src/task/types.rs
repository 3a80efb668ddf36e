/*!
 * Task Types
 * Creation parameters and the task state vocabulary of the emulated API
 */

use crate::core::types::{Affinity, Priority};
use crate::host::ThreadState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default stack size in bytes
pub const DEFAULT_STACK_DEPTH: usize = 4096;

/// Default task priority (one above idle)
pub const DEFAULT_PRIORITY: Priority = 1;

/// Task entry point
pub type TaskEntry = Box<dyn FnOnce() + Send + 'static>;

/// Task state as reported by the emulated API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Running,
    Ready,
    Blocked,
    Suspended,
    Deleted,
    /// Host thread ended without the task being deleted
    Invalid,
}

impl TaskState {
    pub(crate) fn from_thread(state: ThreadState) -> Self {
        match state {
            ThreadState::Running => TaskState::Running,
            ThreadState::Init | ThreadState::Ready => TaskState::Ready,
            ThreadState::Blocked => TaskState::Blocked,
            ThreadState::Suspended => TaskState::Suspended,
            ThreadState::Closed => TaskState::Invalid,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Running => "running",
            TaskState::Ready => "ready",
            TaskState::Blocked => "blocked",
            TaskState::Suspended => "suspended",
            TaskState::Deleted => "deleted",
            TaskState::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// Task creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSpec {
    pub name: String,
    /// Stack size in bytes
    pub stack_depth: usize,
    pub priority: Priority,
    pub affinity: Affinity,
}

impl Default for TaskSpec {
    fn default() -> Self {
        Self {
            name: String::from("task"),
            stack_depth: DEFAULT_STACK_DEPTH,
            priority: DEFAULT_PRIORITY,
            affinity: Affinity::NoAffinity,
        }
    }
}

impl TaskSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_stack_depth(mut self, bytes: usize) -> Self {
        self.stack_depth = bytes;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn pinned_to(mut self, core: usize) -> Self {
        self.affinity = Affinity::Core(core);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builder() {
        let spec = TaskSpec::new("worker").with_priority(3).pinned_to(1);
        assert_eq!(spec.name, "worker");
        assert_eq!(spec.priority, 3);
        assert_eq!(spec.stack_depth, DEFAULT_STACK_DEPTH);
        assert_eq!(spec.affinity, Affinity::Core(1));
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(TaskState::from_thread(ThreadState::Init), TaskState::Ready);
        assert_eq!(TaskState::from_thread(ThreadState::Closed), TaskState::Invalid);
        assert_eq!(TaskState::Suspended.to_string(), "suspended");
    }

    #[test]
    fn test_spec_from_json_defaults() {
        let spec: TaskSpec = serde_json::from_str(r#"{"name":"net","priority":5}"#).unwrap();
        assert_eq!(spec.stack_depth, DEFAULT_STACK_DEPTH);
        assert_eq!(spec.priority, 5);
    }
}
