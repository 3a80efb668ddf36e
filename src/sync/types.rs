/*!
 * Sync Object Types
 */

use crate::core::registry::ObjectTag;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Host primitive backing a queue handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Mutex,
    CountingSemaphore,
    MessageQueue,
}

impl SyncKind {
    #[inline]
    pub const fn tag(self) -> ObjectTag {
        match self {
            SyncKind::Mutex => ObjectTag::Mutex,
            SyncKind::CountingSemaphore => ObjectTag::Semaphore,
            SyncKind::MessageQueue => ObjectTag::MessageQueue,
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncKind::Mutex => "mutex",
            SyncKind::CountingSemaphore => "counting_semaphore",
            SyncKind::MessageQueue => "message_queue",
        })
    }
}

/// Object type requested through the generic queue constructor
///
/// Numeric values follow the emulated API's `queueQUEUE_TYPE_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum QueueType {
    Base = 0,
    Set = 0x80,
    Mutex = 1,
    CountingSemaphore = 2,
    BinarySemaphore = 3,
    RecursiveMutex = 4,
}

impl QueueType {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(QueueType::Base),
            0x80 => Some(QueueType::Set),
            1 => Some(QueueType::Mutex),
            2 => Some(QueueType::CountingSemaphore),
            3 => Some(QueueType::BinarySemaphore),
            4 => Some(QueueType::RecursiveMutex),
            _ => None,
        }
    }

    /// Host primitive used for this type
    pub const fn kind(self) -> SyncKind {
        match self {
            QueueType::Base | QueueType::Set => SyncKind::MessageQueue,
            QueueType::Mutex | QueueType::RecursiveMutex => SyncKind::Mutex,
            QueueType::CountingSemaphore | QueueType::BinarySemaphore => {
                SyncKind::CountingSemaphore
            }
        }
    }
}

/// Where `send` places the item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyPosition {
    Back = 0,
    Front = 1,
    /// Mailbox semantics on a length-one queue
    Overwrite = 2,
}

impl CopyPosition {
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(CopyPosition::Back),
            1 => Some(CopyPosition::Front),
            2 => Some(CopyPosition::Overwrite),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_type_kind() {
        assert_eq!(QueueType::Base.kind(), SyncKind::MessageQueue);
        assert_eq!(QueueType::RecursiveMutex.kind(), SyncKind::Mutex);
        assert_eq!(QueueType::BinarySemaphore.kind(), SyncKind::CountingSemaphore);
        assert_eq!(QueueType::from_raw(3), Some(QueueType::BinarySemaphore));
        assert_eq!(QueueType::from_raw(9), None);
    }

    #[test]
    fn test_copy_position_raw() {
        assert_eq!(CopyPosition::from_raw(2), Some(CopyPosition::Overwrite));
        assert_eq!(CopyPosition::from_raw(-1), None);
    }
}
