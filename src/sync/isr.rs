/*!
 * Interrupt-Safe Queue Entry Points
 *
 * Same implementation as the task-level calls with a zero timeout. The
 * wake hint is always cleared: the host reschedules on interrupt exit.
 */

use super::object::{Backing, Queue};
use super::types::CopyPosition;
use crate::core::errors::ShimResult;
use crate::core::types::{report_no_yield, NO_WAIT};
use crate::host::HostKernel;
use crate::task::TaskHandle;

impl<H: HostKernel> Queue<H> {
    pub fn send_from_isr(
        &self,
        item: &[u8],
        position: CopyPosition,
        woken: Option<&mut bool>,
    ) -> ShimResult<()> {
        report_no_yield(woken);
        self.send(item, NO_WAIT, position)
    }

    pub fn receive_from_isr(&self, buf: &mut [u8], woken: Option<&mut bool>) -> ShimResult<()> {
        report_no_yield(woken);
        self.receive(buf, NO_WAIT)
    }

    pub fn give_from_isr(&self, woken: Option<&mut bool>) -> ShimResult<()> {
        report_no_yield(woken);
        self.give()
    }

    pub fn take_from_isr(&self, woken: Option<&mut bool>) -> ShimResult<()> {
        report_no_yield(woken);
        self.take(NO_WAIT)
    }

    pub fn peek_from_isr(&self, buf: &mut [u8]) -> ShimResult<()> {
        self.peek(buf, NO_WAIT)
    }

    pub fn messages_waiting_from_isr(&self) -> u32 {
        self.query_count()
    }

    /// # Panics
    ///
    /// When the handle is not a message queue.
    pub fn is_empty_from_isr(&self) -> bool {
        self.assert_message_queue("is_empty_from_isr");
        self.query_count() == 0
    }

    /// # Panics
    ///
    /// When the handle is not a message queue.
    pub fn is_full_from_isr(&self) -> bool {
        self.assert_message_queue("is_full_from_isr");
        self.spaces_available() == 0
    }

    pub fn mutex_holder_from_isr(&self) -> Option<TaskHandle<H>> {
        self.mutex_holder()
    }

    fn assert_message_queue(&self, op: &str) {
        assert!(
            matches!(self.0.backing, Backing::MessageQueue { .. }),
            "{op} on {} {}",
            self.kind(),
            self.name()
        );
    }
}
