//! Request gateway: the consumer-facing wait for the next process event.

use std::sync::{Arc, Weak};

use crate::events::ProcessEvent;
use crate::kernel::slot::{Registration, RelayStats, RendezvousSlot, WaitHandle};
use crate::types::{Error, Result};

/// Consumer entry point bound to one running rendezvous slot.
///
/// Holds only a weak reference: once the lifecycle manager releases the slot,
/// every call returns [`Error::Cancelled`]. A default gateway is bound to
/// nothing.
#[derive(Debug, Clone, Default)]
pub struct RequestGateway {
    slot: Weak<RendezvousSlot>,
}

impl RequestGateway {
    pub fn new(slot: &Arc<RendezvousSlot>) -> Self {
        Self {
            slot: Arc::downgrade(slot),
        }
    }

    /// Register against the slot without waiting.
    ///
    /// Fails immediately with `AlreadyPending` if another call is outstanding.
    pub fn begin_wait(&self) -> Result<WaitHandle> {
        let slot = self
            .slot
            .upgrade()
            .ok_or_else(|| Error::cancelled("relay is not running"))?;

        match slot.try_register() {
            Registration::Registered(handle) => Ok(handle),
            Registration::Busy => Err(Error::already_pending(
                "a GetNextProcessEvent call is already outstanding",
            )),
        }
    }

    /// Wait for the next process creation event.
    ///
    /// No timeout: the call stays suspended until an event arrives or the
    /// relay shuts down.
    pub async fn wait_for_next_process_event(&self) -> Result<ProcessEvent> {
        self.begin_wait()?.wait().await
    }

    /// Blocking variant for plain threads.
    pub fn wait_for_next_process_event_blocking(&self) -> Result<ProcessEvent> {
        self.begin_wait()?.wait_blocking()
    }

    /// Whether the slot this gateway was bound to is still alive.
    pub fn is_attached(&self) -> bool {
        self.slot.strong_count() > 0
    }

    pub fn stats(&self) -> Option<RelayStats> {
        self.slot.upgrade().map(|slot| slot.stats())
    }
}
