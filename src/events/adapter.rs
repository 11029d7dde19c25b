//! Event source adapter: raw lifecycle notifications → `ProcessEvent`.
//!
//! Invoked by the notification facility on whatever thread observed the
//! process. Never blocks: the only thing it does with a creation is a single
//! `deliver` on the rendezvous slot.

use std::sync::{Arc, Weak};

use crate::events::{ImageName, ProcessEvent};
use crate::kernel::slot::{Delivery, RendezvousSlot};
use crate::types::ProcessId;

/// Raw notification as reported by an event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessNotification {
    Created {
        process_id: ProcessId,
        parent_process_id: ProcessId,
        /// Executable path, if the facility reported one.
        image_path: Option<String>,
    },
    Exited {
        process_id: ProcessId,
    },
}

/// Thread-safe producer handle bound to one rendezvous slot.
#[derive(Debug)]
pub struct EventSourceAdapter {
    slot: Weak<RendezvousSlot>,
}

impl EventSourceAdapter {
    pub fn new(slot: &Arc<RendezvousSlot>) -> Self {
        Self {
            slot: Arc::downgrade(slot),
        }
    }

    /// Handle one notification. Returns the delivery outcome for creations,
    /// `None` for exits.
    pub fn on_notification(&self, notification: ProcessNotification) -> Option<Delivery> {
        match notification {
            ProcessNotification::Created {
                process_id,
                parent_process_id,
                image_path,
            } => Some(self.on_process_created(
                process_id,
                parent_process_id,
                image_path.as_deref(),
            )),
            ProcessNotification::Exited { process_id } => {
                tracing::trace!(%process_id, "process exit ignored");
                None
            }
        }
    }

    /// Normalize a creation and make exactly one delivery attempt.
    pub fn on_process_created(
        &self,
        process_id: ProcessId,
        parent_process_id: ProcessId,
        image_path: Option<&str>,
    ) -> Delivery {
        let image_name = image_path.map(ImageName::from_path).unwrap_or_default();
        let event = ProcessEvent {
            process_id,
            parent_process_id,
            image_name,
        };

        match self.slot.upgrade() {
            Some(slot) => slot.deliver(event),
            None => {
                tracing::trace!(%process_id, "rendezvous slot released; event discarded");
                Delivery::Dropped
            }
        }
    }
}
