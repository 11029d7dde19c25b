//! In-memory notification source.

use std::sync::{Arc, PoisonError, RwLock};

use crate::events::{EventSourceAdapter, ProcessNotification};
use crate::kernel::slot::Delivery;
use crate::source::ProcessNotifier;
use crate::types::{Error, ProcessId, Result};

/// Source whose notifications are injected with [`ManualNotifier::emit`].
///
/// Emitters share a read lock for the duration of the callback, so
/// `unsubscribe` waits for in-flight callbacks before returning.
#[derive(Debug, Default)]
pub struct ManualNotifier {
    adapter: RwLock<Option<Arc<EventSourceAdapter>>>,
}

impl ManualNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a notification. Returns `None` when nothing is subscribed or
    /// the notification is an exit.
    pub fn emit(&self, notification: ProcessNotification) -> Option<Delivery> {
        let adapter = self.adapter.read().unwrap_or_else(PoisonError::into_inner);
        adapter.as_ref()?.on_notification(notification)
    }

    /// Shorthand for emitting a creation.
    pub fn emit_created(
        &self,
        process_id: u64,
        parent_process_id: u64,
        image_path: Option<&str>,
    ) -> Option<Delivery> {
        self.emit(ProcessNotification::Created {
            process_id: ProcessId::new(process_id),
            parent_process_id: ProcessId::new(parent_process_id),
            image_path: image_path.map(str::to_string),
        })
    }

    pub fn is_subscribed(&self) -> bool {
        self.adapter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl ProcessNotifier for ManualNotifier {
    fn subscribe(&self, adapter: Arc<EventSourceAdapter>) -> Result<()> {
        let mut current = self.adapter.write().unwrap_or_else(PoisonError::into_inner);
        if current.is_some() {
            return Err(Error::state_transition("manual notifier already subscribed"));
        }
        *current = Some(adapter);
        Ok(())
    }

    fn unsubscribe(&self) -> Result<()> {
        self.adapter
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}
