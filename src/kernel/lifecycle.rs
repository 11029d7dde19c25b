//! Relay lifecycle management.
//!
//! Owns the rendezvous slot. Start builds a fresh slot and subscribes an
//! adapter bound to it; stop runs in a fixed order:
//!
//!   1. unsubscribe the source (no new deliveries can start)
//!   2. cancel the outstanding waiter, if any
//!   3. release the slot
//!
//! Cancelling before unsubscribing would let a late event find an empty slot
//! that is about to disappear.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::events::EventSourceAdapter;
use crate::kernel::gateway::RequestGateway;
use crate::kernel::slot::{Cancellation, RelayStats, RendezvousSlot};
use crate::source::ProcessNotifier;
use crate::types::{Error, Result};

/// What happened during [`LifecycleManager::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Whether a waiting consumer was unblocked with `Cancelled`.
    pub cancelled_waiter: bool,
    /// Whether the source acknowledged the unsubscribe.
    pub unsubscribed: bool,
    /// Counters of the slot being released.
    pub stats: RelayStats,
}

/// Owner of the rendezvous slot's lifetime.
///
/// NOT shared between threads directly: transports get a [`RequestGateway`],
/// which only holds a weak reference to the slot.
pub struct LifecycleManager {
    notifier: Arc<dyn ProcessNotifier>,
    slot: Option<Arc<RendezvousSlot>>,
}

impl LifecycleManager {
    pub fn new(notifier: Arc<dyn ProcessNotifier>) -> Self {
        Self {
            notifier,
            slot: None,
        }
    }

    /// Construct an empty slot and subscribe the event source to it.
    pub fn start(&mut self) -> Result<()> {
        if self.slot.is_some() {
            return Err(Error::state_transition("relay already running"));
        }

        let slot = Arc::new(RendezvousSlot::new());
        let adapter = Arc::new(EventSourceAdapter::new(&slot));
        self.notifier.subscribe(adapter).map_err(|e| {
            Error::startup(format!("failed to subscribe to process notifications: {}", e))
        })?;

        self.slot = Some(slot);
        tracing::info!("relay started");
        Ok(())
    }

    /// Unsubscribe, cancel any outstanding wait, release the slot.
    pub fn stop(&mut self) -> Result<ShutdownReport> {
        let slot = self
            .slot
            .take()
            .ok_or_else(|| Error::state_transition("relay is not running"))?;

        // Keep going on failure: the waiter must be released regardless.
        let unsubscribed = match self.notifier.unsubscribe() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("unsubscribe from process notifications failed: {}", e);
                false
            }
        };

        let cancellation = slot.cancel_if_occupied();
        let report = ShutdownReport {
            cancelled_waiter: cancellation == Cancellation::Cancelled,
            unsubscribed,
            stats: slot.stats(),
        };
        drop(slot);

        tracing::info!(
            cancelled_waiter = report.cancelled_waiter,
            delivered = report.stats.delivered,
            dropped = report.stats.dropped,
            "relay stopped"
        );
        Ok(report)
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_some()
    }

    /// Gateway bound to the current slot; detached when not running.
    pub fn gateway(&self) -> RequestGateway {
        self.slot
            .as_ref()
            .map(RequestGateway::new)
            .unwrap_or_default()
    }

    pub fn stats(&self) -> Option<RelayStats> {
        self.slot.as_ref().map(|slot| slot.stats())
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        if self.slot.is_some() {
            let _ = self.stop();
        }
    }
}

impl fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("running", &self.is_running())
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ManualNotifier, MockProcessNotifier};
    use mockall::Sequence;
    use tokio_test::{assert_pending, assert_ready_err, task};

    #[test]
    fn test_start_subscribes_and_stop_unsubscribes_once() {
        let mut seq = Sequence::new();
        let mut notifier = MockProcessNotifier::new();
        notifier
            .expect_subscribe()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        notifier
            .expect_unsubscribe()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let mut lifecycle = LifecycleManager::new(Arc::new(notifier));
        lifecycle.start().unwrap();
        let report = lifecycle.stop().unwrap();

        assert!(report.unsubscribed);
        assert!(!report.cancelled_waiter);
        assert!(!lifecycle.is_running());
    }

    #[test]
    fn test_subscribe_failure_is_startup_error() {
        let mut notifier = MockProcessNotifier::new();
        notifier
            .expect_subscribe()
            .returning(|_| Err(Error::internal("facility unavailable")));
        notifier.expect_unsubscribe().never();

        let mut lifecycle = LifecycleManager::new(Arc::new(notifier));
        let err = lifecycle.start().unwrap_err();

        assert!(matches!(err, Error::Startup(_)));
        assert!(err.to_string().contains("facility unavailable"));
        assert!(!lifecycle.is_running());
    }

    #[test]
    fn test_unsubscribe_runs_while_waiter_still_pending() {
        let mut notifier = MockProcessNotifier::new();
        let captured: Arc<std::sync::Mutex<Option<Arc<EventSourceAdapter>>>> = Arc::default();
        let sink = captured.clone();
        notifier.expect_subscribe().returning(move |adapter| {
            *sink.lock().unwrap() = Some(adapter);
            Ok(())
        });
        // A late event raised from inside unsubscribe still finds the waiter:
        // cancellation has not happened yet.
        let late = captured.clone();
        notifier.expect_unsubscribe().returning(move || {
            let adapter = late.lock().unwrap().take().unwrap();
            let outcome = adapter.on_process_created(9u64.into(), 1u64.into(), Some("late.exe"));
            assert_eq!(outcome, crate::kernel::slot::Delivery::Delivered);
            Ok(())
        });

        let mut lifecycle = LifecycleManager::new(Arc::new(notifier));
        lifecycle.start().unwrap();
        let mut handle = lifecycle.gateway().begin_wait().unwrap();

        let report = lifecycle.stop().unwrap();
        assert!(!report.cancelled_waiter);
        assert_eq!(handle.try_take().unwrap().unwrap().process_id.as_raw(), 9);
    }

    #[test]
    fn test_stop_cancels_outstanding_wait() {
        let notifier = Arc::new(ManualNotifier::new());
        let mut lifecycle = LifecycleManager::new(notifier.clone());
        lifecycle.start().unwrap();

        let gateway = lifecycle.gateway();
        let mut call = task::spawn(gateway.wait_for_next_process_event());
        assert_pending!(call.poll());

        let report = lifecycle.stop().unwrap();
        assert!(report.cancelled_waiter);
        assert!(matches!(assert_ready_err!(call.poll()), Error::Cancelled(_)));
        assert!(!notifier.is_subscribed());
    }

    #[test]
    fn test_double_start_and_stop_rejected() {
        let mut lifecycle = LifecycleManager::new(Arc::new(ManualNotifier::new()));
        assert!(matches!(lifecycle.stop(), Err(Error::StateTransition(_))));

        lifecycle.start().unwrap();
        assert!(matches!(lifecycle.start(), Err(Error::StateTransition(_))));
    }

    #[test]
    fn test_restart_detaches_old_gateways() {
        let notifier = Arc::new(ManualNotifier::new());
        let mut lifecycle = LifecycleManager::new(notifier.clone());

        lifecycle.start().unwrap();
        let old_gateway = lifecycle.gateway();
        lifecycle.stop().unwrap();
        lifecycle.start().unwrap();

        assert!(matches!(old_gateway.begin_wait(), Err(Error::Cancelled(_))));

        let mut handle = lifecycle.gateway().begin_wait().unwrap();
        notifier.emit_created(3, 1, None);
        assert!(handle.try_take().unwrap().is_ok());
    }

    #[test]
    fn test_drop_stops_running_relay() {
        let notifier = Arc::new(ManualNotifier::new());
        let mut lifecycle = LifecycleManager::new(notifier.clone());
        lifecycle.start().unwrap();
        let mut handle = lifecycle.gateway().begin_wait().unwrap();

        drop(lifecycle);

        assert!(!notifier.is_subscribed());
        assert!(matches!(handle.try_take(), Some(Err(Error::Cancelled(_)))));
    }
}
