//! Rendezvous slot: the capacity-one handoff between the event producer and
//! the single waiting consumer.
//!
//! State machine:
//! ```text
//! Empty    --try_register-------> Occupied   (Registered)
//! Occupied --try_register-------> Occupied   (Busy, registration untouched)
//! Occupied --deliver------------> Empty      (waiter completed with event)
//! Occupied --cancel_if_occupied-> Empty      (waiter completed with Cancelled)
//! Empty    --deliver------------> Empty      (event dropped)
//! ```
//!
//! The slot is one `Mutex<Option<Waiter>>`. Every operation holds the lock for
//! an `Option` swap plus a non-blocking `oneshot` send, nothing else. Tracing
//! and counter updates happen after the guard is released.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

use crate::events::ProcessEvent;
use crate::types::{Error, RegistrationId, Result};

/// How a registration was completed.
#[derive(Debug)]
enum Completion {
    Event(ProcessEvent),
    Cancelled,
}

/// The registered consumer: its diagnostic id and its completion sink.
#[derive(Debug)]
struct Waiter {
    id: RegistrationId,
    tx: oneshot::Sender<Completion>,
}

/// Outcome of [`RendezvousSlot::try_register`].
#[derive(Debug)]
pub enum Registration {
    Registered(WaitHandle),
    Busy,
}

/// Outcome of [`RendezvousSlot::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Dropped,
}

/// Outcome of [`RendezvousSlot::cancel_if_occupied`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    Cancelled,
    NoOp,
}

/// Relay counters. Kept outside the slot lock so that a `Busy` rejection
/// leaves the slot itself untouched.
///
/// Each counter is bumped after the slot guard is released, so a snapshot
/// taken while operations are in flight may lag [`RendezvousSlot::is_occupied`]
/// by those operations. Once the slot is quiescent the counters agree with it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    /// Successful registrations.
    pub registered: u64,
    /// Registrations rejected because a wait was outstanding.
    pub busy: u64,
    /// Events handed to a waiter.
    pub delivered: u64,
    /// Events discarded because no live waiter was registered.
    pub dropped: u64,
    /// Waiters completed by shutdown.
    pub cancelled: u64,
    /// Registrations whose caller went away before completion.
    pub abandoned: u64,
}

#[derive(Debug, Default)]
struct Counters {
    registered: AtomicU64,
    busy: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    cancelled: AtomicU64,
    abandoned: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RelayStats {
        RelayStats {
            registered: self.registered.load(Ordering::Relaxed),
            busy: self.busy.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Capacity-one mailbox holding at most one waiting consumer.
///
/// Dropping a slot that still holds a waiter drops its completion sink, which
/// the waiter observes as [`Error::Cancelled`].
#[derive(Debug, Default)]
pub struct RendezvousSlot {
    waiter: Mutex<Option<Waiter>>,
    counters: Counters,
}

impl RendezvousSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Waiter>> {
        // The critical sections cannot panic halfway through an update, so a
        // poisoned guard still holds a consistent slot.
        self.waiter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the caller as the single waiter.
    ///
    /// Returns `Busy` without blocking if a live waiter is already registered.
    /// A waiter whose handle has been dropped is reclaimed instead.
    pub fn try_register(&self) -> Registration {
        let (tx, rx) = oneshot::channel();
        let id = RegistrationId::new();

        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|current| !current.tx.is_closed()) {
            drop(slot);
            Counters::bump(&self.counters.busy);
            tracing::debug!("rendezvous slot busy; registration rejected");
            return Registration::Busy;
        }
        let reclaimed = slot.take().map(|stale| stale.id);
        *slot = Some(Waiter { id: id.clone(), tx });
        drop(slot);

        Counters::bump(&self.counters.registered);
        if let Some(stale) = reclaimed {
            Counters::bump(&self.counters.abandoned);
            tracing::debug!(registration = %stale, "reclaimed abandoned registration");
        }
        tracing::debug!(registration = %id, "waiter registered");

        Registration::Registered(WaitHandle { id, rx })
    }

    /// Hand `event` to the registered waiter, or drop it if there is none.
    pub fn deliver(&self, event: ProcessEvent) -> Delivery {
        let process_id = event.process_id;

        let mut slot = self.lock();
        let Some(waiter) = slot.take() else {
            drop(slot);
            Counters::bump(&self.counters.dropped);
            tracing::debug!(%process_id, "no waiter registered; event dropped");
            return Delivery::Dropped;
        };
        let sent = waiter.tx.send(Completion::Event(event));
        drop(slot);

        match sent {
            Ok(()) => {
                Counters::bump(&self.counters.delivered);
                tracing::debug!(%process_id, registration = %waiter.id, "event delivered");
                Delivery::Delivered
            }
            Err(_) => {
                Counters::bump(&self.counters.abandoned);
                Counters::bump(&self.counters.dropped);
                tracing::debug!(
                    %process_id,
                    registration = %waiter.id,
                    "waiter abandoned; event dropped"
                );
                Delivery::Dropped
            }
        }
    }

    /// Complete the registered waiter with a cancellation result.
    pub fn cancel_if_occupied(&self) -> Cancellation {
        let mut slot = self.lock();
        let Some(waiter) = slot.take() else {
            return Cancellation::NoOp;
        };
        let sent = waiter.tx.send(Completion::Cancelled);
        drop(slot);

        Counters::bump(&self.counters.cancelled);
        if sent.is_err() {
            Counters::bump(&self.counters.abandoned);
        }
        tracing::debug!(registration = %waiter.id, "waiter cancelled");
        Cancellation::Cancelled
    }

    /// Whether a waiter is currently registered.
    pub fn is_occupied(&self) -> bool {
        self.lock().is_some()
    }

    /// Snapshot of the relay counters.
    ///
    /// Counters are read independently and are not synchronized with
    /// occupancy; use them for diagnostics only.
    pub fn stats(&self) -> RelayStats {
        self.counters.snapshot()
    }
}

/// Consumer half of a registration.
///
/// Dropping the handle abandons the registration; the slot reclaims it on the
/// next register or deliver.
#[derive(Debug)]
#[must_use = "dropping a WaitHandle abandons the registration"]
pub struct WaitHandle {
    id: RegistrationId,
    rx: oneshot::Receiver<Completion>,
}

impl WaitHandle {
    pub fn id(&self) -> &RegistrationId {
        &self.id
    }

    /// Suspend until the slot completes this registration.
    pub async fn wait(self) -> Result<ProcessEvent> {
        Self::settle(self.rx.await.ok())
    }

    /// Block the current thread until the slot completes this registration.
    ///
    /// Must not be called from within an asynchronous execution context.
    pub fn wait_blocking(self) -> Result<ProcessEvent> {
        Self::settle(self.rx.blocking_recv().ok())
    }

    /// Non-blocking check. `None` while the registration is still pending.
    pub fn try_take(&mut self) -> Option<Result<ProcessEvent>> {
        match self.rx.try_recv() {
            Ok(completion) => Some(Self::settle(Some(completion))),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Self::settle(None)),
        }
    }

    fn settle(completion: Option<Completion>) -> Result<ProcessEvent> {
        match completion {
            Some(Completion::Event(event)) => Ok(event),
            Some(Completion::Cancelled) => Err(Error::cancelled("relay is shutting down")),
            None => Err(Error::cancelled("rendezvous slot released")),
        }
    }
}
