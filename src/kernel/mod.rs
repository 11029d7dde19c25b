//! Kernel - the relay core.
//!
//! The Kernel owns the lifecycle manager (and through it the rendezvous slot)
//! plus the verdict intake. Transports never touch the Kernel directly; they
//! hold a [`KernelHandle`], which is cheap to clone and takes no lock that a
//! waiting consumer could hold across its wait.

use std::sync::Arc;

use crate::events::{Ack, ProcessEvent, Verdict};
use crate::source::ProcessNotifier;
use crate::types::{Error, Result};

pub mod gateway;
pub mod lifecycle;
pub mod slot;
pub mod verdicts;

pub use gateway::RequestGateway;
pub use lifecycle::{LifecycleManager, ShutdownReport};
pub use slot::{
    Cancellation, Delivery, Registration, RelayStats, RendezvousSlot, WaitHandle,
};
pub use verdicts::{AcknowledgeOnly, ResponseIntake, VerdictHandler};

/// Running relay: lifecycle plus verdict intake.
#[derive(Debug)]
pub struct Kernel {
    lifecycle: LifecycleManager,
    verdicts: ResponseIntake,
}

impl Kernel {
    /// Start a relay fed by `notifier`, acknowledging verdicts without action.
    pub fn start(notifier: Arc<dyn ProcessNotifier>) -> Result<Self> {
        Self::start_with_handler(notifier, Arc::new(AcknowledgeOnly))
    }

    /// Start a relay that forwards verdicts to `handler`.
    pub fn start_with_handler(
        notifier: Arc<dyn ProcessNotifier>,
        handler: Arc<dyn VerdictHandler>,
    ) -> Result<Self> {
        let mut lifecycle = LifecycleManager::new(notifier);
        lifecycle.start()?;
        Ok(Self {
            lifecycle,
            verdicts: ResponseIntake::new(handler),
        })
    }

    pub fn handle(&self) -> KernelHandle {
        KernelHandle {
            gateway: self.lifecycle.gateway(),
            verdicts: self.verdicts.clone(),
        }
    }

    pub fn gateway(&self) -> RequestGateway {
        self.lifecycle.gateway()
    }

    pub fn submit_verdict(&self, verdict: Verdict) -> Ack {
        self.verdicts.submit_verdict(verdict)
    }

    pub fn stats(&self) -> Option<RelayStats> {
        self.lifecycle.stats()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Shut the relay down, cancelling any outstanding wait.
    pub fn stop(&mut self) -> Result<ShutdownReport> {
        self.lifecycle.stop()
    }
}

/// Transport-facing view of a running kernel.
#[derive(Debug, Clone)]
pub struct KernelHandle {
    gateway: RequestGateway,
    verdicts: ResponseIntake,
}

impl KernelHandle {
    pub async fn get_next_process_event(&self) -> Result<ProcessEvent> {
        self.gateway.wait_for_next_process_event().await
    }

    pub fn submit_verdict(&self, verdict: Verdict) -> Ack {
        self.verdicts.submit_verdict(verdict)
    }

    pub fn stats(&self) -> Result<RelayStats> {
        self.gateway
            .stats()
            .ok_or_else(|| Error::cancelled("relay is not running"))
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }
}
