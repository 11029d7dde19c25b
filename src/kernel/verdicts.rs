//! Verdict intake.
//!
//! Verdicts are acknowledged unconditionally and never read or write relay
//! state. Enforcement (terminating a blocked process, remembering an allowed
//! image) plugs in through [`VerdictHandler`].

use std::fmt;
use std::sync::Arc;

use crate::events::{Ack, Verdict};

/// Receives every verdict submitted by the consumer.
///
/// Called on the submitting thread. Implementations must not block.
pub trait VerdictHandler: Send + Sync {
    fn on_verdict(&self, verdict: &Verdict);
}

/// Default handler: records the verdict in the trace and takes no action.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcknowledgeOnly;

impl VerdictHandler for AcknowledgeOnly {
    fn on_verdict(&self, verdict: &Verdict) {
        tracing::info!(
            process_id = %verdict.process_id,
            decision = %verdict.decision,
            "verdict received; no enforcement configured"
        );
    }
}

/// Stateless pass-through from consumer to [`VerdictHandler`].
#[derive(Clone)]
pub struct ResponseIntake {
    handler: Arc<dyn VerdictHandler>,
}

impl ResponseIntake {
    pub fn new(handler: Arc<dyn VerdictHandler>) -> Self {
        Self { handler }
    }

    /// Accept a verdict. Always acknowledged.
    pub fn submit_verdict(&self, verdict: Verdict) -> Ack {
        self.handler.on_verdict(&verdict);
        Ack {
            process_id: verdict.process_id,
        }
    }
}

impl Default for ResponseIntake {
    fn default() -> Self {
        Self::new(Arc::new(AcknowledgeOnly))
    }
}

impl fmt::Debug for ResponseIntake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseIntake").finish_non_exhaustive()
    }
}
