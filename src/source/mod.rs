//! Process notification sources.
//!
//! A source is the operating-system facility that reports process creation.
//! The relay only needs a subscribe/unsubscribe pair: while subscribed the
//! source calls the adapter on any thread, once per observed creation.
//!
//! - [`ManualNotifier`]: in-memory source driven by `emit`, for embedding and tests
//! - [`ProcfsNotifier`]: polls the proc filesystem for new pids

use std::sync::Arc;

use crate::events::EventSourceAdapter;
use crate::types::Result;

pub mod manual;
pub mod procfs;

pub use manual::ManualNotifier;
pub use procfs::ProcfsNotifier;

/// Subscription seam to a process notification facility.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessNotifier: Send + Sync {
    /// Start reporting notifications to `adapter`.
    fn subscribe(&self, adapter: Arc<EventSourceAdapter>) -> Result<()>;

    /// Stop reporting. Once this returns, no callback into the adapter is in
    /// progress or will start.
    fn unsubscribe(&self) -> Result<()>;
}
