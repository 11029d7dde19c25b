//! Event infrastructure: process creation events, verdicts, and the adapter
//! that turns raw lifecycle notifications into relay deliveries.

pub mod adapter;
pub mod process;
pub mod verdict;

pub use adapter::{EventSourceAdapter, ProcessNotification};
pub use process::{ImageName, ProcessEvent, ProcessEventRecord, MAX_IMAGE_NAME_UNITS};
pub use verdict::{Ack, Decision, Verdict};
