//! # procrelay - Process-Creation Relay
//!
//! Hands process-creation events from an operating-system notification
//! source to a single waiting consumer through a capacity-one rendezvous:
//! - Exactly one consumer may wait at a time; a second gets `AlreadyPending`
//! - An event arriving with no waiter is dropped, never queued
//! - Shutdown cancels the outstanding wait
//! - Verdicts about a process are acknowledged and passed to a pluggable handler
//!
//! ## Architecture
//!
//! ```text
//!   OS source ──► EventSourceAdapter ──► RendezvousSlot ◄── RequestGateway ◄── consumer
//!   (procfs,       (normalize,            (Mutex<Option<     (register,          (in-process
//!    manual)        truncate name)          Waiter>>)          suspend)            or IPC)
//!                                              ▲
//!                          LifecycleManager ───┘ owns; stop cancels
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod events;
pub mod ipc;
pub mod kernel;
pub mod source;
pub mod types;

// Internal utilities
pub mod observability;

pub use types::{Config, Error, Result};
