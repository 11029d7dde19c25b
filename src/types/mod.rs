//! Core types for the relay.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Opaque process handles and registration identifiers
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for server, transport, and event source

mod config;
mod errors;
mod ids;

pub use config::{Config, IpcConfig, ObservabilityConfig, ServerConfig, SourceConfig, SourceKind};
pub use errors::{Error, Result};
pub use ids::{ProcessId, RegistrationId};
