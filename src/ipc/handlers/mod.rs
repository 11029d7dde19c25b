//! Per-operation IPC handlers.

pub mod process;
pub mod verdict;
