//! Core types for the tool loan kernel.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (ToolId, LoanId, UserId, CategoryId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for scanning, badges, storage and logging

mod config;
mod errors;
mod ids;

pub use config::{BadgeConfig, Config, ObservabilityConfig, ScanConfig, StoreBackend, StoreConfig};
pub use errors::{Error, ErrorKind, Result};
pub use ids::{CategoryId, LoanId, ToolId, UserId};
