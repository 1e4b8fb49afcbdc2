//! # Toolcrib Core - Tool Loan Lifecycle Kernel
//!
//! Kernel for lending physical tools identified by scannable codes:
//! - Scannable code grammar `tool-<assetTag>-<epochMillis>` ([`codec`])
//! - Debounced scan sessions with timed cooldown ([`scan`])
//! - Badge-gated tool registration ([`badge`], [`kernel::ToolRegistry`])
//! - Atomic borrow/return transitions over a loan ledger ([`ledger`], [`kernel::LoanService`])
//!
//! ## Architecture
//!
//! ```text
//!   decode event ─▶ ScanSession ──(locked)──▶ resolver
//!                      ▲                        │
//!                      │   ┌────────────────────┴──────────────┐
//!                      │   │ ToolLookupResolver   BadgeResolver │
//!                      │   │  CodeCodec.decode    BadgeGate     │
//!                      │   │  ToolCatalog lookup               │
//!                      │   └────────────────────┬──────────────┘
//!                      └──── Ok ▶ Idle / Err ▶ CoolingDown
//!
//!   LoanService ─▶ LoanLedger (atomic open_loan_if_available /
//!                              close_loan_if_open)
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod badge;
pub mod codec;
pub mod kernel;
pub mod ledger;
pub mod scan;
pub mod types;

// Internal utilities
pub mod observability;

pub use types::{Config, Error, ErrorKind, Result};
