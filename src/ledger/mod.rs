//! Loan ledger contract.
//!
//! The ledger exposes only combined, atomic transitions. There is no way to
//! write a tool's availability or a loan's status on its own:
//!
//! ```text
//!   open_loan_if_available   Available ──(insert Open loan)──▶ Borrowed
//!   close_loan_if_open       Borrowed  ──(Open → Returned)───▶ Available
//! ```
//!
//! Backends:
//! - [`MemoryStore`]: one `tokio::sync::Mutex` acquisition per primitive
//! - `SqliteStore` (feature `sqlite`): one SQL transaction per primitive

use async_trait::async_trait;

use crate::codec::AssetTag;
use crate::types::{LoanId, Result, ToolId};

pub(crate) mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;
mod types;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use types::{Availability, Loan, LoanClosing, LoanStatus, NewLoan, Tool};

/// Durable loan storage consumed by the loan service.
#[async_trait]
pub trait LoanLedger: Send + Sync {
    /// Atomically insert an open loan and flip the tool to `Borrowed`.
    ///
    /// Fails with `ToolNotFound` for an unknown tool and `AlreadyBorrowed`
    /// when an open loan exists; neither failure writes anything.
    async fn open_loan_if_available(&self, request: NewLoan) -> Result<Loan>;

    /// Atomically mark an open loan returned and flip its tool to `Available`.
    ///
    /// Fails with `LoanNotFound` or `NotOpen`; neither failure writes anything.
    async fn close_loan_if_open(&self, loan_id: &LoanId, closing: LoanClosing) -> Result<Loan>;

    /// Point read of the currently open loan for a tool.
    async fn open_loan_for(&self, tool_id: &ToolId) -> Result<Option<Loan>>;

    /// Every loan recorded for a tool, oldest first.
    async fn loans_for_tool(&self, tool_id: &ToolId) -> Result<Vec<Loan>>;
}

/// Read/insert access to tool records owned by the catalog.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    async fn tool(&self, tool_id: &ToolId) -> Result<Option<Tool>>;

    async fn tool_by_asset_tag(&self, asset_tag: &AssetTag) -> Result<Option<Tool>>;

    /// Insert a new tool. Rejects a duplicate id or asset tag with `Validation`.
    ///
    /// New tools always start `Available`.
    async fn insert_tool(&self, tool: Tool) -> Result<Tool>;
}

/// A backend serving both the catalog reads and the loan ledger.
pub trait ToolStore: LoanLedger + ToolCatalog {}

impl<T: LoanLedger + ToolCatalog> ToolStore for T {}
