//! In-memory ledger backend.
//!
//! All state lives behind one `tokio::sync::Mutex`; each contract primitive
//! holds the lock for its whole check-and-write, which is the atomic step.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::types::{Availability, Loan, LoanClosing, NewLoan, Tool};
use super::{LoanLedger, ToolCatalog};
use crate::codec::AssetTag;
use crate::types::{Error, LoanId, Result, ToolId};

#[derive(Debug, Default)]
struct StoreState {
    tools: HashMap<ToolId, Tool>,
    tools_by_tag: HashMap<AssetTag, ToolId>,
    loans: HashMap<LoanId, Loan>,
    /// tool_id → its single open loan
    open_loans: HashMap<ToolId, LoanId>,
    /// tool_id → loan ids in borrow order
    history: HashMap<ToolId, Vec<LoanId>>,
}

/// Process-local tool store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    outage: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `Store` until cleared.
    #[cfg(any(test, feature = "test-harness"))]
    pub fn set_outage(&self, down: bool) {
        self.outage.store(down, Ordering::SeqCst);
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.outage.load(Ordering::SeqCst) {
            return Err(Error::store("memory store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl LoanLedger for MemoryStore {
    async fn open_loan_if_available(&self, request: NewLoan) -> Result<Loan> {
        self.ensure_reachable()?;
        let mut state = self.state.lock().await;
        let state = &mut *state;

        let tool = state
            .tools
            .get_mut(&request.tool_id)
            .ok_or_else(|| Error::tool_not_found(request.tool_id.to_string()))?;

        if let Some(open) = state.open_loans.get(&request.tool_id) {
            return Err(Error::already_borrowed(format!(
                "tool {} has open loan {}",
                request.tool_id, open
            )));
        }
        if tool.availability != Availability::Available {
            return Err(Error::already_borrowed(request.tool_id.to_string()));
        }

        let loan = Loan::open(request);
        tool.availability = Availability::Borrowed;
        state.open_loans.insert(loan.tool_id.clone(), loan.id.clone());
        state
            .history
            .entry(loan.tool_id.clone())
            .or_default()
            .push(loan.id.clone());
        state.loans.insert(loan.id.clone(), loan.clone());
        Ok(loan)
    }

    async fn close_loan_if_open(&self, loan_id: &LoanId, closing: LoanClosing) -> Result<Loan> {
        self.ensure_reachable()?;
        let mut state = self.state.lock().await;
        let state = &mut *state;

        let loan = state
            .loans
            .get_mut(loan_id)
            .ok_or_else(|| Error::loan_not_found(loan_id.to_string()))?;

        if !loan.is_open() {
            return Err(Error::not_open(format!(
                "loan {} is {}",
                loan_id,
                loan.status.as_str()
            )));
        }

        let tool = state
            .tools
            .get_mut(&loan.tool_id)
            .ok_or_else(|| Error::store(format!("loan {} references missing tool", loan_id)))?;

        loan.close(closing);
        tool.availability = Availability::Available;
        state.open_loans.remove(&loan.tool_id);
        Ok(loan.clone())
    }

    async fn open_loan_for(&self, tool_id: &ToolId) -> Result<Option<Loan>> {
        self.ensure_reachable()?;
        let state = self.state.lock().await;
        Ok(state
            .open_loans
            .get(tool_id)
            .and_then(|id| state.loans.get(id))
            .cloned())
    }

    async fn loans_for_tool(&self, tool_id: &ToolId) -> Result<Vec<Loan>> {
        self.ensure_reachable()?;
        let state = self.state.lock().await;
        Ok(state
            .history
            .get(tool_id)
            .map(|ids| ids.iter().filter_map(|id| state.loans.get(id)).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ToolCatalog for MemoryStore {
    async fn tool(&self, tool_id: &ToolId) -> Result<Option<Tool>> {
        self.ensure_reachable()?;
        Ok(self.state.lock().await.tools.get(tool_id).cloned())
    }

    async fn tool_by_asset_tag(&self, asset_tag: &AssetTag) -> Result<Option<Tool>> {
        self.ensure_reachable()?;
        let state = self.state.lock().await;
        Ok(state
            .tools_by_tag
            .get(asset_tag)
            .and_then(|id| state.tools.get(id))
            .cloned())
    }

    async fn insert_tool(&self, mut tool: Tool) -> Result<Tool> {
        self.ensure_reachable()?;
        let mut state = self.state.lock().await;

        if state.tools.contains_key(&tool.id) {
            return Err(Error::validation(format!("tool id {} already exists", tool.id)));
        }
        if state.tools_by_tag.contains_key(&tool.asset_tag) {
            return Err(Error::validation(format!(
                "asset tag {} already registered",
                tool.asset_tag
            )));
        }

        tool.availability = Availability::Available;
        state.tools_by_tag.insert(tool.asset_tag.clone(), tool.id.clone());
        state.tools.insert(tool.id.clone(), tool.clone());
        Ok(tool)
    }
}
