//! Loan service - borrow/return transitions against the loan ledger.
//!
//! Every write goes through one of the ledger's combined atomic primitives,
//! so "one open loan per tool, `Borrowed` iff open" holds for any number of
//! concurrent callers. Reads here are advisory.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::codec::CodeCodec;
use crate::ledger::{Loan, LoanClosing, NewLoan, Tool, ToolStore};
use crate::types::{Error, LoanId, Result, ToolId, UserId};

/// Which action to offer a viewer for a tool. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "loan", rename_all = "snake_case")]
pub enum LoanAction {
    /// No open loan; the viewer may borrow.
    Borrow,
    /// The viewer holds the open loan and may return it.
    Return(Loan),
    /// Someone else holds the open loan.
    HeldByOther(Loan),
}

/// Orchestrates loan transitions.
#[derive(Clone)]
pub struct LoanService {
    store: Arc<dyn ToolStore>,
}

impl fmt::Debug for LoanService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoanService").finish_non_exhaustive()
    }
}

impl LoanService {
    pub fn new(store: Arc<dyn ToolStore>) -> Self {
        Self { store }
    }

    /// Borrow a tool.
    ///
    /// Fails with `ToolNotFound`, `AlreadyBorrowed` or `Store`. A failure
    /// leaves no loan record behind.
    pub async fn register_loan(
        &self,
        tool_id: &ToolId,
        borrower_id: &UserId,
        location: &str,
    ) -> Result<Loan> {
        let request = NewLoan {
            tool_id: tool_id.clone(),
            borrower_id: borrower_id.clone(),
            origin_location: location.to_string(),
            borrowed_at: Utc::now(),
        };

        match self.store.open_loan_if_available(request).await {
            Ok(loan) => {
                tracing::info!(
                    tool_id = %loan.tool_id,
                    loan_id = %loan.id,
                    borrower_id = %loan.borrower_id,
                    "loan_registered"
                );
                Ok(loan)
            }
            Err(e) => {
                tracing::warn!(
                    tool_id = %tool_id,
                    borrower_id = %borrower_id,
                    error = %e,
                    "loan_rejected"
                );
                Err(e)
            }
        }
    }

    /// Return a borrowed tool.
    ///
    /// A second return of the same loan fails with `NotOpen` and changes
    /// nothing.
    pub async fn register_return(&self, loan_id: &LoanId, location: &str) -> Result<Loan> {
        let closing = LoanClosing {
            return_location: location.to_string(),
            returned_at: Utc::now(),
        };

        match self.store.close_loan_if_open(loan_id, closing).await {
            Ok(loan) => {
                tracing::info!(
                    tool_id = %loan.tool_id,
                    loan_id = %loan.id,
                    "return_registered"
                );
                Ok(loan)
            }
            Err(e) => {
                tracing::warn!(loan_id = %loan_id, error = %e, "return_rejected");
                Err(e)
            }
        }
    }

    /// Current open loan for a tool, if any. Not transactional with any
    /// later call.
    pub async fn find_open_loan(&self, tool_id: &ToolId) -> Result<Option<Loan>> {
        self.store.open_loan_for(tool_id).await
    }

    /// Full loan history of a tool, oldest first.
    pub async fn history(&self, tool_id: &ToolId) -> Result<Vec<Loan>> {
        self.store.loans_for_tool(tool_id).await
    }

    /// Resolve a scanned string to its catalog record.
    pub async fn lookup_scanned(&self, raw: &str) -> Result<Tool> {
        let asset_tag = CodeCodec::decode(raw)?;
        self.store
            .tool_by_asset_tag(&asset_tag)
            .await?
            .ok_or_else(|| Error::tool_not_found(format!("asset tag {}", asset_tag)))
    }

    /// Decide which action to present to `viewer` for a tool.
    pub async fn action_for(&self, tool_id: &ToolId, viewer: &UserId) -> Result<LoanAction> {
        Ok(match self.find_open_loan(tool_id).await? {
            None => LoanAction::Borrow,
            Some(loan) if &loan.borrower_id == viewer => LoanAction::Return(loan),
            Some(loan) => LoanAction::HeldByOther(loan),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::tests::sample_tool;
    use crate::ledger::{Availability, LoanStatus, MemoryStore, ToolCatalog};

    async fn service_with_tool() -> (LoanService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.insert_tool(sample_tool("9", "4521")).await.unwrap();
        (LoanService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_borrow_scenario() {
        let (service, store) = service_with_tool().await;
        let tool = ToolId::must("9");

        let loan = service
            .register_loan(&tool, &UserId::must("3"), "Oficina")
            .await
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Open);
        assert_eq!(loan.origin_location, "Oficina");
        let stored = store.tool(&tool).await.unwrap().unwrap();
        assert_eq!(stored.availability, Availability::Borrowed);

        let err = service
            .register_loan(&tool, &UserId::must("5"), "Deposito")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyBorrowed(_)));
        assert_eq!(service.history(&tool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_return_twice() {
        let (service, _store) = service_with_tool().await;
        let tool = ToolId::must("9");
        let loan = service
            .register_loan(&tool, &UserId::must("3"), "Oficina")
            .await
            .unwrap();

        let returned = service.register_return(&loan.id, "Deposito").await.unwrap();
        assert_eq!(returned.status, LoanStatus::Returned);
        assert_eq!(returned.return_location.as_deref(), Some("Deposito"));

        let err = service.register_return(&loan.id, "Oficina").await.unwrap_err();
        assert!(matches!(err, Error::NotOpen(_)));
        let after = service.history(&tool).await.unwrap();
        assert_eq!(after, vec![returned]);
    }

    #[tokio::test]
    async fn test_lookup_scanned() {
        let (service, _store) = service_with_tool().await;
        let tool = service.lookup_scanned("tool-4521-1700000000000").await.unwrap();
        assert_eq!(tool.id, ToolId::must("9"));

        let err = service.lookup_scanned("abc123").await.unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));

        let err = service.lookup_scanned("tool-7777-1700000000000").await.unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_action_for_viewer() {
        let (service, _store) = service_with_tool().await;
        let tool = ToolId::must("9");
        let owner = UserId::must("3");
        let other = UserId::must("5");

        assert_eq!(service.action_for(&tool, &owner).await.unwrap(), LoanAction::Borrow);
        let loan = service.register_loan(&tool, &owner, "Oficina").await.unwrap();
        assert_eq!(
            service.action_for(&tool, &owner).await.unwrap(),
            LoanAction::Return(loan.clone())
        );
        assert_eq!(
            service.action_for(&tool, &other).await.unwrap(),
            LoanAction::HeldByOther(loan)
        );
    }

    #[tokio::test]
    async fn test_store_error_surfaces_unchanged() {
        let (service, store) = service_with_tool().await;
        store.set_outage(true);
        let err = service
            .register_loan(&ToolId::must("9"), &UserId::must("3"), "Oficina")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_transitions_are_logged() {
        let (service, _store) = service_with_tool().await;
        service
            .register_loan(&ToolId::must("9"), &UserId::must("3"), "Oficina")
            .await
            .unwrap();
        assert!(logs_contain("loan_registered"));
    }
}
