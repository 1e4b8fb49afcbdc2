//! Ledger types: Tool, Loan, and the transition requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::AssetTag;
use crate::types::{CategoryId, LoanId, ToolId, UserId};

/// Tool availability.
///
/// `Borrowed` iff exactly one open loan references the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Borrowed,
}

impl Availability {
    pub fn is_available(self) -> bool {
        self == Availability::Available
    }
}

/// Loan status. Transitions `Open → Returned` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Open,
    Returned,
}

impl LoanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LoanStatus::Open => "open",
            LoanStatus::Returned => "returned",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "open" => Some(LoanStatus::Open),
            "returned" => Some(LoanStatus::Returned),
            _ => None,
        }
    }
}

/// Catalog record of a physical tool.
///
/// The kernel reads the whole record but only the ledger primitives write
/// `availability`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: ToolId,
    pub asset_tag: AssetTag,
    pub name: String,
    pub details: String,
    pub location: String,
    pub category_id: CategoryId,
    /// Opaque reference owned by the image storage collaborator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    pub availability: Availability,
    /// Scannable code generated once at creation.
    pub code: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_by: Option<UserId>,
}

/// Append-only loan record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub tool_id: ToolId,
    pub borrower_id: UserId,
    pub origin_location: String,
    pub borrowed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_location: Option<String>,
    pub status: LoanStatus,
}

impl Loan {
    /// Build the open loan described by a borrow request.
    pub fn open(request: NewLoan) -> Self {
        Self {
            id: LoanId::new(),
            tool_id: request.tool_id,
            borrower_id: request.borrower_id,
            origin_location: request.origin_location,
            borrowed_at: request.borrowed_at,
            returned_at: None,
            return_location: None,
            status: LoanStatus::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == LoanStatus::Open
    }

    /// Apply a return in place.
    pub(crate) fn close(&mut self, closing: LoanClosing) {
        self.status = LoanStatus::Returned;
        self.returned_at = Some(closing.returned_at);
        self.return_location = Some(closing.return_location);
    }
}

/// Borrow request handed to [`super::LoanLedger::open_loan_if_available`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewLoan {
    pub tool_id: ToolId,
    pub borrower_id: UserId,
    pub origin_location: String,
    pub borrowed_at: DateTime<Utc>,
}

/// Return details handed to [`super::LoanLedger::close_loan_if_open`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoanClosing {
    pub return_location: String,
    pub returned_at: DateTime<Utc>,
}
