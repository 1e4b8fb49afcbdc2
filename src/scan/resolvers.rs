//! Downstream resolvers invoked while a scan session is locked.

use async_trait::async_trait;

use crate::badge::{BadgeGate, RegistrationGrant};
use crate::kernel::LoanService;
use crate::ledger::Tool;
use crate::types::Result;

/// Turns an accepted raw scan into a domain result.
///
/// Any error routes the session into its cooldown.
#[async_trait]
pub trait ScanResolver: Send + Sync + 'static {
    type Output: Send + 'static;

    async fn resolve(&self, raw: &str) -> Result<Self::Output>;
}

/// Tool identification: decode the code, then look the tool up.
#[derive(Debug, Clone)]
pub struct ToolLookupResolver {
    loans: LoanService,
}

impl ToolLookupResolver {
    pub fn new(loans: LoanService) -> Self {
        Self { loans }
    }
}

#[async_trait]
impl ScanResolver for ToolLookupResolver {
    type Output = Tool;

    async fn resolve(&self, raw: &str) -> Result<Tool> {
        self.loans.lookup_scanned(raw).await
    }
}

/// Badge capture for the registration workflow.
#[derive(Debug, Clone)]
pub struct BadgeResolver {
    gate: BadgeGate,
}

impl BadgeResolver {
    pub fn new(gate: BadgeGate) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl ScanResolver for BadgeResolver {
    type Output = RegistrationGrant;

    async fn resolve(&self, raw: &str) -> Result<RegistrationGrant> {
        self.gate.authorize(raw)
    }
}
