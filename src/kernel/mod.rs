//! Kernel - wires the loan service, registry, badge gate and scan sessions.
//!
//! The Kernel owns no mutable loan state itself: every borrow/return goes
//! through the shared [`ToolStore`]'s atomic primitives. Subsystems are plain
//! structs handed out by reference or cheap clone.

mod loans;
mod registry;

pub use loans::{LoanAction, LoanService};
pub use registry::{ToolDraft, ToolRegistry};

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::badge::{BadgeGate, RegistrationGrant};
use crate::ledger::{MemoryStore, Tool, ToolStore};
use crate::scan::{BadgeResolver, ScanAccepted, ScanSession, ToolLookupResolver};
use crate::types::{Config, Result, StoreBackend};

/// Scan session resolving tool codes.
pub type ToolScanner = ScanSession<ToolLookupResolver>;

/// Scan session resolving registration badges.
pub type BadgeScanner = ScanSession<BadgeResolver>;

/// Tool loan kernel.
#[derive(Clone)]
pub struct Kernel {
    config: Config,
    loans: LoanService,
    registry: ToolRegistry,
    badges: BadgeGate,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Kernel {
    /// Build a kernel over an existing store.
    pub fn new(config: Config, store: Arc<dyn ToolStore>) -> Self {
        let badges = BadgeGate::from_config(&config.badge);
        Self {
            loans: LoanService::new(store.clone()),
            registry: ToolRegistry::new(store),
            badges,
            config,
        }
    }

    /// Build a kernel whose store is chosen by `config.store`.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn ToolStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Sqlite => open_sqlite(&config)?,
        };
        tracing::info!(backend = ?config.store.backend, "kernel_started");
        Ok(Self::new(config, store))
    }

    /// Replace the configured badge gate (e.g. a per-role lookup).
    pub fn with_badge_gate(mut self, badges: BadgeGate) -> Self {
        self.badges = badges;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn loans(&self) -> &LoanService {
        &self.loans
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn badges(&self) -> &BadgeGate {
        &self.badges
    }

    /// New idle session for tool identification.
    pub fn tool_scanner(&self) -> (ToolScanner, mpsc::UnboundedReceiver<ScanAccepted<Tool>>) {
        ScanSession::new(
            "tool_lookup",
            ToolLookupResolver::new(self.loans.clone()),
            &self.config.scan,
        )
    }

    /// New idle session for registration badge capture.
    pub fn badge_scanner(
        &self,
    ) -> (BadgeScanner, mpsc::UnboundedReceiver<ScanAccepted<RegistrationGrant>>) {
        ScanSession::new(
            "badge",
            BadgeResolver::new(self.badges.clone()),
            &self.config.scan,
        )
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(config: &Config) -> Result<Arc<dyn ToolStore>> {
    let path = config
        .store
        .sqlite_path
        .as_ref()
        .ok_or_else(|| crate::types::Error::validation("store.sqlite_path is required"))?;
    Ok(Arc::new(crate::ledger::SqliteStore::open(path)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_config: &Config) -> Result<Arc<dyn ToolStore>> {
    Err(crate::types::Error::validation(
        "sqlite backend requires the `sqlite` feature",
    ))
}
