//! Badge authorization gate for the tool registration workflow.
//!
//! The set of accepted codes is an injected [`BadgeAuthority`], so the number
//! and source of codes (one preset code, per-device or per-role lists, a
//! remote lookup) is configuration rather than gate logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::types::{BadgeConfig, Error, Result};

/// Outcome of a badge check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeVerdict {
    Authorized,
    Unauthorized,
}

/// Capability deciding whether a scanned badge code is accepted.
pub trait BadgeAuthority: Send + Sync {
    fn accepts(&self, code: &str) -> bool;
}

impl<F> BadgeAuthority for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn accepts(&self, code: &str) -> bool {
        self(code)
    }
}

/// Fixed set of accepted badge codes.
#[derive(Debug, Clone, Default)]
pub struct AcceptedBadges {
    codes: HashSet<String>,
}

impl AcceptedBadges {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes
                .into_iter()
                .map(Into::into)
                .filter(|c: &String| !c.trim().is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &BadgeConfig) -> Self {
        Self::new(config.accepted_codes.iter().cloned())
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl BadgeAuthority for AcceptedBadges {
    fn accepts(&self, code: &str) -> bool {
        self.codes.contains(code)
    }
}

/// Proof that a badge was accepted. Only [`BadgeGate::authorize`] mints one.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistrationGrant {
    badge_code: String,
    granted_at: DateTime<Utc>,
}

impl RegistrationGrant {
    pub fn badge_code(&self) -> &str {
        &self.badge_code
    }

    pub fn granted_at(&self) -> DateTime<Utc> {
        self.granted_at
    }
}

impl fmt::Debug for RegistrationGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationGrant")
            .field("granted_at", &self.granted_at)
            .finish_non_exhaustive()
    }
}

/// Validates scanned badge codes against an injected authority.
#[derive(Clone)]
pub struct BadgeGate {
    authority: Arc<dyn BadgeAuthority>,
}

impl fmt::Debug for BadgeGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BadgeGate").finish_non_exhaustive()
    }
}

impl BadgeGate {
    pub fn new(authority: impl BadgeAuthority + 'static) -> Self {
        Self {
            authority: Arc::new(authority),
        }
    }

    pub fn from_config(config: &BadgeConfig) -> Self {
        Self::new(AcceptedBadges::from_config(config))
    }

    /// Check a scanned code.
    pub fn validate(&self, code: &str) -> BadgeVerdict {
        if self.authority.accepts(code) {
            tracing::info!("badge_authorized");
            BadgeVerdict::Authorized
        } else {
            tracing::warn!(code_len = code.len(), "badge_unauthorized");
            BadgeVerdict::Unauthorized
        }
    }

    /// Check a scanned code and mint a registration grant on success.
    ///
    /// The raw code is kept in the `Unauthorized` error for display.
    pub fn authorize(&self, code: &str) -> Result<RegistrationGrant> {
        match self.validate(code) {
            BadgeVerdict::Authorized => Ok(RegistrationGrant {
                badge_code: code.to_string(),
                granted_at: Utc::now(),
            }),
            BadgeVerdict::Unauthorized => Err(Error::unauthorized(code.to_string())),
        }
    }
}
