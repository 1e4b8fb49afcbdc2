//! Scan capture state machine (pure transitions, no timers or I/O).
//!
//! ```text
//!            start()                 onDecode(raw)
//!   IDLE ─────────────▶ ARMED ─────────────────────▶ LOCKED
//!    ▲                   ▲  ▲                          │  │
//!    │ suspend()         │  │ retry() / countdown      │  │ resolved Ok
//!    │ (any state)       │  │ elapsed                  │  ▼
//!    │                   │  └──────── COOLING_DOWN ◀───┘ IDLE
//!    │                   │             resolved Err
//! ```
//!
//! Every transition that must invalidate pending work bumps `epoch`; timers
//! and in-flight resolutions carry the epoch/attempt they were started under
//! and are ignored when it no longer matches.

use serde::{Deserialize, Serialize};

use crate::types::{Error, ErrorKind};

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    /// No active capture.
    Idle,
    /// Capturing; the next decode event is accepted.
    Armed,
    /// A decode event is being resolved.
    Locked,
    /// Suppressed after an invalid or unauthorized result.
    CoolingDown,
}

/// Dismissible notification shown while cooling down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanNotice {
    /// The raw scanned value, kept for troubleshooting.
    pub raw: String,
    pub kind: ErrorKind,
    pub message: String,
    pub dismissed: bool,
}

impl ScanNotice {
    pub fn from_error(raw: &str, error: &Error) -> Self {
        Self {
            raw: raw.to_string(),
            kind: error.kind(),
            message: error.to_string(),
            dismissed: false,
        }
    }
}

/// A decode event accepted for resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub id: u64,
    pub raw: String,
}

/// What happened when a resolution result was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Result matched the locked attempt and succeeded; session is idle.
    Accepted,
    /// Result matched the locked attempt and failed; countdown keyed by epoch.
    CoolDown { epoch: u64 },
    /// Result arrived for an attempt that is no longer locked.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Armed,
    Locked { attempt: u64, raw: String },
    CoolingDown { notice: ScanNotice },
}

/// Pure scan session state machine.
#[derive(Debug, Clone)]
pub struct ScanMachine {
    phase: Phase,
    epoch: u64,
    last_attempt: u64,
}

impl Default for ScanMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanMachine {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            epoch: 0,
            last_attempt: 0,
        }
    }

    pub fn state(&self) -> ScanState {
        match self.phase {
            Phase::Idle => ScanState::Idle,
            Phase::Armed => ScanState::Armed,
            Phase::Locked { .. } => ScanState::Locked,
            Phase::CoolingDown { .. } => ScanState::CoolingDown,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Notice of the current cooldown, if any.
    pub fn notice(&self) -> Option<&ScanNotice> {
        match &self.phase {
            Phase::CoolingDown { notice } => Some(notice),
            _ => None,
        }
    }

    /// Attempt currently being resolved, if any.
    pub fn locked_attempt(&self) -> Option<u64> {
        match self.phase {
            Phase::Locked { attempt, .. } => Some(attempt),
            _ => None,
        }
    }

    /// Capture surface gained focus. Always re-arms from a clean slate.
    pub fn start(&mut self) {
        self.epoch += 1;
        self.phase = Phase::Armed;
    }

    /// Capture surface lost focus. Pending countdowns and resolutions go stale.
    pub fn suspend(&mut self) {
        self.epoch += 1;
        self.phase = Phase::Idle;
    }

    /// Offer a decode event. Only an armed session accepts it.
    pub fn on_decode(&mut self, raw: &str) -> Option<Attempt> {
        if self.phase != Phase::Armed {
            return None;
        }
        self.last_attempt += 1;
        self.phase = Phase::Locked {
            attempt: self.last_attempt,
            raw: raw.to_string(),
        };
        Some(Attempt {
            id: self.last_attempt,
            raw: raw.to_string(),
        })
    }

    /// Apply a successful resolution.
    pub fn resolve_ok(&mut self, attempt: u64) -> Resolution {
        if self.locked_attempt() != Some(attempt) {
            return Resolution::Stale;
        }
        self.phase = Phase::Idle;
        Resolution::Accepted
    }

    /// Apply a failed resolution.
    pub fn resolve_err(&mut self, attempt: u64, error: &Error) -> Resolution {
        let raw = match &self.phase {
            Phase::Locked { attempt: locked, raw } if *locked == attempt => raw.clone(),
            _ => return Resolution::Stale,
        };
        self.epoch += 1;
        self.phase = Phase::CoolingDown {
            notice: ScanNotice::from_error(&raw, error),
        };
        Resolution::CoolDown { epoch: self.epoch }
    }

    /// User asked to scan again. Only meaningful while cooling down.
    pub fn retry(&mut self) -> bool {
        if !matches!(self.phase, Phase::CoolingDown { .. }) {
            return false;
        }
        self.epoch += 1;
        self.phase = Phase::Armed;
        true
    }

    /// Countdown started under `epoch` ran out.
    pub fn cooldown_elapsed(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || !matches!(self.phase, Phase::CoolingDown { .. }) {
            return false;
        }
        self.phase = Phase::Armed;
        true
    }

    /// Hide the notification without leaving the cooldown.
    pub fn dismiss_notice(&mut self) -> bool {
        match &mut self.phase {
            Phase::CoolingDown { notice } if !notice.dismissed => {
                notice.dismissed = true;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed() -> ScanMachine {
        let mut m = ScanMachine::new();
        m.start();
        m
    }

    #[test]
    fn test_starts_idle_and_ignores_decodes() {
        let mut m = ScanMachine::new();
        assert_eq!(m.state(), ScanState::Idle);
        assert_eq!(m.on_decode("tool-1-1"), None);
    }

    #[test]
    fn test_one_decode_per_arm_cycle() {
        let mut m = armed();
        let attempt = m.on_decode("tool-1-1").unwrap();
        assert_eq!(m.state(), ScanState::Locked);
        assert_eq!(m.on_decode("tool-1-1"), None);
        assert_eq!(m.on_decode("tool-2-2"), None);
        assert_eq!(m.locked_attempt(), Some(attempt.id));
    }

    #[test]
    fn test_success_goes_idle() {
        let mut m = armed();
        let attempt = m.on_decode("tool-1-1").unwrap();
        assert_eq!(m.resolve_ok(attempt.id), Resolution::Accepted);
        assert_eq!(m.state(), ScanState::Idle);
        assert_eq!(m.on_decode("tool-1-1"), None);
    }

    #[test]
    fn test_failure_cools_down_with_raw_value() {
        let mut m = armed();
        let attempt = m.on_decode("000000000").unwrap();
        let res = m.resolve_err(attempt.id, &Error::unauthorized("000000000"));
        assert!(matches!(res, Resolution::CoolDown { .. }));
        assert_eq!(m.state(), ScanState::CoolingDown);

        let notice = m.notice().unwrap();
        assert_eq!(notice.raw, "000000000");
        assert_eq!(notice.kind, ErrorKind::Unauthorized);
        assert_eq!(m.on_decode("123456789"), None);
    }

    #[test]
    fn test_countdown_elapsed_rearms() {
        let mut m = armed();
        let attempt = m.on_decode("abc").unwrap();
        let Resolution::CoolDown { epoch } = m.resolve_err(attempt.id, &Error::invalid_format("abc"))
        else {
            panic!("expected cooldown");
        };
        assert!(m.cooldown_elapsed(epoch));
        assert_eq!(m.state(), ScanState::Armed);
    }

    #[test]
    fn test_retry_cancels_countdown() {
        let mut m = armed();
        let attempt = m.on_decode("abc").unwrap();
        let Resolution::CoolDown { epoch } = m.resolve_err(attempt.id, &Error::invalid_format("abc"))
        else {
            panic!("expected cooldown");
        };
        assert!(m.retry());
        assert_eq!(m.state(), ScanState::Armed);

        // Old countdown firing later must not disturb the new cycle.
        let next = m.on_decode("tool-1-1").unwrap();
        assert!(!m.cooldown_elapsed(epoch));
        assert_eq!(m.locked_attempt(), Some(next.id));
    }

    #[test]
    fn test_stale_resolution_after_suspend() {
        let mut m = armed();
        let attempt = m.on_decode("tool-1-1").unwrap();
        m.suspend();
        assert_eq!(m.resolve_ok(attempt.id), Resolution::Stale);
        assert_eq!(m.state(), ScanState::Idle);

        m.start();
        assert_eq!(
            m.resolve_err(attempt.id, &Error::tool_not_found("1")),
            Resolution::Stale
        );
        assert_eq!(m.state(), ScanState::Armed);
    }

    #[test]
    fn test_start_during_cooldown_is_clean_slate() {
        let mut m = armed();
        let attempt = m.on_decode("abc").unwrap();
        let Resolution::CoolDown { epoch } = m.resolve_err(attempt.id, &Error::invalid_format("abc"))
        else {
            panic!("expected cooldown");
        };
        m.suspend();
        m.start();
        assert_eq!(m.state(), ScanState::Armed);
        assert!(m.notice().is_none());
        assert!(!m.cooldown_elapsed(epoch));
    }

    #[test]
    fn test_retry_outside_cooldown_is_noop() {
        let mut m = armed();
        assert!(!m.retry());
        assert_eq!(m.state(), ScanState::Armed);
    }

    #[test]
    fn test_dismiss_keeps_cooldown() {
        let mut m = armed();
        let attempt = m.on_decode("abc").unwrap();
        m.resolve_err(attempt.id, &Error::invalid_format("abc"));
        assert!(m.dismiss_notice());
        assert!(!m.dismiss_notice());
        assert_eq!(m.state(), ScanState::CoolingDown);
        assert!(m.notice().unwrap().dismissed);
    }
}
