//! # Migration Session State Machine
//!
//! Lifecycle of one migration configuration's run.
//!
//! ## State Machine
//!
//! ```text
//! Init ──→ Running ──→ Finished ─┐
//!                         ↑      │
//!                         └──────┘  (resumed run re-drains failed records)
//! ```
//!
//! `Init` means enumeration has not completed. The scheduler only drains the
//! store once the session has left `Init`.

use crate::{MigrateError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle phase of a migration session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No enumeration has completed yet
    Init,
    /// Store is fully seeded; records are being drained
    Running,
    /// The consumer loop exhausted every unfinished record
    Finished,
}

impl SessionStatus {
    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Init => "init",
            SessionStatus::Running => "running",
            SessionStatus::Finished => "finished",
        }
    }

    /// Whether the store may be drained in this phase
    pub fn is_seeded(&self) -> bool {
        matches!(self, SessionStatus::Running | SessionStatus::Finished)
    }

    /// Validate a transition to `to`
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::InvalidStateTransition`] for any edge not in the
    /// state machine above
    pub fn transition(self, to: SessionStatus) -> Result<SessionStatus> {
        let valid = matches!(
            (self, to),
            (SessionStatus::Init, SessionStatus::Running)
                | (SessionStatus::Running, SessionStatus::Finished)
                | (SessionStatus::Finished, SessionStatus::Finished)
        );

        if valid {
            Ok(to)
        } else {
            Err(MigrateError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!("session cannot move from {} to {}", self, to),
            })
        }
    }
}

impl FromStr for SessionStatus {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "init" => Ok(SessionStatus::Init),
            "running" => Ok(SessionStatus::Running),
            "finished" => Ok(SessionStatus::Finished),
            _ => Err(MigrateError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
