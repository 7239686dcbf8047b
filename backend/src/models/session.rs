use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{BankId, SessionId};

/// Half of a charge/discharge cycle.
///
/// Ordering puts `Charge` before `Discharge`, which is the order cycles are
/// exported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Charge,
    Discharge,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Charge => "charge",
            Phase::Discharge => "discharge",
        }
    }

    /// Capitalised name used in exports ("Charge", "Discharge").
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Charge => "Charge",
            Phase::Discharge => "Discharge",
        }
    }

    /// The phase that follows this one.
    pub fn next(&self) -> Phase {
        match self {
            Phase::Charge => Phase::Discharge,
            Phase::Discharge => Phase::Charge,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "charge" => Ok(Phase::Charge),
            "discharge" => Ok(Phase::Discharge),
            _ => Err(format!("Unknown phase: {}", s)),
        }
    }
}

/// Lifecycle status of a test session.
///
/// `Aborted` is part of the status domain so stored data can carry it, but no
/// operation currently transitions into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    #[serde(alias = "active")]
    InProgress,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Aborted => "aborted",
        }
    }

    /// Human readable form, e.g. "In Progress".
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "Scheduled",
            SessionStatus::InProgress => "In Progress",
            SessionStatus::Completed => "Completed",
            SessionStatus::Aborted => "Aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Aborted)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(SessionStatus::Scheduled),
            "in_progress" | "active" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "aborted" => Ok(SessionStatus::Aborted),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// An endurance test run against one battery bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSession {
    pub id: SessionId,
    pub bank_id: BankId,
    pub start_time: DateTime<Utc>,
    pub status: SessionStatus,
    pub total_cycles: u32,
    /// 1-indexed; exceeds `total_cycles` only once the session is completed.
    pub current_cycle: u32,
    pub current_phase: Phase,
}

impl TestSession {
    /// A freshly created session: cycle 1, charge phase, scheduled.
    pub fn scheduled(
        id: SessionId,
        bank_id: BankId,
        total_cycles: u32,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            bank_id,
            start_time,
            status: SessionStatus::Scheduled,
            total_cycles,
            current_cycle: 1,
            current_phase: Phase::Charge,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_next_alternates() {
        assert_eq!(Phase::Charge.next(), Phase::Discharge);
        assert_eq!(Phase::Discharge.next(), Phase::Charge);
    }

    #[test]
    fn test_phase_orders_charge_first() {
        assert!(Phase::Charge < Phase::Discharge);
    }

    #[test]
    fn test_phase_parse() {
        assert_eq!("Charge".parse::<Phase>().unwrap(), Phase::Charge);
        assert_eq!("discharge".parse::<Phase>().unwrap(), Phase::Discharge);
        assert!("rest".parse::<Phase>().is_err());
    }

    #[test]
    fn test_status_parse_accepts_active_alias() {
        assert_eq!(
            "active".parse::<SessionStatus>().unwrap(),
            SessionStatus::InProgress
        );
        assert_eq!(
            "in_progress".parse::<SessionStatus>().unwrap(),
            SessionStatus::InProgress
        );
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(SessionStatus::InProgress.label(), "In Progress");
        assert_eq!(SessionStatus::Scheduled.label(), "Scheduled");
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&SessionStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Aborted.is_terminal());
        assert!(!SessionStatus::InProgress.is_terminal());
        assert!(!SessionStatus::Scheduled.is_terminal());
    }

    #[test]
    fn test_new_session_defaults() {
        let session = TestSession::scheduled(SessionId::new(1), BankId::new(1), 3, Utc::now());
        assert_eq!(session.current_cycle, 1);
        assert_eq!(session.current_phase, Phase::Charge);
        assert_eq!(session.status, SessionStatus::Scheduled);
    }
}
