use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{CycleId, Phase, ReadingId, SessionId};

/// Status of a single reading cycle. Kept separate from
/// [`SessionStatus`](super::SessionStatus) even where the words overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Active,
    Completed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Active => "active",
            CycleStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CycleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(CycleStatus::Active),
            "completed" => Ok(CycleStatus::Completed),
            _ => Err(format!("Unknown cycle status: {}", s)),
        }
    }
}

/// Kind of voltage reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadingType {
    /// Open-circuit voltage, one per cell per phase.
    #[serde(rename = "OCV")]
    Ocv,
    /// Closed-circuit voltage, sampled in numbered batches.
    #[serde(rename = "CCV")]
    Ccv,
}

impl ReadingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingType::Ocv => "OCV",
            ReadingType::Ccv => "CCV",
        }
    }
}

impl fmt::Display for ReadingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OCV" => Ok(ReadingType::Ocv),
            "CCV" => Ok(ReadingType::Ccv),
            _ => Err(format!("Unknown reading type: {}", s)),
        }
    }
}

/// One phase of one cycle of a session, holding its readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingCycle {
    pub id: CycleId,
    pub session_id: SessionId,
    pub cycle_number: u32,
    pub phase: Phase,
    /// Operator-declared CCV sampling interval in seconds.
    pub ccv_interval: Option<u32>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: CycleStatus,
}

impl ReadingCycle {
    pub fn is_active(&self) -> bool {
        self.status == CycleStatus::Active
    }

    /// Whether this cycle is the active one for the given position.
    pub fn is_active_for(&self, cycle_number: u32, phase: Phase) -> bool {
        self.is_active() && self.cycle_number == cycle_number && self.phase == phase
    }
}

/// A single cell voltage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: ReadingId,
    pub cycle_id: CycleId,
    pub reading_type: ReadingType,
    pub cell_number: u32,
    pub value: f64,
    /// Batch number within the cycle; only set for CCV readings.
    pub sequence_number: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub phase: Phase,
}

/// A reading about to be written, before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub reading_type: ReadingType,
    pub cell_number: u32,
    pub value: f64,
    pub sequence_number: Option<u32>,
    pub phase: Phase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_type_serde_uppercase() {
        assert_eq!(serde_json::to_string(&ReadingType::Ocv).unwrap(), "\"OCV\"");
        assert_eq!(
            serde_json::from_str::<ReadingType>("\"CCV\"").unwrap(),
            ReadingType::Ccv
        );
    }

    #[test]
    fn test_cycle_status_parse() {
        assert_eq!("active".parse::<CycleStatus>().unwrap(), CycleStatus::Active);
        assert!("paused".parse::<CycleStatus>().is_err());
    }

    #[test]
    fn test_is_active_for() {
        let cycle = ReadingCycle {
            id: CycleId::new(1),
            session_id: SessionId::new(1),
            cycle_number: 2,
            phase: Phase::Discharge,
            ccv_interval: None,
            start_time: Utc::now(),
            end_time: None,
            status: CycleStatus::Active,
        };
        assert!(cycle.is_active_for(2, Phase::Discharge));
        assert!(!cycle.is_active_for(2, Phase::Charge));
        assert!(!cycle.is_active_for(1, Phase::Discharge));
    }
}
