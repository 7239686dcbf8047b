//! Progress and duration helpers for display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{Phase, TestSession};

/// Percentage of phases completed for a session position.
///
/// Each cycle has two phases. Returns `None` when `total_cycles` is zero.
pub fn progress_for(total_cycles: u32, current_cycle: u32, current_phase: Phase) -> Option<f64> {
    if total_cycles == 0 {
        return None;
    }
    let total_phases = total_cycles as f64 * 2.0;
    let mut completed_phases = current_cycle.saturating_sub(1) as f64 * 2.0;
    if current_phase == Phase::Discharge {
        completed_phases += 1.0;
    }
    Some(completed_phases / total_phases * 100.0)
}

pub fn progress(session: &TestSession) -> Option<f64> {
    progress_for(
        session.total_cycles,
        session.current_cycle,
        session.current_phase,
    )
}

/// Elapsed time between two instants, or a running marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ElapsedTime {
    InProgress,
    Elapsed { hours: i64, minutes: i64 },
}

impl fmt::Display for ElapsedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElapsedTime::InProgress => f.write_str("In Progress"),
            ElapsedTime::Elapsed { hours, minutes } => write!(f, "{}h {}m", hours, minutes),
        }
    }
}

/// Whole hours and remaining whole minutes from `start` to `end`.
///
/// Hours are not wrapped at a day boundary; a negative span reads as zero.
pub fn duration(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> ElapsedTime {
    let Some(end) = end else {
        return ElapsedTime::InProgress;
    };
    let seconds = (end - start).num_seconds().max(0);
    ElapsedTime::Elapsed {
        hours: seconds / 3600,
        minutes: (seconds % 3600) / 60,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_progress_fresh_session_is_zero() {
        assert_eq!(progress_for(2, 1, Phase::Charge), Some(0.0));
    }

    #[test]
    fn test_progress_counts_half_cycles() {
        assert_eq!(progress_for(2, 1, Phase::Discharge), Some(25.0));
        assert_eq!(progress_for(2, 2, Phase::Charge), Some(50.0));
        assert_eq!(progress_for(2, 2, Phase::Discharge), Some(75.0));
        assert_eq!(progress_for(2, 3, Phase::Charge), Some(100.0));
    }

    #[test]
    fn test_progress_zero_cycles_is_undefined() {
        assert_eq!(progress_for(0, 1, Phase::Charge), None);
    }

    #[test]
    fn test_duration_in_progress() {
        let start = Utc::now();
        assert_eq!(duration(start, None), ElapsedTime::InProgress);
        assert_eq!(duration(start, None).to_string(), "In Progress");
    }

    #[test]
    fn test_duration_floors_minutes() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let end = start + Duration::seconds(2 * 3600 + 5 * 60 + 59);
        let elapsed = duration(start, Some(end));
        assert_eq!(elapsed, ElapsedTime::Elapsed { hours: 2, minutes: 5 });
        assert_eq!(elapsed.to_string(), "2h 5m");
    }

    #[test]
    fn test_duration_does_not_wrap_days() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let end = start + Duration::hours(26) + Duration::minutes(30);
        assert_eq!(duration(start, Some(end)).to_string(), "26h 30m");
    }

    #[test]
    fn test_duration_negative_span_is_zero() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let end = start - Duration::minutes(10);
        assert_eq!(duration(start, Some(end)).to_string(), "0h 0m");
    }
}
