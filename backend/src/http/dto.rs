//! Data Transfer Objects for the HTTP API.
//!
//! Request bodies and the response shapes that differ from the service
//! layer's own types. Views that already serialize well (session reports,
//! cycle tables) are re-exported from `api` and returned as is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub use crate::api::{
    CcvOutcome, CycleTable, ExportTable, ExportValue, OcvOutcome, Phase, PhaseTransition,
    SessionId, SessionInfo, SessionReport, SessionStatus, SessionSummary,
};
use crate::api::{CycleId, ExportColumn};

/// Request body for creating a bank and its test session.
///
/// Counts are plain integers so zero and negative values reach the service
/// layer and come back as invalid input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Bank name
    pub name: String,
    /// Optional free-form description of the bank
    #[serde(default)]
    pub description: Option<String>,
    /// Number of cells in the bank
    pub num_cells: i64,
    /// Number of charge/discharge cycles to run
    pub total_cycles: i64,
}

/// Request body for an OCV or CCV batch: one value per cell, in cell order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingsRequest {
    /// Reading values; numbers or numeric strings
    pub values: Vec<Value>,
    /// CCV sampling interval in seconds, stored on a newly opened cycle
    #[serde(default)]
    pub ccv_interval: Option<i64>,
}

/// Coerce a JSON value to a reading.
///
/// Numbers and numeric strings are accepted; any other JSON type is not a
/// reading. Finiteness is checked later with the batch.
pub fn coerce_reading(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("Reading {} is not representable as a float", n)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("Reading '{}' is not a number", s)),
        other => Err(format!("Reading {} is not a number", other)),
    }
}

/// Coerce every value of a batch, reporting the first offending position.
pub fn coerce_readings(values: &[Value]) -> Result<Vec<f64>, String> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| coerce_reading(v).map_err(|e| format!("Cell {}: {}", i + 1, e)))
        .collect()
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the service
    pub status: String,
    /// Version of the API
    pub version: String,
    /// Repository connection status
    pub database: String,
}

/// Session list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
    pub total: usize,
}

/// Response for an accepted OCV batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcvResponse {
    pub success: bool,
    pub session_id: SessionId,
    pub cycle_id: CycleId,
    pub cycle_number: u32,
    pub phase: Phase,
    pub cycle_created: bool,
    pub session_started: bool,
    pub readings_recorded: usize,
    pub status: SessionStatus,
}

impl From<OcvOutcome> for OcvResponse {
    fn from(outcome: OcvOutcome) -> Self {
        Self {
            success: true,
            session_id: outcome.session.id,
            cycle_id: outcome.cycle.id,
            cycle_number: outcome.cycle.cycle_number,
            phase: outcome.cycle.phase,
            cycle_created: outcome.cycle_created,
            session_started: outcome.session_started,
            readings_recorded: outcome.readings_recorded,
            status: outcome.session.status,
        }
    }
}

/// Response for an accepted CCV batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CcvResponse {
    pub success: bool,
    pub session_id: SessionId,
    pub cycle_id: CycleId,
    pub cycle_number: u32,
    pub phase: Phase,
    pub sequence_number: u32,
    pub readings_recorded: usize,
}

impl From<CcvOutcome> for CcvResponse {
    fn from(outcome: CcvOutcome) -> Self {
        Self {
            success: true,
            session_id: outcome.session.id,
            cycle_id: outcome.cycle.id,
            cycle_number: outcome.cycle.cycle_number,
            phase: outcome.cycle.phase,
            sequence_number: outcome.sequence_number,
            readings_recorded: outcome.readings_recorded,
        }
    }
}

/// Response for a phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndPhaseResponse {
    pub success: bool,
    /// True when this call finished the last cycle.
    pub completed: bool,
    pub session_id: SessionId,
    pub ended_cycle_id: CycleId,
    pub from_cycle: u32,
    pub from_phase: Phase,
    pub current_cycle: u32,
    pub current_phase: Phase,
    pub status: SessionStatus,
    pub progress: Option<f64>,
}

impl From<PhaseTransition> for EndPhaseResponse {
    fn from(transition: PhaseTransition) -> Self {
        let progress = crate::services::progress::progress(&transition.session);
        Self {
            success: true,
            completed: transition.step.session_completed,
            session_id: transition.session.id,
            ended_cycle_id: transition.ended_cycle.id,
            from_cycle: transition.step.from_cycle,
            from_phase: transition.step.from_phase,
            current_cycle: transition.step.to_cycle,
            current_phase: transition.step.to_phase,
            status: transition.session.status,
            progress,
        }
    }
}

/// Aggregated reading tables of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleTablesResponse {
    pub session_id: SessionId,
    pub cycles: Vec<CycleTable>,
}

/// One export row as a flat record: `cycle`, `phase`, `cell` and one key per
/// value column (`OCV`, `CCV-1`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub cycle: u32,
    pub phase: Phase,
    pub cell: u32,
    /// Capture time of each CCV column present in this row's cycle.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ccv_captured_at: BTreeMap<String, DateTime<Utc>>,
    #[serde(flatten)]
    pub values: BTreeMap<String, ExportValue>,
}

/// JSON export of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResponse {
    pub session_id: SessionId,
    /// Value column names in display order.
    pub columns: Vec<String>,
    pub rows: Vec<ExportRecord>,
}

impl From<ExportTable> for ExportResponse {
    fn from(table: ExportTable) -> Self {
        let rows = table
            .rows
            .iter()
            .map(|row| ExportRecord {
                cycle: row.cycle,
                phase: row.phase,
                cell: row.cell,
                ccv_captured_at: row
                    .ccv_captured_at
                    .iter()
                    .map(|(seq, at)| (ExportColumn::Ccv(*seq).name(), *at))
                    .collect(),
                values: row.named_values(&table.columns).into_iter().collect(),
            })
            .collect();
        Self {
            session_id: table.session_id,
            columns: table.columns.iter().map(ExportColumn::name).collect(),
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_numbers_and_numeric_strings() {
        assert_eq!(coerce_reading(&json!(3.7)).unwrap(), 3.7);
        assert_eq!(coerce_reading(&json!(4)).unwrap(), 4.0);
        assert_eq!(coerce_reading(&json!(" 3.65 ")).unwrap(), 3.65);
    }

    #[test]
    fn test_coerce_rejects_other_types() {
        assert!(coerce_reading(&json!("abc")).is_err());
        assert!(coerce_reading(&json!(null)).is_err());
        assert!(coerce_reading(&json!(true)).is_err());
        assert!(coerce_reading(&json!([3.7])).is_err());
    }

    #[test]
    fn test_coerce_readings_reports_cell() {
        let err = coerce_readings(&[json!(3.7), json!("x")]).unwrap_err();
        assert!(err.starts_with("Cell 2:"), "{}", err);
    }

    #[test]
    fn test_readings_request_interval_is_optional() {
        let req: ReadingsRequest = serde_json::from_value(json!({"values": [3.7, "3.6"]})).unwrap();
        assert_eq!(req.values.len(), 2);
        assert_eq!(req.ccv_interval, None);
    }
}
