use serde::{Deserialize, Serialize};

use crate::api::{BankId, SessionId};
use crate::models::{BatteryBank, CycleStatus, Phase, ReadingCycle, SessionStatus, TestSession};
use crate::services::progress::ElapsedTime;

/// Identifiers returned when a bank and its session are created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub bank_id: BankId,
}

/// Dashboard line for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub bank_id: BankId,
    pub bank_name: String,
    pub num_cells: u32,
    pub status: SessionStatus,
    pub status_label: String,
    pub total_cycles: u32,
    pub current_cycle: u32,
    pub current_phase: Phase,
    /// Percentage of phases completed; absent when `total_cycles` is zero.
    pub progress: Option<f64>,
}

impl SessionSummary {
    pub fn new(session: &TestSession, bank: &BatteryBank, progress: Option<f64>) -> Self {
        Self {
            session_id: session.id,
            bank_id: bank.id,
            bank_name: bank.name.clone(),
            num_cells: bank.num_cells,
            status: session.status,
            status_label: session.status.label().to_string(),
            total_cycles: session.total_cycles,
            current_cycle: session.current_cycle,
            current_phase: session.current_phase,
            progress,
        }
    }
}

/// A cycle phase with its formatted duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle: ReadingCycle,
    pub status: CycleStatus,
    pub duration: ElapsedTime,
    pub duration_label: String,
    pub ocv_count: usize,
    pub ccv_batches: u32,
}

/// Full detail view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session: TestSession,
    pub bank: BatteryBank,
    pub status_label: String,
    pub progress: Option<f64>,
    pub duration: ElapsedTime,
    pub duration_label: String,
    pub cycles: Vec<CycleSummary>,
}

pub const LIST_SESSIONS: &str = "list_sessions";
pub const CREATE_SESSION: &str = "create_session";
pub const GET_SESSION_REPORT: &str = "get_session_report";
pub const SUBMIT_OCV: &str = "submit_ocv";
pub const SUBMIT_CCV: &str = "submit_ccv";
pub const END_PHASE: &str = "end_phase";
pub const RECONCILE_STATUS: &str = "reconcile_status";
