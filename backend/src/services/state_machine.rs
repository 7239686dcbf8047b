//! Cycle/phase state machine for test sessions.
//!
//! Every function here is pure: it inspects or mutates an in-memory
//! [`TestSession`] and returns what changed. Repository implementations call
//! these functions inside their own write transaction so that all backends
//! share one set of transition rules.
//!
//! ```text
//!   scheduled ──first OCV──▶ in_progress ──last end_phase──▶ completed
//!
//!   per cycle:  charge ──end_phase──▶ discharge ──end_phase──▶ charge (cycle + 1)
//! ```

use serde::{Deserialize, Serialize};

use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};
use crate::models::{NewReading, Phase, ReadingCycle, ReadingType, SessionStatus, TestSession};

/// Result of recording an OCV batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcvOutcome {
    pub session: TestSession,
    pub cycle: ReadingCycle,
    /// False when the batch was appended to an already active cycle.
    pub cycle_created: bool,
    /// True when this batch moved the session out of `scheduled`.
    pub session_started: bool,
    pub readings_recorded: usize,
}

/// Result of recording a CCV batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CcvOutcome {
    pub session: TestSession,
    pub cycle: ReadingCycle,
    pub sequence_number: u32,
    pub readings_recorded: usize,
}

/// Where a session was and where it moved to after `end_phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseStep {
    pub from_cycle: u32,
    pub from_phase: Phase,
    pub to_cycle: u32,
    pub to_phase: Phase,
    /// True when this step exhausted the last cycle.
    pub session_completed: bool,
}

/// Result of ending the current phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub session: TestSession,
    /// The cycle that was closed, with its end time stamped.
    pub ended_cycle: ReadingCycle,
    pub step: PhaseStep,
}

/// Reject a batch whose size does not match the bank or that carries
/// non-finite values.
pub fn validate_batch(num_cells: u32, values: &[f64]) -> RepositoryResult<()> {
    if values.len() != num_cells as usize {
        return Err(RepositoryError::invalid_input_with_context(
            format!(
                "Expected {} readings (one per cell), got {}",
                num_cells,
                values.len()
            ),
            ErrorContext::new("validate_batch").with_entity("reading"),
        ));
    }

    if let Some(position) = values.iter().position(|v| !v.is_finite()) {
        return Err(RepositoryError::invalid_input_with_context(
            format!("Reading for cell {} is not a finite number", position + 1),
            ErrorContext::new("validate_batch").with_entity("reading"),
        ));
    }

    Ok(())
}

/// Reject operations on a session that has reached a terminal status.
pub fn ensure_accepts_readings(session: &TestSession) -> RepositoryResult<()> {
    if session.status.is_terminal() {
        return Err(RepositoryError::invalid_input_with_context(
            format!("Session {} is {}", session.id, session.status),
            ErrorContext::new("ensure_accepts_readings")
                .with_entity("session")
                .with_entity_id(session.id),
        ));
    }
    Ok(())
}

/// Move a scheduled session to `in_progress`. Returns whether it changed.
pub fn start_session(session: &mut TestSession) -> bool {
    if session.status == SessionStatus::Scheduled {
        session.status = SessionStatus::InProgress;
        true
    } else {
        false
    }
}

/// Sequence number for the next CCV batch of a cycle.
///
/// A sequence advances only once a full batch (one value per cell) has been
/// recorded: `floor(existing / num_cells) + 1`. A trailing partial batch keeps
/// its sequence number.
pub fn next_ccv_sequence(existing_ccv_readings: usize, num_cells: u32) -> u32 {
    let cells = num_cells.max(1) as usize;
    (existing_ccv_readings / cells) as u32 + 1
}

/// Advance the session past its current phase.
///
/// charge → discharge keeps the cycle number; discharge → charge increments
/// it. Once `current_cycle` passes `total_cycles` the session is completed.
pub fn advance_phase(session: &mut TestSession) -> PhaseStep {
    let from_cycle = session.current_cycle;
    let from_phase = session.current_phase;

    session.current_phase = from_phase.next();
    if from_phase == Phase::Discharge {
        session.current_cycle += 1;
    }

    let session_completed = session.current_cycle > session.total_cycles;
    if session_completed {
        session.status = SessionStatus::Completed;
    }

    PhaseStep {
        from_cycle,
        from_phase,
        to_cycle: session.current_cycle,
        to_phase: session.current_phase,
        session_completed,
    }
}

/// Status implied by a session's position and whether it has any cycles.
pub fn derive_status(has_cycles: bool, current_cycle: u32, total_cycles: u32) -> SessionStatus {
    if !has_cycles {
        SessionStatus::Scheduled
    } else if current_cycle > total_cycles {
        SessionStatus::Completed
    } else {
        SessionStatus::InProgress
    }
}

/// One OCV reading per cell, numbered from 1 in submission order.
pub fn ocv_readings(phase: Phase, values: &[f64]) -> Vec<NewReading> {
    values
        .iter()
        .enumerate()
        .map(|(idx, value)| NewReading {
            reading_type: ReadingType::Ocv,
            cell_number: idx as u32 + 1,
            value: *value,
            sequence_number: None,
            phase,
        })
        .collect()
}

/// One CCV reading per cell, all sharing `sequence_number`.
pub fn ccv_readings(phase: Phase, values: &[f64], sequence_number: u32) -> Vec<NewReading> {
    values
        .iter()
        .enumerate()
        .map(|(idx, value)| NewReading {
            reading_type: ReadingType::Ccv,
            cell_number: idx as u32 + 1,
            value: *value,
            sequence_number: Some(sequence_number),
            phase,
        })
        .collect()
}

/// NotFound error for an operation that needs the current phase's active cycle.
pub fn no_active_cycle(session: &TestSession, operation: &str) -> RepositoryError {
    RepositoryError::not_found_with_context(
        format!(
            "No active reading cycle for session {} (cycle {}, {})",
            session.id, session.current_cycle, session.current_phase
        ),
        ErrorContext::new(operation)
            .with_entity("cycle")
            .with_entity_id(session.id),
    )
}
