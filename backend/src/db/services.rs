//! High-level database service layer.
//!
//! Repository-agnostic operations used by the HTTP layer. These functions
//! validate raw caller input, delegate the atomic state-machine work to the
//! repository and shape stored rows into display and export views.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  HTTP handlers (http/handlers.rs)                       │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Service Layer (services.rs)                            │
//! │  - Input validation, logging                            │
//! │  - Aggregation, progress, durations                     │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository Traits (repository/)                        │
//! │  - SessionRepository, ReadingRepository                 │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────┴────────────────┐
//! ┌───▼──────────────────┐  ┌──────────▼──────────────┐
//! │ Postgres Repository  │  │ Local Repository        │
//! │ (Diesel)             │  │ (in-memory)             │
//! └──────────────────────┘  └─────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use battery_endurance::db::{services, repositories::LocalRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = LocalRepository::new();
//!     let info = services::create_test_session(&repo, "Bank A", None, 3, 2).await?;
//!     services::submit_ocv(&repo, info.session_id, &[3.70, 3.71, 3.69], None).await?;
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::repository::{ErrorContext, FullRepository, RepositoryError, RepositoryResult};
use crate::api::{
    CycleSummary, CycleTable, ExportTable, SessionId, SessionInfo, SessionReport, SessionSummary,
};
use crate::models::{BatteryBank, NewBatteryBank, Reading, ReadingCycle, ReadingType, TestSession};
use crate::routes::export::{GET_CYCLE_TABLES, GET_EXPORT_ROWS};
use crate::routes::sessions::{
    CREATE_SESSION, END_PHASE, GET_SESSION_REPORT, LIST_SESSIONS, RECONCILE_STATUS, SUBMIT_CCV,
    SUBMIT_OCV,
};
use crate::services::aggregation::{aggregate_session, ccv_batch_count, export_rows};
use crate::services::progress::{duration, progress};
use crate::services::state_machine::{self, CcvOutcome, OcvOutcome, PhaseTransition};

/// Counts persist as INTEGER columns, so `i32::MAX` is the ceiling.
fn positive_count(value: i64, field: &str, operation: &str) -> RepositoryResult<u32> {
    if value <= 0 {
        return Err(RepositoryError::invalid_input_with_context(
            format!("{} must be a positive integer, got {}", field, value),
            ErrorContext::new(operation).with_details(field.to_string()),
        ));
    }
    i32::try_from(value)
        .map(i32::unsigned_abs)
        .map_err(|_| {
            RepositoryError::invalid_input_with_context(
                format!("{} is too large: {} (max {})", field, value, i32::MAX),
                ErrorContext::new(operation).with_details(field.to_string()),
            )
        })
}

fn log_rejection<T>(result: &RepositoryResult<T>, operation: &str, session_id: SessionId) {
    if let Err(e) = result {
        if e.is_invalid_input() || e.is_not_found() {
            warn!("{} rejected for session {}: {}", operation, session_id, e);
        }
    }
}

// ==================== Health & Connection ====================

/// Check if the database connection is healthy.
pub async fn health_check<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<bool> {
    repo.health_check().await
}

// ==================== Session Operations ====================

/// Create a battery bank and its test session.
///
/// Counts arrive as raw integers so that zero and negative values can be
/// reported as invalid input rather than failing to deserialize.
pub async fn create_test_session<R: FullRepository + ?Sized>(
    repo: &R,
    name: &str,
    description: Option<String>,
    num_cells: i64,
    total_cycles: i64,
) -> RepositoryResult<SessionInfo> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RepositoryError::invalid_input_with_context(
            "Bank name must not be empty",
            ErrorContext::new(CREATE_SESSION).with_details("name"),
        ));
    }
    let num_cells = positive_count(num_cells, "num_cells", CREATE_SESSION)?;
    let total_cycles = positive_count(total_cycles, "total_cycles", CREATE_SESSION)?;

    let description = description.filter(|d| !d.trim().is_empty());
    let bank = NewBatteryBank::new(name, description, num_cells);
    let info = repo.create_session(&bank, total_cycles).await?;

    info!(
        "Created session {} for bank '{}' ({} cells, {} cycles)",
        info.session_id, name, num_cells, total_cycles
    );
    Ok(info)
}

/// All sessions with their bank, status label and progress, newest first.
pub async fn list_session_summaries<R: FullRepository + ?Sized>(
    repo: &R,
) -> RepositoryResult<Vec<SessionSummary>> {
    let sessions = repo
        .list_sessions()
        .await
        .map_err(|e| e.with_operation(LIST_SESSIONS))?;
    let mut summaries = Vec::with_capacity(sessions.len());
    for session in sessions {
        let bank = repo.get_bank(session.bank_id).await?;
        summaries.push(SessionSummary::new(&session, &bank, progress(&session)));
    }
    Ok(summaries)
}

/// Recompute a session's status from its cycles and position, persisting it
/// if it drifted.
pub async fn reconcile_status<R: FullRepository + ?Sized>(
    repo: &R,
    session_id: SessionId,
) -> RepositoryResult<TestSession> {
    let session = repo
        .get_session(session_id)
        .await
        .map_err(|e| e.with_operation(RECONCILE_STATUS))?;
    let has_cycles = !repo.list_cycles(session_id).await?.is_empty();
    let derived =
        state_machine::derive_status(has_cycles, session.current_cycle, session.total_cycles);

    if derived == session.status {
        debug!("Session {} status {} is consistent", session_id, derived);
        return Ok(session);
    }

    warn!(
        "Session {} status drifted: stored {}, derived {}",
        session_id, session.status, derived
    );
    repo.update_session_status(session_id, derived).await
}

// ==================== Reading Operations ====================

/// Record an OCV batch for the session's current phase.
pub async fn submit_ocv<R: FullRepository + ?Sized>(
    repo: &R,
    session_id: SessionId,
    values: &[f64],
    ccv_interval: Option<i64>,
) -> RepositoryResult<OcvOutcome> {
    let ccv_interval = ccv_interval
        .map(|v| positive_count(v, "ccv_interval", SUBMIT_OCV))
        .transpose()?;

    let result = repo.submit_ocv(session_id, values, ccv_interval).await;
    log_rejection(&result, SUBMIT_OCV, session_id);
    let outcome = result?;

    if outcome.session_started {
        info!("Session {} started", session_id);
    }
    info!(
        "Recorded {} OCV readings for session {} (cycle {}, {}{})",
        outcome.readings_recorded,
        session_id,
        outcome.cycle.cycle_number,
        outcome.cycle.phase,
        if outcome.cycle_created { ", new cycle" } else { "" }
    );
    Ok(outcome)
}

/// Record a CCV batch under the next sequence number of the active cycle.
pub async fn submit_ccv<R: FullRepository + ?Sized>(
    repo: &R,
    session_id: SessionId,
    values: &[f64],
) -> RepositoryResult<CcvOutcome> {
    let result = repo.submit_ccv(session_id, values).await;
    log_rejection(&result, SUBMIT_CCV, session_id);
    let outcome = result?;

    info!(
        "Recorded CCV batch {} for session {} (cycle {}, {})",
        outcome.sequence_number,
        session_id,
        outcome.cycle.cycle_number,
        outcome.cycle.phase
    );
    Ok(outcome)
}

/// End the current phase and advance the session.
pub async fn end_phase<R: FullRepository + ?Sized>(
    repo: &R,
    session_id: SessionId,
) -> RepositoryResult<PhaseTransition> {
    let result = repo.end_phase(session_id).await;
    log_rejection(&result, END_PHASE, session_id);
    let transition = result?;

    let step = transition.step;
    info!(
        "Session {}: cycle {} {} -> cycle {} {}",
        session_id, step.from_cycle, step.from_phase, step.to_cycle, step.to_phase
    );
    if step.session_completed {
        info!("Session {} completed", session_id);
    }
    Ok(transition)
}

// ==================== Views ====================

struct SessionData {
    session: TestSession,
    bank: BatteryBank,
    cycles: Vec<ReadingCycle>,
    readings: Vec<Reading>,
}

async fn load_session_data<R: FullRepository + ?Sized>(
    repo: &R,
    session_id: SessionId,
) -> RepositoryResult<SessionData> {
    let session = repo.get_session(session_id).await?;
    let bank = repo.get_bank(session.bank_id).await?;
    let cycles = repo.list_cycles(session_id).await?;
    let readings = repo.list_readings(session_id).await?;
    Ok(SessionData {
        session,
        bank,
        cycles,
        readings,
    })
}

/// Per-cycle reading tables in (cycle number, phase) order.
pub async fn get_cycle_tables<R: FullRepository + ?Sized>(
    repo: &R,
    session_id: SessionId,
) -> RepositoryResult<Vec<CycleTable>> {
    let data = load_session_data(repo, session_id)
        .await
        .map_err(|e| e.with_operation(GET_CYCLE_TABLES))?;
    Ok(aggregate_session(&data.cycles, &data.readings, data.bank.num_cells))
}

/// One row per (cycle, cell) with OCV and every CCV column of the session.
pub async fn get_export_table<R: FullRepository + ?Sized>(
    repo: &R,
    session_id: SessionId,
) -> RepositoryResult<ExportTable> {
    let tables = get_cycle_tables(repo, session_id)
        .await
        .map_err(|e| e.with_operation(GET_EXPORT_ROWS))?;
    let export = export_rows(session_id, &tables);
    debug!(
        "Export for session {}: {} rows, {} columns",
        session_id,
        export.rows.len(),
        export.columns.len()
    );
    Ok(export)
}

/// Instant a session's elapsed time is measured to: the last cycle end once
/// completed, otherwise `now`.
fn session_end(session: &TestSession, cycles: &[ReadingCycle], now: DateTime<Utc>) -> DateTime<Utc> {
    if session.is_completed() {
        cycles.iter().filter_map(|c| c.end_time).max().unwrap_or(now)
    } else {
        now
    }
}

/// Session, bank, progress and per-cycle durations.
pub async fn get_session_report<R: FullRepository + ?Sized>(
    repo: &R,
    session_id: SessionId,
) -> RepositoryResult<SessionReport> {
    let data = load_session_data(repo, session_id)
        .await
        .map_err(|e| e.with_operation(GET_SESSION_REPORT))?;

    let mut ordered: Vec<&ReadingCycle> = data.cycles.iter().collect();
    ordered.sort_by_key(|c| (c.cycle_number, c.phase, c.id));

    let cycles = ordered
        .into_iter()
        .map(|cycle| {
            let elapsed = duration(cycle.start_time, cycle.end_time);
            CycleSummary {
                cycle: cycle.clone(),
                status: cycle.status,
                duration: elapsed,
                duration_label: elapsed.to_string(),
                ocv_count: data
                    .readings
                    .iter()
                    .filter(|r| r.cycle_id == cycle.id && r.reading_type == ReadingType::Ocv)
                    .count(),
                ccv_batches: ccv_batch_count(cycle, &data.readings),
            }
        })
        .collect();

    let end = session_end(&data.session, &data.cycles, Utc::now());
    let elapsed = duration(data.session.start_time, Some(end));

    Ok(SessionReport {
        status_label: data.session.status.label().to_string(),
        progress: progress(&data.session),
        duration: elapsed,
        duration_label: elapsed.to_string(),
        cycles,
        session: data.session,
        bank: data.bank,
    })
}

#[cfg(test)]
#[path = "services_tests.rs"]
mod services_tests;
