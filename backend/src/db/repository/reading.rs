//! Reading repository trait.
//!
//! The three write operations are the session state machine. Each must run
//! atomically: implementations validate, apply the rules in
//! [`crate::services::state_machine`] and persist the result under a single
//! lock or transaction, so a rejected batch leaves nothing behind and two
//! concurrent OCV submissions never open two active cycles for the same
//! (cycle, phase).

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::SessionId;
use crate::models::{Reading, ReadingCycle};
use crate::services::state_machine::{CcvOutcome, OcvOutcome, PhaseTransition};

/// Repository trait for reading cycles and readings.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait ReadingRepository: Send + Sync {
    // ==================== State Machine ====================

    /// Record one OCV value per cell for the current phase.
    ///
    /// Opens the active cycle for (current_cycle, current_phase) if needed,
    /// storing `ccv_interval` on it, and moves a scheduled session to
    /// `in_progress`.
    ///
    /// # Returns
    /// * `Err(RepositoryError::InvalidInput)` - Wrong batch size, a
    ///   non-finite value, or a terminal session
    /// * `Err(RepositoryError::NotFound)` - If the session doesn't exist
    async fn submit_ocv(
        &self,
        session_id: SessionId,
        values: &[f64],
        ccv_interval: Option<u32>,
    ) -> RepositoryResult<OcvOutcome>;

    /// Record one CCV value per cell under the next sequence number.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If no cycle is active for the
    ///   current phase
    async fn submit_ccv(
        &self,
        session_id: SessionId,
        values: &[f64],
    ) -> RepositoryResult<CcvOutcome>;

    /// Close the active cycle and advance the session to the next phase.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If no cycle is active for the
    ///   current phase, including when the phase was already ended
    async fn end_phase(&self, session_id: SessionId) -> RepositoryResult<PhaseTransition>;

    // ==================== Queries ====================

    /// All cycles of a session in creation order.
    async fn list_cycles(&self, session_id: SessionId) -> RepositoryResult<Vec<ReadingCycle>>;

    /// All readings of a session in recording order.
    async fn list_readings(&self, session_id: SessionId) -> RepositoryResult<Vec<Reading>>;

    /// The active cycle for the session's current (cycle, phase), if any.
    async fn get_active_cycle(
        &self,
        session_id: SessionId,
    ) -> RepositoryResult<Option<ReadingCycle>>;
}
