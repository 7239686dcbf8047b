//! Session repository trait: banks, test sessions and connection health.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{BankId, SessionId, SessionInfo};
use crate::models::{BatteryBank, NewBatteryBank, SessionStatus, TestSession};

/// Repository trait for bank and session records.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    // ==================== Health & Connection ====================

    /// Check if the database connection is healthy.
    ///
    /// # Returns
    /// - `Ok(true)` if connection is healthy
    /// - `Ok(false)` if connection is unhealthy but no error occurred
    /// - `Err(RepositoryError)` if an error occurred during the check
    async fn health_check(&self) -> RepositoryResult<bool>;

    // ==================== Session Operations ====================

    /// Store a new battery bank together with its test session.
    ///
    /// The session starts `scheduled` at cycle 1, charge phase. Callers are
    /// expected to have validated `num_cells` and `total_cycles` already.
    ///
    /// # Returns
    /// * `Ok(SessionInfo)` - The ids assigned to the session and the bank
    /// * `Err(RepositoryError)` - If the operation fails
    async fn create_session(
        &self,
        bank: &NewBatteryBank,
        total_cycles: u32,
    ) -> RepositoryResult<SessionInfo>;

    /// Retrieve a session by ID.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If the session doesn't exist
    async fn get_session(&self, session_id: SessionId) -> RepositoryResult<TestSession>;

    /// Retrieve a battery bank by ID.
    async fn get_bank(&self, bank_id: BankId) -> RepositoryResult<BatteryBank>;

    /// List all sessions, newest first.
    async fn list_sessions(&self) -> RepositoryResult<Vec<TestSession>>;

    /// Overwrite the stored status of a session and return the updated row.
    async fn update_session_status(
        &self,
        session_id: SessionId,
        status: SessionStatus,
    ) -> RepositoryResult<TestSession>;
}
