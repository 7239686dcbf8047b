//! In-memory local repository implementation.
//!
//! This module provides a local implementation of all repository traits
//! suitable for unit testing and local development. All data is stored in
//! memory behind a single `parking_lot::RwLock`; every state-machine
//! operation runs its whole read-modify-write under one write guard.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::api::{BankId, CycleId, ReadingId, SessionId, SessionInfo};
use crate::db::repository::*;
use crate::models::{
    BatteryBank, CycleStatus, NewBatteryBank, NewReading, Reading, ReadingCycle, ReadingType,
    SessionStatus, TestSession,
};
use crate::services::state_machine::{self, CcvOutcome, OcvOutcome, PhaseTransition};

/// In-memory local repository.
///
/// # Example
/// ```
/// use battery_endurance::db::repositories::LocalRepository;
/// use battery_endurance::db::repository::{ReadingRepository, SessionRepository};
/// use battery_endurance::models::NewBatteryBank;
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// rt.block_on(async {
///     let repo = LocalRepository::new();
///     let info = repo
///         .create_session(&NewBatteryBank::new("Bank A", None, 2), 1)
///         .await
///         .unwrap();
///     let outcome = repo.submit_ocv(info.session_id, &[3.7, 3.71], None).await.unwrap();
///     assert!(outcome.cycle_created);
/// });
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct LocalData {
    banks: HashMap<BankId, BatteryBank>,
    sessions: HashMap<SessionId, TestSession>,
    // creation order
    cycles: Vec<ReadingCycle>,
    // recording order
    readings: Vec<Reading>,

    // ID counters
    next_bank_id: i64,
    next_session_id: i64,
    next_cycle_id: i64,
    next_reading_id: i64,

    // Connection health
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            banks: HashMap::new(),
            sessions: HashMap::new(),
            cycles: Vec::new(),
            readings: Vec::new(),
            next_bank_id: 1,
            next_session_id: 1,
            next_cycle_id: 1,
            next_reading_id: 1,
            is_healthy: true,
        }
    }
}

impl LocalData {
    fn ensure_healthy(&self) -> RepositoryResult<()> {
        if !self.is_healthy {
            return Err(RepositoryError::unavailable("Database is not healthy"));
        }
        Ok(())
    }

    fn session(&self, session_id: SessionId, operation: &str) -> RepositoryResult<&TestSession> {
        self.sessions
            .get(&session_id)
            .ok_or_else(|| RepositoryError::session_not_found(session_id, operation))
    }

    fn bank(&self, bank_id: BankId, operation: &str) -> RepositoryResult<&BatteryBank> {
        self.banks
            .get(&bank_id)
            .ok_or_else(|| RepositoryError::bank_not_found(bank_id, operation))
    }

    fn active_cycle_index(&self, session: &TestSession) -> Option<usize> {
        self.cycles.iter().position(|c| {
            c.session_id == session.id
                && c.is_active_for(session.current_cycle, session.current_phase)
        })
    }

    fn push_readings(
        &mut self,
        cycle_id: CycleId,
        batch: Vec<NewReading>,
        timestamp: DateTime<Utc>,
    ) -> usize {
        let count = batch.len();
        for new in batch {
            let id = ReadingId::new(self.next_reading_id);
            self.next_reading_id += 1;
            self.readings.push(Reading {
                id,
                cycle_id,
                reading_type: new.reading_type,
                cell_number: new.cell_number,
                value: new.value,
                sequence_number: new.sequence_number,
                timestamp,
                phase: new.phase,
            });
        }
        count
    }

    /// Session and its bank's cell count, after the checks every write shares.
    fn writable_session(
        &self,
        session_id: SessionId,
        operation: &str,
    ) -> RepositoryResult<(TestSession, u32)> {
        self.ensure_healthy()?;
        let session = self.session(session_id, operation)?.clone();
        let num_cells = self.bank(session.bank_id, operation)?.num_cells;
        state_machine::ensure_accepts_readings(&session)?;
        Ok((session, num_cells))
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Clear all data from the repository.
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = LocalData {
            is_healthy: data.is_healthy,
            ..Default::default()
        };
    }

    /// Get the number of sessions stored.
    pub fn session_count(&self) -> usize {
        self.data.read().sessions.len()
    }

    /// Get the number of readings stored across all sessions.
    pub fn reading_count(&self) -> usize {
        self.data.read().readings.len()
    }

    /// Number of active cycles a session currently has.
    pub fn active_cycle_count(&self, session_id: SessionId) -> usize {
        self.data
            .read()
            .cycles
            .iter()
            .filter(|c| c.session_id == session_id && c.is_active())
            .count()
    }

    fn check_health(&self) -> RepositoryResult<()> {
        self.data.read().ensure_healthy()
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== Session Repository ====================

#[async_trait]
impl SessionRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn create_session(
        &self,
        bank: &NewBatteryBank,
        total_cycles: u32,
    ) -> RepositoryResult<SessionInfo> {
        let mut data = self.data.write();
        data.ensure_healthy()?;

        let now = Utc::now();
        let bank_id = BankId::new(data.next_bank_id);
        data.next_bank_id += 1;
        let session_id = SessionId::new(data.next_session_id);
        data.next_session_id += 1;

        data.banks.insert(
            bank_id,
            BatteryBank {
                id: bank_id,
                name: bank.name.clone(),
                description: bank.description.clone(),
                num_cells: bank.num_cells,
                created_at: now,
            },
        );
        data.sessions.insert(
            session_id,
            TestSession::scheduled(session_id, bank_id, total_cycles, now),
        );

        Ok(SessionInfo {
            session_id,
            bank_id,
        })
    }

    async fn get_session(&self, session_id: SessionId) -> RepositoryResult<TestSession> {
        let data = self.data.read();
        data.ensure_healthy()?;
        data.session(session_id, "get_session").cloned()
    }

    async fn get_bank(&self, bank_id: BankId) -> RepositoryResult<BatteryBank> {
        let data = self.data.read();
        data.ensure_healthy()?;
        data.bank(bank_id, "get_bank").cloned()
    }

    async fn list_sessions(&self) -> RepositoryResult<Vec<TestSession>> {
        self.check_health()?;
        let data = self.data.read();
        let mut sessions: Vec<TestSession> = data.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        Ok(sessions)
    }

    async fn update_session_status(
        &self,
        session_id: SessionId,
        status: SessionStatus,
    ) -> RepositoryResult<TestSession> {
        let mut data = self.data.write();
        data.ensure_healthy()?;
        let mut session = data.session(session_id, "update_session_status")?.clone();
        session.status = status;
        data.sessions.insert(session_id, session.clone());
        Ok(session)
    }
}

// ==================== Reading Repository ====================

#[async_trait]
impl ReadingRepository for LocalRepository {
    async fn submit_ocv(
        &self,
        session_id: SessionId,
        values: &[f64],
        ccv_interval: Option<u32>,
    ) -> RepositoryResult<OcvOutcome> {
        let mut data = self.data.write();
        let (mut session, num_cells) = data.writable_session(session_id, "submit_ocv")?;
        state_machine::validate_batch(num_cells, values)
            .map_err(|e| e.with_operation("submit_ocv"))?;

        let now = Utc::now();
        let active = data.active_cycle_index(&session);
        let (cycle, cycle_created) = match active {
            Some(idx) => (data.cycles[idx].clone(), false),
            None => {
                let cycle = ReadingCycle {
                    id: CycleId::new(data.next_cycle_id),
                    session_id,
                    cycle_number: session.current_cycle,
                    phase: session.current_phase,
                    ccv_interval,
                    start_time: now,
                    end_time: None,
                    status: CycleStatus::Active,
                };
                data.next_cycle_id += 1;
                data.cycles.push(cycle.clone());
                (cycle, true)
            }
        };

        let batch = state_machine::ocv_readings(session.current_phase, values);
        let readings_recorded = data.push_readings(cycle.id, batch, now);

        let session_started = state_machine::start_session(&mut session);
        data.sessions.insert(session_id, session.clone());

        Ok(OcvOutcome {
            session,
            cycle,
            cycle_created,
            session_started,
            readings_recorded,
        })
    }

    async fn submit_ccv(
        &self,
        session_id: SessionId,
        values: &[f64],
    ) -> RepositoryResult<CcvOutcome> {
        let mut data = self.data.write();
        let (session, num_cells) = data.writable_session(session_id, "submit_ccv")?;
        state_machine::validate_batch(num_cells, values)
            .map_err(|e| e.with_operation("submit_ccv"))?;

        let idx = data
            .active_cycle_index(&session)
            .ok_or_else(|| state_machine::no_active_cycle(&session, "submit_ccv"))?;
        let cycle = data.cycles[idx].clone();

        let existing = data
            .readings
            .iter()
            .filter(|r| r.cycle_id == cycle.id && r.reading_type == ReadingType::Ccv)
            .count();
        let sequence_number = state_machine::next_ccv_sequence(existing, num_cells);

        let batch = state_machine::ccv_readings(session.current_phase, values, sequence_number);
        let readings_recorded = data.push_readings(cycle.id, batch, Utc::now());

        Ok(CcvOutcome {
            session,
            cycle,
            sequence_number,
            readings_recorded,
        })
    }

    async fn end_phase(&self, session_id: SessionId) -> RepositoryResult<PhaseTransition> {
        let mut data = self.data.write();
        let (mut session, _) = data.writable_session(session_id, "end_phase")?;

        let idx = data
            .active_cycle_index(&session)
            .ok_or_else(|| state_machine::no_active_cycle(&session, "end_phase"))?;

        let ended_cycle = {
            let cycle = &mut data.cycles[idx];
            cycle.status = CycleStatus::Completed;
            cycle.end_time = Some(Utc::now());
            cycle.clone()
        };

        let step = state_machine::advance_phase(&mut session);
        data.sessions.insert(session_id, session.clone());

        Ok(PhaseTransition {
            session,
            ended_cycle,
            step,
        })
    }

    async fn list_cycles(&self, session_id: SessionId) -> RepositoryResult<Vec<ReadingCycle>> {
        let data = self.data.read();
        data.ensure_healthy()?;
        data.session(session_id, "list_cycles")?;
        Ok(data
            .cycles
            .iter()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn list_readings(&self, session_id: SessionId) -> RepositoryResult<Vec<Reading>> {
        let data = self.data.read();
        data.ensure_healthy()?;
        data.session(session_id, "list_readings")?;
        let cycle_ids: HashSet<CycleId> = data
            .cycles
            .iter()
            .filter(|c| c.session_id == session_id)
            .map(|c| c.id)
            .collect();
        Ok(data
            .readings
            .iter()
            .filter(|r| cycle_ids.contains(&r.cycle_id))
            .cloned()
            .collect())
    }

    async fn get_active_cycle(
        &self,
        session_id: SessionId,
    ) -> RepositoryResult<Option<ReadingCycle>> {
        let data = self.data.read();
        data.ensure_healthy()?;
        let session = data.session(session_id, "get_active_cycle")?;
        Ok(data
            .active_cycle_index(session)
            .map(|idx| data.cycles[idx].clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Phase;

    async fn three_cell_session(repo: &LocalRepository, total_cycles: u32) -> SessionId {
        repo.create_session(&NewBatteryBank::new("Bank", None, 3), total_cycles)
            .await
            .unwrap()
            .session_id
    }

    #[tokio::test]
    async fn test_health_check() {
        let repo = LocalRepository::new();
        assert!(repo.health_check().await.unwrap());

        repo.set_healthy(false);
        assert!(!repo.health_check().await.unwrap());
        assert!(repo.list_sessions().await.is_err());
    }

    #[tokio::test]
    async fn test_create_session_starts_scheduled() {
        let repo = LocalRepository::new();
        let id = three_cell_session(&repo, 2).await;

        let session = repo.get_session(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Scheduled);
        assert_eq!(session.current_cycle, 1);
        assert_eq!(session.current_phase, Phase::Charge);

        let bank = repo.get_bank(session.bank_id).await.unwrap();
        assert_eq!(bank.num_cells, 3);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let repo = LocalRepository::new();
        let err = repo.get_session(SessionId::new(99)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_ocv_reuses_active_cycle() {
        let repo = LocalRepository::new();
        let id = three_cell_session(&repo, 1).await;

        let first = repo.submit_ocv(id, &[3.7, 3.7, 3.7], Some(15)).await.unwrap();
        let second = repo.submit_ocv(id, &[3.8, 3.8, 3.8], None).await.unwrap();

        assert!(first.cycle_created);
        assert!(first.session_started);
        assert!(!second.cycle_created);
        assert!(!second.session_started);
        assert_eq!(first.cycle.id, second.cycle.id);
        assert_eq!(second.cycle.ccv_interval, Some(15));
        assert_eq!(repo.active_cycle_count(id), 1);
        assert_eq!(repo.reading_count(), 6);
    }

    #[tokio::test]
    async fn test_rejected_batch_writes_nothing() {
        let repo = LocalRepository::new();
        let id = three_cell_session(&repo, 1).await;

        let err = repo.submit_ocv(id, &[3.7, 3.7], None).await.unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(repo.reading_count(), 0);
        assert_eq!(repo.active_cycle_count(id), 0);
        assert_eq!(
            repo.get_session(id).await.unwrap().status,
            SessionStatus::Scheduled
        );
    }

    #[tokio::test]
    async fn test_clear_resets_counters() {
        let repo = LocalRepository::new();
        three_cell_session(&repo, 1).await;
        repo.clear();
        assert_eq!(repo.session_count(), 0);
        let id = three_cell_session(&repo, 1).await;
        assert_eq!(id.value(), 1);
    }
}
