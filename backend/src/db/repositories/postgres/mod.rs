//! Postgres repository implementation using Diesel.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Automatic retry for transient failures
//! - Automatic migration execution
//!
//! ## Atomicity
//!
//! Every state-machine operation runs in one transaction that first locks the
//! session row with `SELECT ... FOR UPDATE`, so concurrent submissions for the
//! same session are serialized. The partial unique index
//! `reading_cycles_one_active_idx` rejects a second active cycle for the same
//! (session, cycle, phase) at write time; that violation is retryable and the
//! replayed transaction then finds the cycle created by the winner.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
//! - `PG_MAX_RETRIES`: Maximum retry attempts for transient failures (default: 3)
//! - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)

use async_trait::async_trait;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;

use crate::api::{BankId, CycleId, SessionId, SessionInfo};
use crate::db::repository::{
    ErrorContext, ReadingRepository, RepositoryError, RepositoryResult, SessionRepository,
};
use crate::models::{
    BatteryBank, CycleStatus, NewBatteryBank, NewReading, Reading, ReadingCycle, ReadingType,
    SessionStatus, TestSession,
};
use crate::services::state_machine::{self, CcvOutcome, OcvOutcome, PhaseTransition};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Create configuration from environment variables.
    ///
    /// Unset or unparsable numeric variables fall back to the defaults listed
    /// in the module docs.
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        let defaults = Self::default();
        Ok(Self {
            database_url,
            max_pool_size: env_or("PG_POOL_MAX", defaults.max_pool_size),
            min_pool_size: env_or("PG_POOL_MIN", defaults.min_pool_size),
            connection_timeout_sec: env_or("PG_CONN_TIMEOUT_SEC", defaults.connection_timeout_sec),
            idle_timeout_sec: env_or("PG_IDLE_TIMEOUT_SEC", defaults.idle_timeout_sec),
            max_retries: env_or("PG_MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("PG_RETRY_DELAY_MS", defaults.retry_delay_ms),
        })
    }

    /// Create a new configuration with a database URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Pool health statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of connections currently in use
    pub connections_in_use: u32,
    /// Number of idle connections
    pub idle_connections: u32,
    /// Maximum pool size
    pub max_size: u32,
    /// Total operations executed
    pub total_queries: u64,
    /// Total failed operations
    pub failed_queries: u64,
    /// Total retried operations
    pub retried_operations: u64,
}

/// Diesel-backed repository for Postgres.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
    total_queries: Arc<AtomicU64>,
    failed_queries: Arc<AtomicU64>,
    retried_operations: Arc<AtomicU64>,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                RepositoryError::unavailable_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::unavailable_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
                RepositoryError::internal_with_context(
                    format!("Migration failed: {}", e),
                    ErrorContext::new("run_migrations"),
                )
            })?;
        }

        Ok(Self {
            pool,
            config,
            total_queries: Arc::new(AtomicU64::new(0)),
            failed_queries: Arc::new(AtomicU64::new(0)),
            retried_operations: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Run a blocking Diesel operation on the blocking pool, retrying
    /// retryable failures with exponential backoff.
    ///
    /// `f` is replayed from scratch on each attempt, so it must open its own
    /// transaction.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: Fn(&mut PgConnection) -> RepositoryResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let mut retry_delay = Duration::from_millis(self.config.retry_delay_ms);
        let total_queries = self.total_queries.clone();
        let failed_queries = self.failed_queries.clone();
        let retried_operations = self.retried_operations.clone();

        task::spawn_blocking(move || {
            let mut attempt = 0;
            loop {
                let result = pool
                    .get()
                    .map_err(|e| {
                        RepositoryError::unavailable_with_context(
                            e.to_string(),
                            ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1)),
                        )
                    })
                    .and_then(|mut conn| {
                        total_queries.fetch_add(1, Ordering::Relaxed);
                        f(&mut conn)
                    });

                match result {
                    Ok(value) => return Ok(value),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        log::warn!(
                            "{} failed (attempt {}), retrying in {:?}: {}",
                            operation,
                            attempt + 1,
                            retry_delay,
                            e
                        );
                        retried_operations.fetch_add(1, Ordering::Relaxed);
                        std::thread::sleep(retry_delay);
                        retry_delay *= 2;
                        attempt += 1;
                    }
                    Err(e) => {
                        failed_queries.fetch_add(1, Ordering::Relaxed);
                        return Err(e.with_operation(operation));
                    }
                }
            }
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }

    /// Get pool health statistics.
    pub fn get_pool_stats(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            connections_in_use: state.connections - state.idle_connections,
            idle_connections: state.idle_connections,
            max_size: self.config.max_pool_size,
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            retried_operations: self.retried_operations.load(Ordering::Relaxed),
        }
    }
}

// ==================== Transaction helpers ====================

fn load_session(
    tx: &mut PgConnection,
    session_id: SessionId,
    operation: &str,
) -> RepositoryResult<TestSession> {
    test_sessions::table
        .find(session_id.value())
        .select(SessionRow::as_select())
        .first::<SessionRow>(tx)
        .optional()?
        .ok_or_else(|| RepositoryError::session_not_found(session_id, operation))?
        .try_into()
}

/// Lock the session row for the rest of the transaction and run the checks
/// every write shares. Returns the session and its bank's cell count.
fn lock_writable_session(
    tx: &mut PgConnection,
    session_id: SessionId,
    operation: &str,
) -> RepositoryResult<(TestSession, u32)> {
    let session: TestSession = test_sessions::table
        .find(session_id.value())
        .select(SessionRow::as_select())
        .for_update()
        .first::<SessionRow>(tx)
        .optional()?
        .ok_or_else(|| RepositoryError::session_not_found(session_id, operation))?
        .try_into()?;

    let bank: BatteryBank = battery_banks::table
        .find(session.bank_id.value())
        .select(BankRow::as_select())
        .first::<BankRow>(tx)?
        .try_into()?;

    state_machine::ensure_accepts_readings(&session)?;
    Ok((session, bank.num_cells))
}

fn find_active_cycle(
    tx: &mut PgConnection,
    session: &TestSession,
) -> RepositoryResult<Option<ReadingCycle>> {
    reading_cycles::table
        .filter(reading_cycles::test_id.eq(session.id.value()))
        .filter(reading_cycles::cycle_number.eq(session.current_cycle as i32))
        .filter(reading_cycles::phase.eq(session.current_phase.as_str()))
        .filter(reading_cycles::status.eq(CycleStatus::Active.as_str()))
        .select(CycleRow::as_select())
        .first::<CycleRow>(tx)
        .optional()?
        .map(ReadingCycle::try_from)
        .transpose()
}

fn insert_readings(
    tx: &mut PgConnection,
    cycle_id: CycleId,
    batch: &[NewReading],
) -> RepositoryResult<usize> {
    let now = Utc::now();
    let rows: Vec<NewReadingRow> = batch
        .iter()
        .map(|r| NewReadingRow::from_new(cycle_id, r, now))
        .collect();
    Ok(diesel::insert_into(readings::table)
        .values(&rows)
        .execute(tx)?)
}

fn save_session_position(tx: &mut PgConnection, session: &TestSession) -> RepositoryResult<()> {
    diesel::update(test_sessions::table.find(session.id.value()))
        .set((
            test_sessions::status.eq(session.status.as_str()),
            test_sessions::current_cycle.eq(session.current_cycle as i32),
            test_sessions::current_phase.eq(session.current_phase.as_str()),
        ))
        .execute(tx)?;
    Ok(())
}

// ==================== Session Repository ====================

#[async_trait]
impl SessionRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn("health_check", |conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(RepositoryError::from)
        })
        .await
    }

    async fn create_session(
        &self,
        bank: &NewBatteryBank,
        total_cycles: u32,
    ) -> RepositoryResult<SessionInfo> {
        let bank = bank.clone();
        self.with_conn("create_session", move |conn| {
            conn.transaction::<_, RepositoryError, _>(|tx| {
                let now = Utc::now();
                let bank_id: i64 = diesel::insert_into(battery_banks::table)
                    .values(&NewBankRow {
                        name: bank.name.clone(),
                        description: bank.description.clone(),
                        num_cells: sql_int(bank.num_cells, "battery_banks", "num_cells")?,
                        created_at: now,
                    })
                    .returning(battery_banks::bank_id)
                    .get_result(tx)?;

                let test_id: i64 = diesel::insert_into(test_sessions::table)
                    .values(&NewSessionRow {
                        bank_id,
                        start_time: now,
                        status: SessionStatus::Scheduled.as_str().to_string(),
                        total_cycles: sql_int(total_cycles, "test_sessions", "total_cycles")?,
                        current_cycle: 1,
                        current_phase: crate::models::Phase::Charge.as_str().to_string(),
                    })
                    .returning(test_sessions::test_id)
                    .get_result(tx)?;

                Ok(SessionInfo {
                    session_id: SessionId::new(test_id),
                    bank_id: BankId::new(bank_id),
                })
            })
        })
        .await
    }

    async fn get_session(&self, session_id: SessionId) -> RepositoryResult<TestSession> {
        self.with_conn("get_session", move |conn| {
            load_session(conn, session_id, "get_session")
        })
        .await
    }

    async fn get_bank(&self, bank_id: BankId) -> RepositoryResult<BatteryBank> {
        self.with_conn("get_bank", move |conn| {
            battery_banks::table
                .find(bank_id.value())
                .select(BankRow::as_select())
                .first::<BankRow>(conn)
                .optional()?
                .ok_or_else(|| RepositoryError::bank_not_found(bank_id, "get_bank"))?
                .try_into()
        })
        .await
    }

    async fn list_sessions(&self) -> RepositoryResult<Vec<TestSession>> {
        self.with_conn("list_sessions", |conn| {
            test_sessions::table
                .order((test_sessions::start_time.desc(), test_sessions::test_id.desc()))
                .select(SessionRow::as_select())
                .load::<SessionRow>(conn)?
                .into_iter()
                .map(TestSession::try_from)
                .collect()
        })
        .await
    }

    async fn update_session_status(
        &self,
        session_id: SessionId,
        status: SessionStatus,
    ) -> RepositoryResult<TestSession> {
        self.with_conn("update_session_status", move |conn| {
            diesel::update(test_sessions::table.find(session_id.value()))
                .set(test_sessions::status.eq(status.as_str()))
                .returning(SessionRow::as_returning())
                .get_result::<SessionRow>(conn)
                .optional()?
                .ok_or_else(|| {
                    RepositoryError::session_not_found(session_id, "update_session_status")
                })?
                .try_into()
        })
        .await
    }
}

// ==================== Reading Repository ====================

#[async_trait]
impl ReadingRepository for PostgresRepository {
    async fn submit_ocv(
        &self,
        session_id: SessionId,
        values: &[f64],
        ccv_interval: Option<u32>,
    ) -> RepositoryResult<OcvOutcome> {
        let values = values.to_vec();
        self.with_conn("submit_ocv", move |conn| {
            conn.transaction::<_, RepositoryError, _>(|tx| {
                let (mut session, num_cells) =
                    lock_writable_session(tx, session_id, "submit_ocv")?;
                state_machine::validate_batch(num_cells, &values)?;

                let (cycle, cycle_created) = match find_active_cycle(tx, &session)? {
                    Some(cycle) => (cycle, false),
                    None => {
                        let row: CycleRow = diesel::insert_into(reading_cycles::table)
                            .values(&NewCycleRow {
                                test_id: session_id.value(),
                                cycle_number: session.current_cycle as i32,
                                phase: session.current_phase.as_str().to_string(),
                                ccv_interval: ccv_interval
                                    .map(|v| sql_int(v, "reading_cycles", "ccv_interval"))
                                    .transpose()?,
                                start_time: Utc::now(),
                                status: CycleStatus::Active.as_str().to_string(),
                            })
                            .returning(CycleRow::as_returning())
                            .get_result(tx)?;
                        (ReadingCycle::try_from(row)?, true)
                    }
                };

                let batch = state_machine::ocv_readings(session.current_phase, &values);
                let readings_recorded = insert_readings(tx, cycle.id, &batch)?;

                let session_started = state_machine::start_session(&mut session);
                if session_started {
                    save_session_position(tx, &session)?;
                }

                Ok(OcvOutcome {
                    session,
                    cycle,
                    cycle_created,
                    session_started,
                    readings_recorded,
                })
            })
        })
        .await
    }

    async fn submit_ccv(
        &self,
        session_id: SessionId,
        values: &[f64],
    ) -> RepositoryResult<CcvOutcome> {
        let values = values.to_vec();
        self.with_conn("submit_ccv", move |conn| {
            conn.transaction::<_, RepositoryError, _>(|tx| {
                let (session, num_cells) = lock_writable_session(tx, session_id, "submit_ccv")?;
                state_machine::validate_batch(num_cells, &values)?;

                let cycle = find_active_cycle(tx, &session)?
                    .ok_or_else(|| state_machine::no_active_cycle(&session, "submit_ccv"))?;

                let existing: i64 = readings::table
                    .filter(readings::cycle_id.eq(cycle.id.value()))
                    .filter(readings::reading_type.eq(ReadingType::Ccv.as_str()))
                    .count()
                    .get_result(tx)?;
                let sequence_number =
                    state_machine::next_ccv_sequence(existing.max(0) as usize, num_cells);

                let batch =
                    state_machine::ccv_readings(session.current_phase, &values, sequence_number);
                let readings_recorded = insert_readings(tx, cycle.id, &batch)?;

                Ok(CcvOutcome {
                    session,
                    cycle,
                    sequence_number,
                    readings_recorded,
                })
            })
        })
        .await
    }

    async fn end_phase(&self, session_id: SessionId) -> RepositoryResult<PhaseTransition> {
        self.with_conn("end_phase", move |conn| {
            conn.transaction::<_, RepositoryError, _>(|tx| {
                let (mut session, _) = lock_writable_session(tx, session_id, "end_phase")?;

                let active = find_active_cycle(tx, &session)?
                    .ok_or_else(|| state_machine::no_active_cycle(&session, "end_phase"))?;

                let ended_row: CycleRow =
                    diesel::update(reading_cycles::table.find(active.id.value()))
                        .set((
                            reading_cycles::status.eq(CycleStatus::Completed.as_str()),
                            reading_cycles::end_time.eq(Some(Utc::now())),
                        ))
                        .returning(CycleRow::as_returning())
                        .get_result(tx)?;

                let step = state_machine::advance_phase(&mut session);
                save_session_position(tx, &session)?;

                Ok(PhaseTransition {
                    session,
                    ended_cycle: ReadingCycle::try_from(ended_row)?,
                    step,
                })
            })
        })
        .await
    }

    async fn list_cycles(&self, session_id: SessionId) -> RepositoryResult<Vec<ReadingCycle>> {
        self.with_conn("list_cycles", move |conn| {
            load_session(conn, session_id, "list_cycles")?;
            reading_cycles::table
                .filter(reading_cycles::test_id.eq(session_id.value()))
                .order(reading_cycles::cycle_id.asc())
                .select(CycleRow::as_select())
                .load::<CycleRow>(conn)?
                .into_iter()
                .map(ReadingCycle::try_from)
                .collect()
        })
        .await
    }

    async fn list_readings(&self, session_id: SessionId) -> RepositoryResult<Vec<Reading>> {
        self.with_conn("list_readings", move |conn| {
            load_session(conn, session_id, "list_readings")?;
            readings::table
                .inner_join(reading_cycles::table)
                .filter(reading_cycles::test_id.eq(session_id.value()))
                .order(readings::reading_id.asc())
                .select(ReadingRow::as_select())
                .load::<ReadingRow>(conn)?
                .into_iter()
                .map(Reading::try_from)
                .collect()
        })
        .await
    }

    async fn get_active_cycle(
        &self,
        session_id: SessionId,
    ) -> RepositoryResult<Option<ReadingCycle>> {
        self.with_conn("get_active_cycle", move |conn| {
            let session = load_session(conn, session_id, "get_active_cycle")?;
            find_active_cycle(conn, &session)
        })
        .await
    }
}
