use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::str::FromStr;

use super::schema::{battery_banks, reading_cycles, readings, test_sessions};
use crate::api::{BankId, CycleId, ReadingId, SessionId};
use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};
use crate::models::{
    BatteryBank, CycleStatus, NewReading, Phase, Reading, ReadingCycle, ReadingType,
    SessionStatus, TestSession,
};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = battery_banks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BankRow {
    pub bank_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub num_cells: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = battery_banks)]
pub struct NewBankRow {
    pub name: String,
    pub description: Option<String>,
    pub num_cells: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = test_sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SessionRow {
    pub test_id: i64,
    pub bank_id: i64,
    pub start_time: DateTime<Utc>,
    pub status: String,
    pub total_cycles: i32,
    pub current_cycle: i32,
    pub current_phase: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = test_sessions)]
pub struct NewSessionRow {
    pub bank_id: i64,
    pub start_time: DateTime<Utc>,
    pub status: String,
    pub total_cycles: i32,
    pub current_cycle: i32,
    pub current_phase: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = reading_cycles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CycleRow {
    pub cycle_id: i64,
    pub test_id: i64,
    pub cycle_number: i32,
    pub phase: String,
    pub ccv_interval: Option<i32>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reading_cycles)]
pub struct NewCycleRow {
    pub test_id: i64,
    pub cycle_number: i32,
    pub phase: String,
    pub ccv_interval: Option<i32>,
    pub start_time: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = readings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReadingRow {
    pub reading_id: i64,
    pub cycle_id: i64,
    pub reading_type: String,
    pub cell_number: i32,
    pub value: f64,
    pub sequence_number: Option<i32>,
    pub recorded_at: DateTime<Utc>,
    pub phase: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = readings)]
pub struct NewReadingRow {
    pub cycle_id: i64,
    pub reading_type: String,
    pub cell_number: i32,
    pub value: f64,
    pub sequence_number: Option<i32>,
    pub recorded_at: DateTime<Utc>,
    pub phase: String,
}

impl NewReadingRow {
    pub fn from_new(cycle_id: CycleId, reading: &NewReading, recorded_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id: cycle_id.value(),
            reading_type: reading.reading_type.as_str().to_string(),
            cell_number: reading.cell_number as i32,
            value: reading.value,
            sequence_number: reading.sequence_number.map(|s| s as i32),
            recorded_at,
            phase: reading.phase.as_str().to_string(),
        }
    }
}

// ==================== Row -> domain conversions ====================

fn column<T: FromStr<Err = String>>(raw: &str, table: &str, field: &str) -> RepositoryResult<T> {
    T::from_str(raw).map_err(|e| {
        RepositoryError::internal_with_context(
            e,
            ErrorContext::new("decode_row")
                .with_entity(table)
                .with_details(field.to_string()),
        )
    })
}

fn unsigned(raw: i32, table: &str, field: &str) -> RepositoryResult<u32> {
    u32::try_from(raw).map_err(|_| {
        RepositoryError::internal_with_context(
            format!("negative value {} in {}.{}", raw, table, field),
            ErrorContext::new("decode_row").with_entity(table),
        )
    })
}

/// A count bound for an INTEGER column.
pub fn sql_int(value: u32, table: &str, field: &str) -> RepositoryResult<i32> {
    i32::try_from(value).map_err(|_| {
        RepositoryError::invalid_input_with_context(
            format!("{} is too large: {}", field, value),
            ErrorContext::new("encode_row")
                .with_entity(table)
                .with_details(field.to_string()),
        )
    })
}

impl TryFrom<BankRow> for BatteryBank {
    type Error = RepositoryError;

    fn try_from(row: BankRow) -> RepositoryResult<Self> {
        Ok(BatteryBank {
            id: BankId::new(row.bank_id),
            name: row.name,
            description: row.description,
            num_cells: unsigned(row.num_cells, "battery_banks", "num_cells")?,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<SessionRow> for TestSession {
    type Error = RepositoryError;

    fn try_from(row: SessionRow) -> RepositoryResult<Self> {
        Ok(TestSession {
            id: SessionId::new(row.test_id),
            bank_id: BankId::new(row.bank_id),
            start_time: row.start_time,
            status: column::<SessionStatus>(&row.status, "test_sessions", "status")?,
            total_cycles: unsigned(row.total_cycles, "test_sessions", "total_cycles")?,
            current_cycle: unsigned(row.current_cycle, "test_sessions", "current_cycle")?,
            current_phase: column::<Phase>(&row.current_phase, "test_sessions", "current_phase")?,
        })
    }
}

impl TryFrom<CycleRow> for ReadingCycle {
    type Error = RepositoryError;

    fn try_from(row: CycleRow) -> RepositoryResult<Self> {
        Ok(ReadingCycle {
            id: CycleId::new(row.cycle_id),
            session_id: SessionId::new(row.test_id),
            cycle_number: unsigned(row.cycle_number, "reading_cycles", "cycle_number")?,
            phase: column::<Phase>(&row.phase, "reading_cycles", "phase")?,
            ccv_interval: row
                .ccv_interval
                .map(|v| unsigned(v, "reading_cycles", "ccv_interval"))
                .transpose()?,
            start_time: row.start_time,
            end_time: row.end_time,
            status: column::<CycleStatus>(&row.status, "reading_cycles", "status")?,
        })
    }
}

impl TryFrom<ReadingRow> for Reading {
    type Error = RepositoryError;

    fn try_from(row: ReadingRow) -> RepositoryResult<Self> {
        Ok(Reading {
            id: ReadingId::new(row.reading_id),
            cycle_id: CycleId::new(row.cycle_id),
            reading_type: column::<ReadingType>(&row.reading_type, "readings", "reading_type")?,
            cell_number: unsigned(row.cell_number, "readings", "cell_number")?,
            value: row.value,
            sequence_number: row
                .sequence_number
                .map(|v| unsigned(v, "readings", "sequence_number"))
                .transpose()?,
            timestamp: row.recorded_at,
            phase: column::<Phase>(&row.phase, "readings", "phase")?,
        })
    }
}
