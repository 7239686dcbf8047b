use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::api::{CycleId, SessionId};
use crate::models::{CycleStatus, Phase};

/// A table cell: a recorded value or an explicit gap.
///
/// Serializes as a JSON number or `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExportValue {
    Number(f64),
    Missing,
}

impl ExportValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ExportValue::Number(v) => Some(*v),
            ExportValue::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, ExportValue::Missing)
    }
}

impl From<Option<f64>> for ExportValue {
    fn from(value: Option<f64>) -> Self {
        value.map(ExportValue::Number).unwrap_or(ExportValue::Missing)
    }
}

/// Column of an export table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "sequence", rename_all = "lowercase")]
pub enum ExportColumn {
    Ocv,
    Ccv(u32),
}

impl ExportColumn {
    /// Column name: `OCV`, `CCV-1`, `CCV-2`, ...
    pub fn name(&self) -> String {
        match self {
            ExportColumn::Ocv => "OCV".to_string(),
            ExportColumn::Ccv(seq) => format!("CCV-{}", seq),
        }
    }
}

impl fmt::Display for ExportColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Header of one CCV column in a cycle table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CcvColumn {
    pub sequence_number: u32,
    /// Capture time of the earliest reading in this sequence.
    pub captured_at: DateTime<Utc>,
}

/// One cell's row in a cycle table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRow {
    pub cell_number: u32,
    pub ocv: ExportValue,
    /// Aligned with [`CycleTable::ccv_columns`].
    pub ccv: Vec<ExportValue>,
}

/// Readings of one cycle phase laid out by cell and CCV sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleTable {
    pub cycle_id: CycleId,
    pub cycle_number: u32,
    pub phase: Phase,
    pub status: CycleStatus,
    pub ccv_columns: Vec<CcvColumn>,
    pub rows: Vec<CellRow>,
}

impl CycleTable {
    /// CCV value for a (cell, sequence) pair, `Missing` when absent.
    #[cfg(test)]
    pub fn ccv_value(&self, cell_number: u32, sequence_number: u32) -> ExportValue {
        let Some(col) = self
            .ccv_columns
            .iter()
            .position(|c| c.sequence_number == sequence_number)
        else {
            return ExportValue::Missing;
        };
        self.rows
            .iter()
            .find(|r| r.cell_number == cell_number)
            .and_then(|r| r.ccv.get(col).copied())
            .unwrap_or(ExportValue::Missing)
    }
}

/// One (cycle, cell) row of a session export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub cycle: u32,
    pub phase: Phase,
    pub cell: u32,
    pub ocv: ExportValue,
    /// CCV values keyed by sequence number; only sequences present in this
    /// row's cycle appear.
    pub ccv: BTreeMap<u32, ExportValue>,
    /// Capture time of each CCV sequence of this row's cycle: its earliest
    /// reading. Same keys as `ccv`.
    #[serde(default)]
    pub ccv_captured_at: BTreeMap<u32, DateTime<Utc>>,
}

impl ExportRow {
    /// Value under `column`, `Missing` when this row's cycle has no such column.
    pub fn get(&self, column: ExportColumn) -> ExportValue {
        match column {
            ExportColumn::Ocv => self.ocv,
            ExportColumn::Ccv(seq) => self.ccv.get(&seq).copied().unwrap_or(ExportValue::Missing),
        }
    }

    /// `(column name, value)` pairs in `columns` order.
    pub fn named_values(&self, columns: &[ExportColumn]) -> Vec<(String, ExportValue)> {
        columns.iter().map(|c| (c.name(), self.get(*c))).collect()
    }
}

/// All export rows of a session plus the union of their value columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportTable {
    pub session_id: SessionId,
    pub columns: Vec<ExportColumn>,
    pub rows: Vec<ExportRow>,
}

pub const GET_CYCLE_TABLES: &str = "get_cycle_tables";
pub const GET_EXPORT_ROWS: &str = "get_export_rows";
pub const GET_EXPORT_CSV: &str = "get_export_csv";
