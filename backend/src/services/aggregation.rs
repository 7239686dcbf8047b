//! Reading aggregation for display and export.
//!
//! Raw readings are grouped by cycle, cell and CCV sequence number. All
//! functions are pure and deterministic for a fixed set of readings: ties on
//! timestamp fall back to the reading id, so the earliest *recorded* reading
//! wins.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::api::{CcvColumn, CellRow, CycleTable, ExportColumn, ExportRow, ExportTable, ExportValue};
use crate::models::{Reading, ReadingCycle, ReadingId, ReadingType, SessionId};

fn record_key(r: &Reading) -> (DateTime<Utc>, ReadingId) {
    (r.timestamp, r.id)
}

fn keep_earliest<'a, K: Ord>(map: &mut BTreeMap<K, &'a Reading>, key: K, reading: &'a Reading) {
    map.entry(key)
        .and_modify(|current| {
            if record_key(reading) < record_key(current) {
                *current = reading;
            }
        })
        .or_insert(reading);
}

/// Lay out the readings of one cycle by cell (`1..=num_cells`) and CCV sequence.
///
/// Readings that belong to other cycles are ignored. Each distinct CCV
/// sequence becomes a column, ascending, headed by the capture time of its
/// earliest reading. Absent (cell, sequence) pairs are `Missing`.
pub fn aggregate_cycle(cycle: &ReadingCycle, readings: &[Reading], num_cells: u32) -> CycleTable {
    let mut ocv_by_cell: BTreeMap<u32, &Reading> = BTreeMap::new();
    let mut ccv_by_slot: BTreeMap<(u32, u32), &Reading> = BTreeMap::new();
    let mut first_in_sequence: BTreeMap<u32, &Reading> = BTreeMap::new();

    for reading in readings.iter().filter(|r| r.cycle_id == cycle.id) {
        match (reading.reading_type, reading.sequence_number) {
            (ReadingType::Ocv, _) => keep_earliest(&mut ocv_by_cell, reading.cell_number, reading),
            (ReadingType::Ccv, Some(seq)) => {
                keep_earliest(&mut ccv_by_slot, (seq, reading.cell_number), reading);
                keep_earliest(&mut first_in_sequence, seq, reading);
            }
            // a CCV without a sequence cannot be placed in a column
            (ReadingType::Ccv, None) => {}
        }
    }

    let ccv_columns: Vec<CcvColumn> = first_in_sequence
        .iter()
        .map(|(seq, first)| CcvColumn {
            sequence_number: *seq,
            captured_at: first.timestamp,
        })
        .collect();

    let rows = (1..=num_cells)
        .map(|cell| CellRow {
            cell_number: cell,
            ocv: ExportValue::from(ocv_by_cell.get(&cell).map(|r| r.value)),
            ccv: ccv_columns
                .iter()
                .map(|col| {
                    ExportValue::from(
                        ccv_by_slot
                            .get(&(col.sequence_number, cell))
                            .map(|r| r.value),
                    )
                })
                .collect(),
        })
        .collect();

    CycleTable {
        cycle_id: cycle.id,
        cycle_number: cycle.cycle_number,
        phase: cycle.phase,
        status: cycle.status,
        ccv_columns,
        rows,
    }
}

/// Cycle tables for a whole session, ordered by (cycle number, phase).
pub fn aggregate_session(
    cycles: &[ReadingCycle],
    readings: &[Reading],
    num_cells: u32,
) -> Vec<CycleTable> {
    let mut ordered: Vec<&ReadingCycle> = cycles.iter().collect();
    ordered.sort_by_key(|c| (c.cycle_number, c.phase, c.id));
    ordered
        .into_iter()
        .map(|cycle| aggregate_cycle(cycle, readings, num_cells))
        .collect()
}

/// Flatten cycle tables into one row per (cycle, cell).
///
/// `columns` is `OCV` followed by every CCV sequence seen in any cycle.
pub fn export_rows(session_id: SessionId, tables: &[CycleTable]) -> ExportTable {
    let sequences: BTreeSet<u32> = tables
        .iter()
        .flat_map(|t| t.ccv_columns.iter().map(|c| c.sequence_number))
        .collect();

    let mut columns = Vec::with_capacity(sequences.len() + 1);
    columns.push(ExportColumn::Ocv);
    columns.extend(sequences.into_iter().map(ExportColumn::Ccv));

    let rows = tables
        .iter()
        .flat_map(|table| {
            table.rows.iter().map(move |row| ExportRow {
                cycle: table.cycle_number,
                phase: table.phase,
                cell: row.cell_number,
                ocv: row.ocv,
                ccv: table
                    .ccv_columns
                    .iter()
                    .zip(row.ccv.iter())
                    .map(|(col, value)| (col.sequence_number, *value))
                    .collect::<BTreeMap<u32, ExportValue>>(),
                ccv_captured_at: table
                    .ccv_columns
                    .iter()
                    .map(|col| (col.sequence_number, col.captured_at))
                    .collect(),
            })
        })
        .collect();

    ExportTable {
        session_id,
        columns,
        rows,
    }
}

/// Number of complete-or-partial CCV batches recorded in a cycle.
pub fn ccv_batch_count(cycle: &ReadingCycle, readings: &[Reading]) -> u32 {
    readings
        .iter()
        .filter(|r| r.cycle_id == cycle.id && r.reading_type == ReadingType::Ccv)
        .filter_map(|r| r.sequence_number)
        .collect::<BTreeSet<u32>>()
        .len() as u32
}

#[cfg(test)]
#[path = "aggregation_tests.rs"]
mod aggregation_tests;
