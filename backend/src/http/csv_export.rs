//! CSV rendering of a session export.
//!
//! Columns are `Cycle, Phase, Cell No., OCV` followed by one column per CCV
//! batch, headed `CCV-{seq} ({hh:mm AM/PM})` with the batch's capture time in
//! UTC. Batches of different cycles share a column only when both sequence
//! and minute agree, so a row leaves the other cycles' columns empty. A
//! sequence with no capture time is headed plain `CCV-{seq}`. Missing values
//! are written as empty fields.

use chrono::{DateTime, Utc};

use crate::api::{ExportColumn, ExportRow, ExportTable, ExportValue, SessionId};

/// Attachment name for a session's CSV export.
pub fn export_filename(session_id: SessionId) -> String {
    format!("test_{}_export.csv", session_id)
}

/// Header of a CCV column, `CCV-3 (02:45 PM)`.
pub fn ccv_header(sequence: u32, captured_at: Option<DateTime<Utc>>) -> String {
    match captured_at {
        Some(at) => format!("CCV-{} ({})", sequence, at.format("%I:%M %p")),
        None => ExportColumn::Ccv(sequence).name(),
    }
}

fn row_ccv_header(row: &ExportRow, sequence: u32) -> String {
    ccv_header(sequence, row.ccv_captured_at.get(&sequence).copied())
}

/// CCV headers by ascending sequence, then in order of first appearance.
fn ccv_headers(table: &ExportTable) -> Vec<(u32, String)> {
    let mut headers: Vec<(u32, String)> = Vec::new();
    for row in &table.rows {
        for &sequence in row.ccv.keys() {
            let header = row_ccv_header(row, sequence);
            if !headers.iter().any(|(seq, h)| *seq == sequence && *h == header) {
                headers.push((sequence, header));
            }
        }
    }
    headers.sort_by_key(|(sequence, _)| *sequence);
    headers
}

fn field(value: ExportValue) -> String {
    match value {
        ExportValue::Number(v) => v.to_string(),
        ExportValue::Missing => String::new(),
    }
}

/// Write the export as CSV into any writer.
pub fn write_export<W: std::io::Write>(
    table: &ExportTable,
    writer: &mut csv::Writer<W>,
) -> Result<(), csv::Error> {
    let ccv_columns = ccv_headers(table);

    let mut header = vec![
        "Cycle".to_string(),
        "Phase".to_string(),
        "Cell No.".to_string(),
        ExportColumn::Ocv.name(),
    ];
    header.extend(ccv_columns.iter().map(|(_, h)| h.clone()));
    writer.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![
            row.cycle.to_string(),
            row.phase.label().to_string(),
            row.cell.to_string(),
            field(row.ocv),
        ];
        record.extend(ccv_columns.iter().map(|(sequence, h)| {
            if row.ccv.contains_key(sequence) && row_ccv_header(row, *sequence) == *h {
                field(row.get(ExportColumn::Ccv(*sequence)))
            } else {
                String::new()
            }
        }));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Render the export as CSV bytes.
pub fn render_export(table: &ExportTable) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_export(table, &mut writer)?;
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Phase;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 30).unwrap()
    }

    fn row(
        cycle: u32,
        phase: Phase,
        cell: u32,
        ocv: Option<f64>,
        ccv: &[(u32, f64, DateTime<Utc>)],
    ) -> ExportRow {
        ExportRow {
            cycle,
            phase,
            cell,
            ocv: ocv.into(),
            ccv: ccv
                .iter()
                .map(|(s, v, _)| (*s, ExportValue::Number(*v)))
                .collect::<BTreeMap<_, _>>(),
            ccv_captured_at: ccv.iter().map(|(s, _, t)| (*s, *t)).collect(),
        }
    }

    fn lines(table: &ExportTable) -> Vec<String> {
        String::from_utf8(render_export(table).unwrap())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_ccv_header_formats_twelve_hour_clock() {
        assert_eq!(ccv_header(1, Some(at(9, 5))), "CCV-1 (09:05 AM)");
        assert_eq!(ccv_header(12, Some(at(14, 45))), "CCV-12 (02:45 PM)");
        assert_eq!(ccv_header(2, None), "CCV-2");
    }

    #[test]
    fn test_header_and_rows() {
        let table = ExportTable {
            session_id: SessionId::new(7),
            columns: vec![ExportColumn::Ocv, ExportColumn::Ccv(1), ExportColumn::Ccv(2)],
            rows: vec![
                row(1, Phase::Charge, 1, Some(3.7), &[(1, 3.6, at(9, 15)), (2, 3.55, at(9, 30))]),
                row(1, Phase::Charge, 2, Some(3.71), &[(1, 3.61, at(9, 15)), (2, 3.56, at(9, 30))]),
            ],
        };

        let lines = lines(&table);
        assert_eq!(lines[0], "Cycle,Phase,Cell No.,OCV,CCV-1 (09:15 AM),CCV-2 (09:30 AM)");
        assert_eq!(lines[1], "1,Charge,1,3.7,3.6,3.55");
        assert_eq!(lines[2], "1,Charge,2,3.71,3.61,3.56");
    }

    #[test]
    fn test_cycles_captured_at_different_times_get_their_own_columns() {
        let table = ExportTable {
            session_id: SessionId::new(7),
            columns: vec![ExportColumn::Ocv, ExportColumn::Ccv(1), ExportColumn::Ccv(2)],
            rows: vec![
                row(1, Phase::Charge, 1, Some(3.7), &[(1, 3.6, at(9, 15)), (2, 3.55, at(9, 30))]),
                row(1, Phase::Discharge, 1, None, &[(1, 3.4, at(13, 0))]),
            ],
        };

        let lines = lines(&table);
        assert_eq!(
            lines[0],
            "Cycle,Phase,Cell No.,OCV,CCV-1 (09:15 AM),CCV-1 (01:00 PM),CCV-2 (09:30 AM)"
        );
        assert_eq!(lines[1], "1,Charge,1,3.7,3.6,,3.55");
        assert_eq!(lines[2], "1,Discharge,1,,,3.4,");
    }

    #[test]
    fn test_missing_value_in_captured_sequence_is_empty() {
        let mut partial = row(1, Phase::Charge, 2, Some(3.71), &[(1, 3.61, at(9, 15))]);
        partial.ccv.insert(1, ExportValue::Missing);
        let table = ExportTable {
            session_id: SessionId::new(3),
            columns: vec![ExportColumn::Ocv, ExportColumn::Ccv(1)],
            rows: vec![
                row(1, Phase::Charge, 1, Some(3.7), &[(1, 3.6, at(9, 15))]),
                partial,
            ],
        };

        let lines = lines(&table);
        assert_eq!(lines[0], "Cycle,Phase,Cell No.,OCV,CCV-1 (09:15 AM)");
        assert_eq!(lines[2], "1,Charge,2,3.71,");
    }

    #[test]
    fn test_header_without_ccv() {
        let table = ExportTable {
            session_id: SessionId::new(1),
            columns: vec![ExportColumn::Ocv],
            rows: vec![],
        };
        let csv = String::from_utf8(render_export(&table).unwrap()).unwrap();
        assert_eq!(csv.trim_end(), "Cycle,Phase,Cell No.,OCV");
    }

    #[test]
    fn test_filename() {
        assert_eq!(export_filename(SessionId::new(12)), "test_12_export.csv");
    }
}
