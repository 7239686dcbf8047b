//! Public API surface for the endurance backend.
//!
//! This file consolidates the DTO types for the HTTP API.
//! All types derive Serialize/Deserialize for JSON serialization.

pub use crate::models::{BankId, CycleId, ReadingId, SessionId};

pub use crate::models::{
    BatteryBank, CycleStatus, NewBatteryBank, Phase, Reading, ReadingCycle, ReadingType,
    SessionStatus, TestSession,
};

pub use crate::routes::export::CcvColumn;
pub use crate::routes::export::CellRow;
pub use crate::routes::export::CycleTable;
pub use crate::routes::export::ExportColumn;
pub use crate::routes::export::ExportRow;
pub use crate::routes::export::ExportTable;
pub use crate::routes::export::ExportValue;
pub use crate::routes::sessions::CycleSummary;
pub use crate::routes::sessions::SessionInfo;
pub use crate::routes::sessions::SessionReport;
pub use crate::routes::sessions::SessionSummary;

pub use crate::services::progress::ElapsedTime;
pub use crate::services::state_machine::{CcvOutcome, OcvOutcome, PhaseStep, PhaseTransition};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct_types_with_shared_shape() {
        let session = SessionId::new(3);
        let bank = BankId::new(3);
        assert_eq!(session.value(), bank.value());
        assert_eq!(session.to_string(), "3");
    }

    #[test]
    fn test_export_value_serializes_missing_as_null() {
        let json = serde_json::to_string(&vec![ExportValue::Number(3.5), ExportValue::Missing])
            .unwrap();
        assert_eq!(json, "[3.5,null]");
    }
}
