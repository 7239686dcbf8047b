use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::BankId;

/// A battery bank under test: a named group of series cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryBank {
    pub id: BankId,
    pub name: String,
    pub description: Option<String>,
    /// Number of cells; readings are numbered `1..=num_cells`.
    pub num_cells: u32,
    pub created_at: DateTime<Utc>,
}

/// Bank attributes supplied when a test session is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBatteryBank {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub num_cells: u32,
}

impl NewBatteryBank {
    pub fn new(name: impl Into<String>, description: Option<String>, num_cells: u32) -> Self {
        Self {
            name: name.into(),
            description,
            num_cells,
        }
    }
}
