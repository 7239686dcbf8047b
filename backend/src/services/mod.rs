//! Domain logic shared by every repository backend.
//!
//! Nothing in here touches storage. Repositories call into
//! [`state_machine`] while holding their write lock or transaction, and the
//! read-side helpers in [`aggregation`] and [`progress`] shape stored rows
//! for display and export.

pub mod aggregation;
pub mod progress;
pub mod state_machine;

pub use aggregation::{aggregate_cycle, aggregate_session, ccv_batch_count, export_rows};
pub use progress::{duration, progress, progress_for, ElapsedTime};
pub use state_machine::{CcvOutcome, OcvOutcome, PhaseStep, PhaseTransition};
