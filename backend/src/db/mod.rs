//! Persistence layer for banks, sessions, cycles and readings.
//!
//! Storage backends sit behind the repository traits so they can be swapped
//! without touching callers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Application Layer (REST API)                           │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Service Layer (services.rs) - validation, views        │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository Traits (repository/) - atomic operations    │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────┴────────────────┐
//!     │ Postgres (Diesel) │ Local (in-memory) │
//!     └────────────────────────────────┘
//! ```
//!
//! # Recommended Usage
//!
//! ```ignore
//! use battery_endurance::db::{factory, services, PostgresConfig, RepositoryType};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PostgresConfig::from_env()?;
//!     let repo = factory::RepositoryFactory::create(RepositoryType::Postgres, Some(&config)).await?;
//!     let sessions = services::list_session_summaries(repo.as_ref()).await?;
//!     Ok(())
//! }
//! ```

// Feature flag priority: postgres > local
// When multiple features are enabled (e.g., --all-features), postgres takes precedence.
#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod factory;
pub mod repo_config;
pub mod repositories;
pub mod repository;
pub mod services;

// Postgres config is colocated with the repository implementation.
#[cfg(feature = "postgres-repo")]
pub use repositories::postgres::{PoolStats, PostgresConfig};
#[cfg(not(feature = "postgres-repo"))]
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    _private: (),
}

// ==================== Service Layer ====================

pub use services::{
    create_test_session, end_phase, get_cycle_tables, get_export_table, get_session_report,
    health_check, list_session_summaries, reconcile_status, submit_ccv, submit_ocv,
};

// ==================== Repository Pattern Exports ====================

pub use repo_config::RepositoryConfig;

pub use factory::{RepositoryFactory, RepositoryType};
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::{
    ErrorContext, FullRepository, ReadingRepository, RepositoryError, RepositoryResult,
    SessionRepository,
};

use anyhow::{Context, Result};
use std::sync::{Arc, OnceLock};

/// Global repository instance initialized once per process.
static REPOSITORY: OnceLock<Arc<dyn FullRepository>> = OnceLock::new();

/// Build the backend selected by `repository.toml` if one exists in the
/// default locations, otherwise by the environment. A config file that is
/// present but invalid fails startup instead of falling back.
///
/// Priority when both features are compiled in: postgres > local.
pub async fn create_selected_repository() -> RepositoryResult<Arc<dyn FullRepository>> {
    RepositoryFactory::from_config_search(&repo_config::DEFAULT_CONFIG_PATHS).await
}

/// Initialize the global repository singleton.
///
/// A second call is a no-op; the first repository wins.
pub async fn init_repository() -> Result<&'static Arc<dyn FullRepository>> {
    if let Some(repo) = REPOSITORY.get() {
        return Ok(repo);
    }

    let repo = create_selected_repository()
        .await
        .context("Failed to initialize repository")?;
    let _ = REPOSITORY.set(repo);
    get_repository()
}

/// Get a reference to the global repository instance.
pub fn get_repository() -> Result<&'static Arc<dyn FullRepository>> {
    REPOSITORY
        .get()
        .context("Database not initialized. Call init_repository() first.")
}
