//! Repository trait definitions for database operations.
//!
//! Responsibilities are split across focused traits so that implementations
//! stay small and testable.
//!
//! # Module Organization
//!
//! - [`error`]: Error types for repository operations
//! - [`session`]: Banks, sessions and health
//! - [`reading`]: State-machine operations and reading queries
//!
//! # Convenience Trait Bound
//!
//! For functions that need all repository capabilities, use the [`FullRepository`] trait bound:
//!
//! ```ignore
//! async fn my_service<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<()> {
//!     let info = repo.create_session(&bank, 4).await?;
//!     repo.submit_ocv(info.session_id, &[3.7, 3.7], None).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod reading;
pub mod session;

// Re-export error types
pub use error::{ErrorContext, RepositoryError, RepositoryResult};

// Re-export all traits
pub use reading::ReadingRepository;
pub use session::SessionRepository;

/// Composite trait bound for a complete repository implementation.
///
/// Automatically implemented for any type that implements both
/// [`SessionRepository`] and [`ReadingRepository`].
pub trait FullRepository: SessionRepository + ReadingRepository {}

// Blanket implementation: any type implementing both traits automatically implements FullRepository
impl<T> FullRepository for T where T: SessionRepository + ReadingRepository {}
