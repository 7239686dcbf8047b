//! # Battery Endurance Backend
//!
//! Record-keeping engine for battery endurance testing.
//!
//! A test session runs a battery bank through a fixed number of charge and
//! discharge cycles. Operators record an open-circuit voltage (OCV) batch at
//! the start of each phase and any number of closed-circuit voltage (CCV)
//! batches while it runs, then end the phase. The backend enforces the
//! session state machine, stores readings and lays them out as per-cycle
//! tables for display and CSV export.
//!
//! ## Architecture
//!
//! - [`models`]: Domain types (banks, sessions, cycles, readings)
//! - [`services`]: State machine, aggregation and progress helpers
//! - [`db`]: Repository traits, in-memory and PostgreSQL backends, service layer
//! - [`routes`]: Route-specific response types
//! - [`api`]: Re-exported DTOs
//! - [`http`]: Axum-based HTTP server and request handlers
//!

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod api;

pub mod db;
pub mod models;

pub mod routes;

pub mod services;

#[cfg(feature = "http-server")]
pub mod http;
