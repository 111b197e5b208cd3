//! tallyboard library root.
//! Shop-floor production counting core: three append-only event streams
//! (hits, context changes, device resets) plus a mutable daily snapshot,
//! reconciled into consistent per-operator work segments.
//!
//! The crate owns no CLI or wire format; HTTP handlers, exporters and UI
//! layers consume [`Engine`] directly.

pub mod config;
pub mod core;
pub mod db;
pub mod errors;
pub mod models;
pub mod utils;

pub use crate::config::Config;
pub use crate::core::engine::{AssignmentChange, Engine, HitOutcome, ResetOutcome};
pub use crate::core::report::ReportRow;
pub use crate::errors::{AppError, AppResult};
