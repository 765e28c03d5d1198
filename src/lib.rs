//! Scoring engine for peer-assessment responses.
//!
//! Computes normalized weighted percentages for individual responses,
//! decides whether a response still counts given review deadlines and
//! resubmission history, and aggregates max/min/average statistics over
//! response lists, with a separate path for quiz responses. Everything is
//! computed synchronously on demand from a SQLite-backed store; the engine
//! itself caches and persists nothing.

pub mod model;
pub mod score;
pub mod store;
