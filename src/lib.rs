//! pitchlock — booking conflict & availability engine for fixed-size
//! fields (sports pitches, courts, halls).
//!
//! The engine owns the reservation ledger: it decides whether a proposed
//! reservation may be admitted, computes free windows for a field on a
//! given day, and guarantees that two concurrent booking attempts for
//! overlapping time ranges on the same field cannot both succeed.
//! Authentication, catalog CRUD and transport are the embedding
//! application's problem; this crate only sees validated ids and
//! timestamps.

pub mod engine;
pub mod journal;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
