//! Hard caps consulted on every mutation. Exceeding one is an
//! `EngineError::LimitExceeded`, never a panic.

use crate::model::{Ms, DAY_MS};

/// Maximum number of fields a single engine will track.
pub const MAX_FIELDS: usize = 10_000;

/// Maximum admitted reservations per field.
pub const MAX_RESERVATIONS_PER_FIELD: usize = 100_000;

/// Earliest accepted reservation timestamp (Unix epoch).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// Latest accepted reservation timestamp (2100-01-01T00:00:00Z).
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Widest window accepted by reservation-listing queries.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * DAY_MS;
