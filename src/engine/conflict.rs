use crate::limits::{MAX_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS};
use crate::model::*;

/// Why an admission attempt was turned down. Ordered by check priority:
/// field flags first (cheapest), then opening hours, then interval
/// validity, then the ledger scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    FieldUnavailable,
    OutsideOpeningHours,
    InvalidInterval,
    Overlap { conflicting: Reservation },
}

impl RejectReason {
    /// Stable wire code for the embedding application.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::FieldUnavailable => "RESOURCE_UNAVAILABLE",
            RejectReason::OutsideOpeningHours => "OUTSIDE_HOURS",
            RejectReason::InvalidInterval => "INVALID_INTERVAL",
            RejectReason::Overlap { .. } => "OVERLAP",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::FieldUnavailable => write!(f, "field is unavailable or under maintenance"),
            RejectReason::OutsideOpeningHours => write!(f, "interval falls outside opening hours"),
            RejectReason::InvalidInterval => write!(f, "interval is empty, inverted or out of range"),
            RejectReason::Overlap { conflicting } => write!(
                f,
                "slot already booked: [{}, {}) by reservation {}",
                conflicting.range.from, conflicting.range.to, conflicting.id
            ),
        }
    }
}

/// Decide whether `[from, to)` may be admitted on `field`. Pure and
/// deterministic: reads only the snapshot it is given, so it can be
/// unit-tested without an engine. On accept, returns the validated range
/// for the caller to insert.
///
/// The overlap scan here is advisory — the ledger's `insert_checked`
/// re-validates as part of the write (see FieldState).
pub fn check(field: &FieldState, from: Ms, to: Ms) -> Result<TimeRange, RejectReason> {
    if !field.accepts_reservations() {
        return Err(RejectReason::FieldUnavailable);
    }

    // Opening-hours containment for the UTC day the reservation starts on.
    let day_start = from.div_euclid(DAY_MS) * DAY_MS;
    let window = field.opening.window_for(day_start);
    if from < window.from || to > window.to {
        return Err(RejectReason::OutsideOpeningHours);
    }

    if from < MIN_VALID_TIMESTAMP_MS || to > MAX_VALID_TIMESTAMP_MS {
        return Err(RejectReason::InvalidInterval);
    }
    let range = TimeRange::try_new(from, to).ok_or(RejectReason::InvalidInterval)?;

    if let Some(existing) = field.conflict_with(&range) {
        return Err(RejectReason::Overlap {
            conflicting: existing.clone(),
        });
    }

    Ok(range)
}
