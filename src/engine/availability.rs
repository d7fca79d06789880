use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// Free windows for the day starting at `day_start`: the field's
/// opening-hours window minus every admitted reservation intersecting it.
///
/// Left-to-right cursor walk over the ledger's `from`-ordered
/// reservations. Overlapping or touching reservations collapse naturally
/// (`cursor = max(cursor, to)`), and zero-length gaps are never emitted.
pub fn free_windows(field: &FieldState, day_start: Ms) -> Vec<TimeRange> {
    let window = field.opening.window_for(day_start);

    let mut free = Vec::new();
    let mut cursor = window.from;
    for reservation in field.overlapping(&window) {
        // Overlap with the window is guaranteed, so the clip is non-empty
        let busy_from = reservation.range.from.max(window.from);
        let busy_to = reservation.range.to.min(window.to);
        if busy_from > cursor {
            free.push(TimeRange::new(cursor, busy_from));
        }
        cursor = cursor.max(busy_to);
    }
    if cursor < window.to {
        free.push(TimeRange::new(cursor, window.to));
    }

    free
}
