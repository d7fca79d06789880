use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// One calendar day in milliseconds.
pub const DAY_MS: Ms = 24 * 60 * 60 * 1000;

/// Half-open time range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Ms,
    pub to: Ms,
}

impl TimeRange {
    /// Construct a range whose ordering has already been established.
    pub fn new(from: Ms, to: Ms) -> Self {
        debug_assert!(from < to, "TimeRange from must be before to");
        Self { from, to }
    }

    /// Fallible constructor for externally supplied endpoints.
    /// Returns `None` when `from >= to`.
    pub fn try_new(from: Ms, to: Ms) -> Option<Self> {
        if from < to { Some(Self { from, to }) } else { None }
    }

    pub fn duration_ms(&self) -> Ms {
        self.to - self.from
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.from < other.to && other.from < self.to
    }

    /// Point membership: `t` in `[from, to)`.
    pub fn contains(&self, t: Ms) -> bool {
        self.from <= t && t < self.to
    }

    /// Intersection with `bounds`, or `None` when disjoint or touching.
    pub fn clamp_to(&self, bounds: &TimeRange) -> Option<TimeRange> {
        let from = self.from.max(bounds.from);
        let to = self.to.min(bounds.to);
        if from < to { Some(TimeRange { from, to }) } else { None }
    }
}

/// Daily opening window as offsets from midnight. The invariant
/// `0 <= open < close <= 24h` is enforced at construction, so the fields
/// stay private.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    open_ms: Ms,
    close_ms: Ms,
}

impl OpeningHours {
    /// Returns `None` for inverted or out-of-day offsets. Overnight
    /// windows (close past midnight) are not supported.
    pub fn try_new(open_ms: Ms, close_ms: Ms) -> Option<Self> {
        if 0 <= open_ms && open_ms < close_ms && close_ms <= DAY_MS {
            Some(Self { open_ms, close_ms })
        } else {
            None
        }
    }

    pub fn open_ms(&self) -> Ms {
        self.open_ms
    }

    pub fn close_ms(&self) -> Ms {
        self.close_ms
    }

    /// The absolute opening window for the day starting at `day_start`.
    pub fn window_for(&self, day_start: Ms) -> TimeRange {
        TimeRange::new(day_start + self.open_ms, day_start + self.close_ms)
    }
}

impl Default for OpeningHours {
    /// 06:00–22:00, the conventional pitch schedule.
    fn default() -> Self {
        Self {
            open_ms: 6 * 60 * 60 * 1000,
            close_ms: 22 * 60 * 60 * 1000,
        }
    }
}

/// An admitted reservation. Immutable once in the ledger except for
/// `deposit_paid`, which never affects the time range and so may be
/// flipped without re-running conflict checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub field_id: Ulid,
    pub requester_id: Ulid,
    pub range: TimeRange,
    pub deposit_paid: bool,
    pub created_at: Ms,
}

/// Per-field ledger state: scheduling flags plus every admitted
/// reservation, sorted by `range.from`.
#[derive(Debug, Clone)]
pub struct FieldState {
    pub id: Ulid,
    pub opening: OpeningHours,
    pub is_available: bool,
    pub under_maintenance: bool,
    pub reservations: Vec<Reservation>,
}

impl FieldState {
    pub fn new(id: Ulid, opening: OpeningHours, is_available: bool, under_maintenance: bool) -> Self {
        Self {
            id,
            opening,
            is_available,
            under_maintenance,
            reservations: Vec::new(),
        }
    }

    /// Whether the field takes new reservations at all. Existing
    /// reservations are untouched by either flag.
    pub fn accepts_reservations(&self) -> bool {
        self.is_available && !self.under_maintenance
    }

    /// Insert maintaining sort order by `range.from`.
    pub fn insert_sorted(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.range.from, |r| r.range.from)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    /// Conditional insert: re-validates absence of overlap as part of the
    /// write, independent of whatever the caller already checked. On
    /// conflict, returns a copy of the first overlapping reservation and
    /// leaves the ledger untouched.
    pub fn insert_checked(&mut self, reservation: Reservation) -> Result<(), Reservation> {
        if let Some(existing) = self.conflict_with(&reservation.range) {
            return Err(existing.clone());
        }
        self.insert_sorted(reservation);
        Ok(())
    }

    /// Remove by id. `None` when the id is unknown.
    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        if let Some(pos) = self.reservations.iter().position(|r| r.id == id) {
            Some(self.reservations.remove(pos))
        } else {
            None
        }
    }

    /// Reservations whose range overlaps the query window, in ascending
    /// `from` order. Binary search skips everything starting at or after
    /// `query.to`.
    pub fn overlapping(&self, query: &TimeRange) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.range.from < query.to);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.range.to > query.from)
    }

    /// First reservation overlapping `range` by ascending `from`.
    pub fn conflict_with(&self, range: &TimeRange) -> Option<&Reservation> {
        self.overlapping(range).next()
    }
}

/// The journal record format — flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    FieldCreated {
        id: Ulid,
        opening: OpeningHours,
        is_available: bool,
        under_maintenance: bool,
    },
    FieldUpdated {
        id: Ulid,
        opening: OpeningHours,
        is_available: bool,
        under_maintenance: bool,
    },
    FieldDeleted {
        id: Ulid,
    },
    ReservationAdmitted {
        id: Ulid,
        field_id: Ulid,
        requester_id: Ulid,
        range: TimeRange,
        deposit_paid: bool,
        created_at: Ms,
    },
    ReservationCancelled {
        id: Ulid,
        field_id: Ulid,
    },
    DepositMarked {
        id: Ulid,
        field_id: Ulid,
        paid: bool,
    },
}

/// Extract the field id from an event (for non-Create/Delete events).
pub fn event_field_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::ReservationAdmitted { field_id, .. }
        | Event::ReservationCancelled { field_id, .. }
        | Event::DepositMarked { field_id, .. } => Some(*field_id),
        Event::FieldUpdated { id, .. } => Some(*id),
        Event::FieldCreated { .. } | Event::FieldDeleted { .. } => None,
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    pub id: Ulid,
    pub opening: OpeningHours,
    pub is_available: bool,
    pub under_maintenance: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;

    fn reservation(from: Ms, to: Ms) -> Reservation {
        Reservation {
            id: Ulid::new(),
            field_id: Ulid::new(),
            requester_id: Ulid::new(),
            range: TimeRange::new(from, to),
            deposit_paid: false,
            created_at: 0,
        }
    }

    fn open_field() -> FieldState {
        FieldState::new(Ulid::new(), OpeningHours::default(), true, false)
    }

    #[test]
    fn range_basics() {
        let r = TimeRange::new(100, 200);
        assert_eq!(r.duration_ms(), 100);
        assert!(r.contains(100));
        assert!(r.contains(199));
        assert!(!r.contains(200)); // half-open
    }

    #[test]
    fn range_overlap_symmetry() {
        let a = TimeRange::new(100, 200);
        let b = TimeRange::new(150, 250);
        let c = TimeRange::new(300, 400);
        assert_eq!(a.overlaps(&b), b.overlaps(&a));
        assert_eq!(a.overlaps(&c), c.overlaps(&a));
        assert!(a.overlaps(&a)); // self-overlap for positive duration
    }

    #[test]
    fn range_adjacent_not_overlapping() {
        let a = TimeRange::new(100, 200);
        let b = TimeRange::new(200, 300);
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn range_try_new_rejects_inverted_and_empty() {
        assert!(TimeRange::try_new(100, 100).is_none());
        assert!(TimeRange::try_new(200, 100).is_none());
        assert!(TimeRange::try_new(100, 101).is_some());
    }

    #[test]
    fn range_clamp() {
        let bounds = TimeRange::new(100, 400);
        assert_eq!(
            TimeRange::new(50, 200).clamp_to(&bounds),
            Some(TimeRange::new(100, 200))
        );
        assert_eq!(TimeRange::new(0, 100).clamp_to(&bounds), None); // touching
        assert_eq!(TimeRange::new(500, 600).clamp_to(&bounds), None);
    }

    #[test]
    fn opening_hours_validation() {
        assert!(OpeningHours::try_new(0, DAY_MS).is_some());
        assert!(OpeningHours::try_new(6 * H, 22 * H).is_some());
        assert!(OpeningHours::try_new(10 * H, 10 * H).is_none());
        assert!(OpeningHours::try_new(-1, 10 * H).is_none());
        assert!(OpeningHours::try_new(10 * H, DAY_MS + 1).is_none());
    }

    #[test]
    fn opening_hours_window() {
        let hours = OpeningHours::default();
        let day = 19_000 * DAY_MS;
        let window = hours.window_for(day);
        assert_eq!(window.from, day + 6 * H);
        assert_eq!(window.to, day + 22 * H);
    }

    #[test]
    fn ledger_keeps_sort_order() {
        let mut fs = open_field();
        fs.insert_sorted(reservation(300, 400));
        fs.insert_sorted(reservation(100, 200));
        fs.insert_sorted(reservation(200, 300));
        assert_eq!(fs.reservations[0].range.from, 100);
        assert_eq!(fs.reservations[1].range.from, 200);
        assert_eq!(fs.reservations[2].range.from, 300);
    }

    #[test]
    fn insert_checked_rejects_overlap() {
        let mut fs = open_field();
        let first = reservation(100, 200);
        let first_id = first.id;
        fs.insert_checked(first).unwrap();

        let err = fs.insert_checked(reservation(150, 250)).unwrap_err();
        assert_eq!(err.id, first_id);
        assert_eq!(fs.reservations.len(), 1); // ledger untouched
    }

    #[test]
    fn insert_checked_accepts_touching() {
        let mut fs = open_field();
        fs.insert_checked(reservation(100, 200)).unwrap();
        fs.insert_checked(reservation(200, 300)).unwrap();
        assert_eq!(fs.reservations.len(), 2);
    }

    #[test]
    fn conflict_with_reports_earliest() {
        let mut fs = open_field();
        let early = reservation(100, 300);
        let early_id = early.id;
        fs.insert_sorted(reservation(250, 400));
        fs.insert_sorted(early);

        let hit = fs.conflict_with(&TimeRange::new(260, 270)).unwrap();
        assert_eq!(hit.id, early_id);
    }

    #[test]
    fn overlapping_skips_disjoint() {
        let mut fs = open_field();
        fs.insert_sorted(reservation(100, 200));
        fs.insert_sorted(reservation(450, 600));
        fs.insert_sorted(reservation(1000, 1100));

        let hits: Vec<_> = fs.overlapping(&TimeRange::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].range, TimeRange::new(450, 600));
    }

    #[test]
    fn overlapping_excludes_adjacent() {
        let mut fs = open_field();
        fs.insert_sorted(reservation(100, 200));
        let hits: Vec<_> = fs.overlapping(&TimeRange::new(200, 300)).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn overlapping_spanning_query() {
        let mut fs = open_field();
        fs.insert_sorted(reservation(0, 10_000));
        let hits: Vec<_> = fs.overlapping(&TimeRange::new(500, 600)).collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn remove_is_order_preserving_and_none_on_miss() {
        let mut fs = open_field();
        let keep_a = reservation(100, 150);
        let gone = reservation(200, 250);
        let keep_b = reservation(300, 350);
        let gone_id = gone.id;
        for r in [keep_a.clone(), gone, keep_b.clone()] {
            fs.insert_sorted(r);
        }

        assert!(fs.remove_reservation(gone_id).is_some());
        assert!(fs.remove_reservation(gone_id).is_none());
        assert_eq!(fs.reservations.len(), 2);
        assert_eq!(fs.reservations[0].id, keep_a.id);
        assert_eq!(fs.reservations[1].id, keep_b.id);
    }

    #[test]
    fn flags_gate_new_reservations() {
        let mut fs = open_field();
        assert!(fs.accepts_reservations());
        fs.under_maintenance = true;
        assert!(!fs.accepts_reservations());
        fs.under_maintenance = false;
        fs.is_available = false;
        assert!(!fs.accepts_reservations());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationAdmitted {
            id: Ulid::new(),
            field_id: Ulid::new(),
            requester_id: Ulid::new(),
            range: TimeRange::new(1000, 2000),
            deposit_paid: false,
            created_at: 42,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
