use ulid::Ulid;

use crate::limits::MAX_QUERY_WINDOW_MS;
use crate::model::*;
use crate::observability;

use super::availability::free_windows;
use super::{Engine, EngineError, SharedFieldState};

impl Engine {
    /// Free windows within opening hours for the day starting at
    /// `day_start` (a UTC midnight, pre-validated by the caller).
    ///
    /// Read-only: takes the field's read lock, so it never contends with
    /// other readers and may trail an in-flight admission by one write.
    /// Callers are expected to re-query immediately before submitting —
    /// admission re-validates at commit time regardless.
    pub async fn query_availability(
        &self,
        field_id: Ulid,
        day_start: Ms,
    ) -> Result<Vec<TimeRange>, EngineError> {
        let fs = self
            .get_field(&field_id)
            .ok_or(EngineError::FieldNotFound(field_id))?;
        let guard = fs.read().await;
        metrics::counter!(observability::AVAILABILITY_QUERIES_TOTAL).increment(1);
        Ok(free_windows(&guard, day_start))
    }

    /// Every admitted reservation overlapping `window`, ascending by
    /// `from`. A reservation becomes visible here atomically with its
    /// admission: it is inserted under the same write guard that
    /// admitted it.
    pub async fn find_overlapping(
        &self,
        field_id: Ulid,
        window: TimeRange,
    ) -> Result<Vec<Reservation>, EngineError> {
        if window.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let fs = self
            .get_field(&field_id)
            .ok_or(EngineError::FieldNotFound(field_id))?;
        let guard = fs.read().await;
        Ok(guard.overlapping(&window).cloned().collect())
    }

    /// Reservations intersecting `window`, ascending by `from`, with
    /// each range clipped to the window bounds (a reservation reaching
    /// past midnight is reported only up to the window edge).
    pub async fn list_reservations(
        &self,
        field_id: Ulid,
        window: TimeRange,
    ) -> Result<Vec<Reservation>, EngineError> {
        if window.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let fs = self
            .get_field(&field_id)
            .ok_or(EngineError::FieldNotFound(field_id))?;
        let guard = fs.read().await;
        Ok(guard
            .overlapping(&window)
            .filter_map(|r| {
                let clipped = r.range.clamp_to(&window)?;
                let mut r = r.clone();
                r.range = clipped;
                Some(r)
            })
            .collect())
    }

    /// Snapshot of one reservation.
    pub async fn get_reservation(&self, reservation_id: Ulid) -> Option<Reservation> {
        let field_id = self.field_for_reservation(&reservation_id)?;
        let fs = self.get_field(&field_id)?;
        let guard = fs.read().await;
        guard
            .reservations
            .iter()
            .find(|r| r.id == reservation_id)
            .cloned()
    }

    pub async fn list_fields(&self) -> Vec<FieldInfo> {
        let shared: Vec<SharedFieldState> =
            self.state.iter().map(|entry| entry.value().clone()).collect();
        let mut fields = Vec::with_capacity(shared.len());
        for fs in shared {
            let guard = fs.read().await;
            fields.push(FieldInfo {
                id: guard.id,
                opening: guard.opening,
                is_available: guard.is_available,
                under_maintenance: guard.under_maintenance,
            });
        }
        fields
    }
}
