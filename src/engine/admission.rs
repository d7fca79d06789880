use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check, RejectReason};
use super::{now_ms, Engine, EngineError, JournalCommand, SharedFieldState};

/// Terminal state of one admission attempt. A rejection is an expected
/// outcome, not an error; `Err(EngineError)` is reserved for faults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted { reservation_id: Ulid },
    Rejected { reason: RejectReason },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

impl Engine {
    // ── Field state surface ──────────────────────────────────

    pub async fn create_field(
        &self,
        id: Ulid,
        opening: OpeningHours,
        is_available: bool,
        under_maintenance: bool,
    ) -> Result<(), EngineError> {
        if self.state.len() >= MAX_FIELDS {
            return Err(EngineError::LimitExceeded("too many fields"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::FieldCreated {
            id,
            opening,
            is_available,
            under_maintenance,
        };
        self.journal_append(&event).await?;
        let fs = FieldState::new(id, opening, is_available, under_maintenance);
        self.state.insert(id, Arc::new(RwLock::new(fs)));
        metrics::gauge!(observability::FIELDS_ACTIVE).set(self.state.len() as f64);
        self.notify.send(id, &event);
        Ok(())
    }

    /// Replace the field's opening hours and scheduling flags. Takes
    /// effect on the next admission attempt; admitted reservations are
    /// untouched.
    pub async fn update_field(
        &self,
        id: Ulid,
        opening: OpeningHours,
        is_available: bool,
        under_maintenance: bool,
    ) -> Result<(), EngineError> {
        let fs = self.get_field(&id).ok_or(EngineError::FieldNotFound(id))?;
        let mut guard = fs.write().await;

        let event = Event::FieldUpdated {
            id,
            opening,
            is_available,
            under_maintenance,
        };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    pub async fn delete_field(&self, id: Ulid) -> Result<(), EngineError> {
        let fs = self.get_field(&id).ok_or(EngineError::FieldNotFound(id))?;
        let guard = fs.read().await;
        let reservation_ids: Vec<Ulid> = guard.reservations.iter().map(|r| r.id).collect();
        drop(guard);

        let event = Event::FieldDeleted { id };
        self.journal_append(&event).await?;
        self.state.remove(&id);
        for reservation_id in reservation_ids {
            self.reservation_to_field.remove(&reservation_id);
        }
        metrics::gauge!(observability::FIELDS_ACTIVE).set(self.state.len() as f64);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        Ok(())
    }

    // ── Admission protocol ───────────────────────────────────

    /// Admit or reject a reservation for `[from, to)` on one field.
    ///
    /// The field's write lock is the per-field admission section: the
    /// conflict check and the ledger insert happen under one guard, so
    /// two racing attempts for overlapping slots serialize and the loser
    /// sees the winner's reservation. The ledger's `insert_checked`
    /// independently re-validates overlap as part of the write; if it
    /// ever reports a conflict the attempt is rejected, never retried.
    pub async fn submit_reservation(
        &self,
        field_id: Ulid,
        requester_id: Ulid,
        from: Ms,
        to: Ms,
    ) -> Result<Admission, EngineError> {
        let fs = self
            .get_field(&field_id)
            .ok_or(EngineError::FieldNotFound(field_id))?;
        let mut guard = fs.write().await;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_FIELD {
            return Err(EngineError::LimitExceeded("too many reservations on field"));
        }

        let range = match check(&guard, from, to) {
            Ok(range) => range,
            Err(reason) => return Ok(self.reject(field_id, reason)),
        };

        let created_at = now_ms();
        let reservation = Reservation {
            id: Ulid::new(),
            field_id,
            requester_id,
            range,
            deposit_paid: false,
            created_at,
        };
        let reservation_id = reservation.id;

        // Ledger-level re-validation. Under the write guard this cannot
        // fire after a passing check; it is the backstop for callers that
        // bypass the admission section.
        if let Err(conflicting) = guard.insert_checked(reservation) {
            return Ok(self.reject(field_id, RejectReason::Overlap { conflicting }));
        }

        let event = Event::ReservationAdmitted {
            id: reservation_id,
            field_id,
            requester_id,
            range,
            deposit_paid: false,
            created_at,
        };
        if let Err(e) = self.journal_append(&event).await {
            // Not durable — undo before the guard is released, so no
            // reader ever observes the reservation.
            guard.remove_reservation(reservation_id);
            return Err(e);
        }

        self.reservation_to_field.insert(reservation_id, field_id);
        self.notify.send(field_id, &event);
        metrics::counter!(observability::ADMISSIONS_TOTAL, "outcome" => "admitted").increment(1);
        Ok(Admission::Admitted { reservation_id })
    }

    fn reject(&self, field_id: Ulid, reason: RejectReason) -> Admission {
        tracing::debug!(%field_id, code = reason.code(), "admission rejected");
        metrics::counter!(observability::ADMISSIONS_TOTAL, "outcome" => reason.code()).increment(1);
        Admission::Rejected { reason }
    }

    /// Remove a reservation. Idempotent: unknown ids return `Ok(false)`.
    pub async fn cancel_reservation(&self, reservation_id: Ulid) -> Result<bool, EngineError> {
        let Some(field_id) = self.field_for_reservation(&reservation_id) else {
            return Ok(false);
        };
        let Some(fs) = self.get_field(&field_id) else {
            // Field vanished under us; the index entry is stale
            self.reservation_to_field.remove(&reservation_id);
            return Ok(false);
        };
        let mut guard = fs.write().await;
        if !guard.reservations.iter().any(|r| r.id == reservation_id) {
            return Ok(false);
        }

        let event = Event::ReservationCancelled {
            id: reservation_id,
            field_id,
        };
        self.persist_and_apply(field_id, &mut guard, &event).await?;
        metrics::counter!(observability::CANCELLATIONS_TOTAL).increment(1);
        Ok(true)
    }

    /// Flip the deposit flag on an admitted reservation. Never re-runs
    /// conflict checks — the time range is untouched.
    pub async fn set_deposit_paid(
        &self,
        reservation_id: Ulid,
        paid: bool,
    ) -> Result<(), EngineError> {
        let (field_id, mut guard) = self.resolve_reservation_write(&reservation_id).await?;
        if !guard.reservations.iter().any(|r| r.id == reservation_id) {
            return Err(EngineError::ReservationNotFound(reservation_id));
        }

        let event = Event::DepositMarked {
            id: reservation_id,
            field_id,
            paid,
        };
        self.persist_and_apply(field_id, &mut guard, &event).await
    }

    // ── Maintenance ──────────────────────────────────────────

    /// Reservations whose `to` lies more than `keep_for` in the past.
    /// Returns `(reservation_id, field_id)` pairs for the retention
    /// sweeper; fields currently write-locked are skipped and picked up
    /// on the next sweep.
    pub fn collect_expired_reservations(&self, now: Ms, keep_for: Ms) -> Vec<(Ulid, Ulid)> {
        let mut expired = Vec::new();
        for entry in self.state.iter() {
            let fs: SharedFieldState = entry.value().clone();
            if let Ok(guard) = fs.try_read() {
                for reservation in &guard.reservations {
                    if reservation.range.to + keep_for <= now {
                        expired.push((reservation.id, guard.id));
                    }
                }
            }
        }
        expired
    }

    /// Rewrite the journal as the minimal event sequence recreating the
    /// current state.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        let field_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();

        for id in field_ids {
            let Some(fs) = self.get_field(&id) else { continue };
            let guard = fs.read().await;
            events.push(Event::FieldCreated {
                id: guard.id,
                opening: guard.opening,
                is_available: guard.is_available,
                under_maintenance: guard.under_maintenance,
            });
            for r in &guard.reservations {
                // Admitted events carry the live deposit flag, so no
                // DepositMarked entries are needed after compaction
                events.push(Event::ReservationAdmitted {
                    id: r.id,
                    field_id: r.field_id,
                    requester_id: r.requester_id,
                    range: r.range,
                    deposit_paid: r.deposit_paid,
                    created_at: r.created_at,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
