mod admission;
mod availability;
mod conflict;
mod error;
mod queries;

pub use admission::Admission;
pub use availability::free_windows;
pub use conflict::{check, RejectReason};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::journal::Journal;
use crate::model::*;
use crate::notify::NotifyHub;

pub type SharedFieldState = Arc<RwLock<FieldState>>;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group
/// commit:
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. One flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush the batch first, then handle the non-append command
                            flush_and_respond(&mut journal, &mut batch);
                            handle_non_append(&mut journal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut journal, &mut batch);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

fn flush_and_respond(journal: &mut Journal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(journal, batch);
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(journal: &mut Journal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = journal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = journal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking engine: per-field reservation ledgers behind one shared
/// registry, a durable journal, and a notify hub.
pub struct Engine {
    pub state: DashMap<Ulid, SharedFieldState>,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: reservation id → field id.
    pub(super) reservation_to_field: DashMap<Ulid, Ulid>,
}

/// Apply an event directly to a FieldState (no locking — caller holds
/// the write guard).
fn apply_to_field(fs: &mut FieldState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::ReservationAdmitted {
            id,
            field_id,
            requester_id,
            range,
            deposit_paid,
            created_at,
        } => {
            fs.insert_sorted(Reservation {
                id: *id,
                field_id: *field_id,
                requester_id: *requester_id,
                range: *range,
                deposit_paid: *deposit_paid,
                created_at: *created_at,
            });
            index.insert(*id, *field_id);
        }
        Event::ReservationCancelled { id, .. } => {
            fs.remove_reservation(*id);
            index.remove(id);
        }
        Event::DepositMarked { id, paid, .. } => {
            if let Some(reservation) = fs.reservations.iter_mut().find(|r| r.id == *id) {
                reservation.deposit_paid = *paid;
            }
        }
        Event::FieldUpdated {
            opening,
            is_available,
            under_maintenance,
            ..
        } => {
            fs.opening = *opening;
            fs.is_available = *is_available;
            fs.under_maintenance = *under_maintenance;
        }
        // FieldCreated/Deleted are handled at the registry level, not here
        Event::FieldCreated { .. } | Event::FieldDeleted { .. } => {}
    }
}

impl Engine {
    /// Open the journal at `journal_path`, replay it into memory and
    /// start the group-commit writer task. Must run inside a tokio
    /// runtime.
    pub fn new(journal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            state: DashMap::new(),
            journal_tx,
            notify,
            reservation_to_field: DashMap::new(),
        };

        // Replay — we're the sole owner of these Arcs, so try_read/try_write
        // always succeed instantly. Never use blocking_read/blocking_write
        // here because this runs inside an async context.
        for event in &events {
            match event {
                Event::FieldCreated {
                    id,
                    opening,
                    is_available,
                    under_maintenance,
                } => {
                    let fs = FieldState::new(*id, *opening, *is_available, *under_maintenance);
                    engine.state.insert(*id, Arc::new(RwLock::new(fs)));
                }
                Event::FieldDeleted { id } => {
                    if let Some(entry) = engine.state.get(id) {
                        let fs = entry.try_read().expect("replay: uncontended read");
                        for reservation in &fs.reservations {
                            engine.reservation_to_field.remove(&reservation.id);
                        }
                    }
                    engine.state.remove(id);
                }
                other => {
                    if let Some(field_id) = event_field_id(other)
                        && let Some(entry) = engine.state.get(&field_id) {
                            let fs_arc = entry.clone();
                            let mut guard = fs_arc.try_write().expect("replay: uncontended write");
                            apply_to_field(&mut guard, other, &engine.reservation_to_field);
                        }
                }
            }
        }

        if !events.is_empty() {
            tracing::info!("replayed {} journal events", events.len());
        }
        metrics::gauge!(crate::observability::FIELDS_ACTIVE).set(engine.state.len() as f64);

        Ok(engine)
    }

    /// Write an event to the journal via the background group-commit
    /// writer, waiting for the fsync acknowledgment.
    pub(super) async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    pub fn get_field(&self, id: &Ulid) -> Option<SharedFieldState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn field_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_field
            .get(reservation_id)
            .map(|e| *e.value())
    }

    /// Journal-append + apply + notify in one call, for mutations whose
    /// events cannot fail to apply (cancellation, deposit, field update).
    pub(super) async fn persist_and_apply(
        &self,
        field_id: Ulid,
        fs: &mut FieldState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.journal_append(event).await?;
        apply_to_field(fs, event, &self.reservation_to_field);
        self.notify.send(field_id, event);
        Ok(())
    }

    /// Lookup reservation → field, fetch the field, take its write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<FieldState>), EngineError> {
        let field_id = self
            .field_for_reservation(reservation_id)
            .ok_or(EngineError::ReservationNotFound(*reservation_id))?;
        let fs = self
            .get_field(&field_id)
            .ok_or(EngineError::FieldNotFound(field_id))?;
        let guard = fs.write_owned().await;
        Ok((field_id, guard))
    }
}
