//! End-to-end suite: drives the public engine API the way an embedding
//! application would, with emphasis on the concurrency guarantee —
//! two racing overlapping submissions must never both be admitted.

use std::path::PathBuf;
use std::sync::Arc;

use ulid::Ulid;

use pitchlock::engine::{Admission, Engine, RejectReason};
use pitchlock::model::{Event, Ms, OpeningHours, TimeRange, DAY_MS};
use pitchlock::notify::NotifyHub;

const H: Ms = 3_600_000;
const DAY: Ms = 20_000 * DAY_MS;

fn test_journal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("pitchlock_test_e2e");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn field_with_default_hours(engine: &Engine) -> Ulid {
    let id = Ulid::new();
    engine
        .create_field(id, OpeningHours::default(), true, false)
        .await
        .unwrap();
    id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_same_slot_admits_exactly_one() {
    init_tracing();
    let engine = Arc::new(
        Engine::new(test_journal_path("race_same_slot.journal"), Arc::new(NotifyHub::new()))
            .unwrap(),
    );
    let fid = field_with_default_hours(&engine).await;

    let tasks = 16;
    let mut handles = Vec::with_capacity(tasks);
    for _ in 0..tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .submit_reservation(fid, Ulid::new(), DAY + 9 * H, DAY + 10 * H)
                .await
                .unwrap()
        }));
    }

    let mut admitted = 0;
    for h in handles {
        match h.await.unwrap() {
            Admission::Admitted { .. } => admitted += 1,
            Admission::Rejected {
                reason: RejectReason::Overlap { .. },
            } => {}
            Admission::Rejected { reason } => panic!("unexpected rejection: {reason:?}"),
        }
    }
    assert_eq!(admitted, 1, "exactly one of the racers may win the slot");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_staggered_slots_admit_a_disjoint_set() {
    init_tracing();
    let engine = Arc::new(
        Engine::new(test_journal_path("race_staggered.journal"), Arc::new(NotifyHub::new()))
            .unwrap(),
    );
    let fid = field_with_default_hours(&engine).await;

    // 28 requests on a half-hour grid, each two hours long, all inside
    // opening hours; every request conflicts with its neighbors
    let mut handles = Vec::new();
    for i in 0..28i64 {
        let engine = engine.clone();
        let from = DAY + 6 * H + i * (H / 2);
        handles.push(tokio::spawn(async move {
            engine
                .submit_reservation(fid, Ulid::new(), from, from + 2 * H)
                .await
                .unwrap()
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let admitted = engine
        .find_overlapping(fid, TimeRange::new(DAY, DAY + DAY_MS))
        .await
        .unwrap();
    assert!(!admitted.is_empty());
    for pair in admitted.windows(2) {
        assert!(
            !pair[0].range.overlaps(&pair[1].range),
            "ledger holds overlapping reservations: {:?} vs {:?}",
            pair[0].range,
            pair[1].range
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn availability_reads_run_alongside_admissions() {
    init_tracing();
    let engine = Arc::new(
        Engine::new(test_journal_path("reads_during_writes.journal"), Arc::new(NotifyHub::new()))
            .unwrap(),
    );
    let fid = field_with_default_hours(&engine).await;

    let writer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for i in 0..16i64 {
                let from = DAY + 6 * H + i * H;
                let _ = engine
                    .submit_reservation(fid, Ulid::new(), from, from + H)
                    .await
                    .unwrap();
            }
        })
    };
    let reader = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for _ in 0..64 {
                let free = engine.query_availability(fid, DAY).await.unwrap();
                // Whatever snapshot we catch, the windows are ordered and disjoint
                for pair in free.windows(2) {
                    assert!(pair[0].to <= pair[1].from);
                }
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();

    // All sixteen hourly slots landed; the day is fully booked 06:00–22:00
    let free = engine.query_availability(fid, DAY).await.unwrap();
    assert!(free.is_empty());
}

#[tokio::test]
async fn notify_streams_admission_and_cancellation() {
    init_tracing();
    let notify = Arc::new(NotifyHub::new());
    let engine =
        Engine::new(test_journal_path("notify_stream.journal"), notify.clone()).unwrap();
    let fid = field_with_default_hours(&engine).await;

    let mut rx = notify.subscribe(fid);

    let Admission::Admitted { reservation_id } = engine
        .submit_reservation(fid, Ulid::new(), DAY + 9 * H, DAY + 10 * H)
        .await
        .unwrap()
    else {
        panic!("expected admission");
    };
    engine.cancel_reservation(reservation_id).await.unwrap();

    match rx.recv().await.unwrap() {
        Event::ReservationAdmitted { id, range, .. } => {
            assert_eq!(id, reservation_id);
            assert_eq!(range, TimeRange::new(DAY + 9 * H, DAY + 10 * H));
        }
        other => panic!("expected admission event, got {other:?}"),
    }
    match rx.recv().await.unwrap() {
        Event::ReservationCancelled { id, .. } => assert_eq!(id, reservation_id),
        other => panic!("expected cancellation event, got {other:?}"),
    }
}

#[tokio::test]
async fn engine_restart_preserves_the_no_overlap_guarantee() {
    init_tracing();
    let path = test_journal_path("restart_guarantee.journal");
    let fid = Ulid::new();

    {
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        engine
            .create_field(fid, OpeningHours::default(), true, false)
            .await
            .unwrap();
        let admission = engine
            .submit_reservation(fid, Ulid::new(), DAY + 18 * H, DAY + 20 * H)
            .await
            .unwrap();
        assert!(admission.is_admitted());
    }

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    let admission = engine
        .submit_reservation(fid, Ulid::new(), DAY + 19 * H, DAY + 21 * H)
        .await
        .unwrap();
    assert!(matches!(
        admission,
        Admission::Rejected {
            reason: RejectReason::Overlap { .. }
        }
    ));

    let free = engine.query_availability(fid, DAY).await.unwrap();
    assert_eq!(
        free,
        vec![
            TimeRange::new(DAY + 6 * H, DAY + 18 * H),
            TimeRange::new(DAY + 20 * H, DAY + 22 * H),
        ]
    );
}

#[tokio::test]
async fn retention_sweep_purges_only_stale_history() {
    init_tracing();
    let engine = Arc::new(
        Engine::new(test_journal_path("retention.journal"), Arc::new(NotifyHub::new())).unwrap(),
    );
    let fid = Ulid::new();
    let all_day = OpeningHours::try_new(0, DAY_MS).unwrap();
    engine.create_field(fid, all_day, true, false).await.unwrap();

    let old = engine
        .submit_reservation(fid, Ulid::new(), DAY + 9 * H, DAY + 10 * H)
        .await
        .unwrap();
    let recent = engine
        .submit_reservation(fid, Ulid::new(), DAY + 30 * DAY_MS + 9 * H, DAY + 30 * DAY_MS + 10 * H)
        .await
        .unwrap();
    let (Admission::Admitted { reservation_id: old_id }, Admission::Admitted { reservation_id: recent_id }) =
        (old, recent)
    else {
        panic!("expected both admissions");
    };

    // Sweep as of a month after the first reservation, keeping a week
    let now = DAY + 31 * DAY_MS;
    for (reservation_id, _) in engine.collect_expired_reservations(now, 7 * DAY_MS) {
        assert!(engine.cancel_reservation(reservation_id).await.unwrap());
    }

    assert!(engine.get_reservation(old_id).await.is_none());
    assert!(engine.get_reservation(recent_id).await.is_some());
}
