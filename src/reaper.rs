use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::model::Ms;

/// Background task that purges reservations long past their end time.
/// Opt-in: the host decides the retention window and whether to spawn
/// this at all — admitted history is otherwise kept forever.
pub async fn run_retention(engine: Arc<Engine>, keep_for: Ms, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as Ms;
        let expired = engine.collect_expired_reservations(now, keep_for);
        for (reservation_id, _field_id) in expired {
            match engine.cancel_reservation(reservation_id).await {
                Ok(true) => info!("retention: purged reservation {reservation_id}"),
                // Already gone — cancelled between collect and purge
                Ok(false) => {}
                Err(e) => tracing::debug!("retention skip {reservation_id}: {e}"),
            }
        }
    }
}

/// Background task that compacts the journal once enough appends have
/// accumulated since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.journal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_journal().await {
            Ok(()) => info!("compacted journal after {appends} appends"),
            Err(e) => tracing::warn!("journal compaction failed: {e}"),
        }
    }
}
