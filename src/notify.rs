use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub fanning ledger events out per field. Lets the embedding
/// application push "this slot was just taken" updates without polling.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for one field. Creates the channel if needed.
    pub fn subscribe(&self, field_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(field_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish an event. No-op if nobody is listening on that field.
    pub fn send(&self, field_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&field_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a field's channel, e.g. after the field is deleted.
    pub fn remove(&self, field_id: &Ulid) {
        self.channels.remove(field_id);
    }
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}
