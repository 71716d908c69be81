use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for committed changes, one channel per trainer, room or class id.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes touching `topic`. Creates the channel if needed.
    pub fn subscribe(&self, topic: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish to every listed topic once. No-op for topics nobody listens on.
    pub fn publish(&self, topics: &[Ulid], event: &Event) {
        let mut seen: Vec<Ulid> = Vec::with_capacity(topics.len());
        for topic in topics {
            if seen.contains(topic) {
                continue;
            }
            seen.push(*topic);
            if let Some(sender) = self.channels.get(topic) {
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Drop a topic's channel, e.g. once a purged class is gone for good.
    pub fn remove(&self, topic: &Ulid) {
        self.channels.remove(topic);
    }
}
