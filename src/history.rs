use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, PersonRef};

const CHANNEL_CAPACITY: usize = 256;

/// Change-history broadcast: one channel per owner plus a firehose of every
/// event. Events are published only after they are durable.
pub struct HistoryHub {
    channels: DashMap<PersonRef, broadcast::Sender<Event>>,
    all: broadcast::Sender<Event>,
}

impl Default for HistoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            all: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to one owner's changes. Creates the channel if needed.
    pub fn subscribe(&self, owner: PersonRef) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(owner)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Subscribe to every change across owners.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.all.subscribe()
    }

    /// Publish an event. No-op if nobody is listening.
    pub fn publish(&self, event: &Event) {
        if let Some(sender) = self.channels.get(&event.owner()) {
            let _ = sender.send(event.clone());
        }
        let _ = self.all.send(event.clone());
    }
}
