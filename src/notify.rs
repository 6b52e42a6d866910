use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, MemberId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for reservation events: one channel per member plus a
/// firehose carrying every event.
pub struct NotifyHub {
    channels: DashMap<MemberId, broadcast::Sender<Event>>,
    all: broadcast::Sender<Event>,
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
            all: broadcast::channel(CHANNEL_CAPACITY * 4).0,
        }
    }

    /// Subscribe to one member's events. Creates the channel if needed.
    pub fn subscribe(&self, member: &MemberId) -> broadcast::Receiver<Event> {
        self.channels
            .entry(member.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.all.subscribe()
    }

    /// Publish to the firehose and to each recipient's channel. Never blocks.
    /// A channel whose subscribers have all gone is dropped.
    pub fn send(&self, recipients: &[&MemberId], event: &Event) {
        let _ = self.all.send(event.clone());
        for member in recipients {
            let delivered = match self.channels.get(*member) {
                Some(sender) => sender.send(event.clone()).is_ok(),
                None => continue,
            };
            if !delivered {
                self.remove_idle(member);
            }
        }
    }

    /// Drop a member's channel once its last subscriber is gone.
    pub fn remove_idle(&self, member: &MemberId) {
        self.channels
            .remove_if(member, |_, sender| sender.receiver_count() == 0);
    }
}
