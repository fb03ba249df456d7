//! Subscriber registry
//!
//! Every decoded event is dispatched twice: once as a generic
//! [`Notification::Message`] and once as a [`Notification::Command`]
//! keyed by the event's command, so subscribers can listen broadly or
//! narrowly.

use bytes::Bytes;
use danmu_core::{Command, Event, Header};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Something a connection tells its subscribers
#[derive(Debug, Clone, Copy)]
pub enum Notification<'a> {
    Open,
    Close,
    /// Raw inbound packet batch, before decoding
    Buffer(&'a Bytes),
    Message {
        event: &'a Event,
        header: &'a Header,
    },
    Command {
        command: &'a Command,
        event: &'a Event,
        header: &'a Header,
    },
}

impl Notification<'_> {
    pub fn matches(&self, topic: &Topic) -> bool {
        match (self, topic) {
            (Notification::Open, Topic::Open) => true,
            (Notification::Close, Topic::Close) => true,
            (Notification::Buffer(_), Topic::Buffer) => true,
            (Notification::Message { .. }, Topic::Message) => true,
            (Notification::Command { command, .. }, Topic::Command(wanted)) => *command == wanted,
            _ => false,
        }
    }
}

/// What a subscriber listens to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Open,
    Close,
    Buffer,
    Message,
    Command(Command),
}

/// Subscriber callback
pub type Handler = Arc<dyn Fn(&Notification<'_>) + Send + Sync>;

/// Handle for removing a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u32);

#[derive(Default)]
pub(crate) struct Subscribers {
    handlers: DashMap<u32, (Topic, Handler)>,
    next_id: AtomicU32,
}

impl Subscribers {
    pub(crate) fn add(&self, topic: Topic, handler: Handler) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.handlers.insert(id, (topic, handler));
        SubscriptionId(id)
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        self.handlers.remove(&id.0).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Call every matching handler in subscription order
    ///
    /// Handlers run outside the map's locks so they may subscribe,
    /// unsubscribe or close the connection.
    pub(crate) fn emit(&self, notification: &Notification<'_>) {
        let mut matching: Vec<(u32, Handler)> = self
            .handlers
            .iter()
            .filter(|entry| notification.matches(&entry.value().0))
            .map(|entry| (*entry.key(), entry.value().1.clone()))
            .collect();
        matching.sort_by_key(|(id, _)| *id);

        for (_, handler) in matching {
            handler(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use danmu_core::Operation;
    use parking_lot::Mutex;

    #[test]
    fn test_command_topic_matching() {
        let event = Event::Heartbeat { online: 1 };
        let header = Header::new(Operation::HeartbeatReply, 4);
        let command = Command::Heartbeat;
        let n = Notification::Command {
            command: &command,
            event: &event,
            header: &header,
        };

        assert!(n.matches(&Topic::Command(Command::Heartbeat)));
        assert!(!n.matches(&Topic::Command(Command::DanmuMsg)));
        assert!(!n.matches(&Topic::Message));
    }

    #[test]
    fn test_emit_in_subscription_order_and_remove() {
        let subs = Subscribers::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut ids = Vec::new();
        for i in 0..5 {
            let seen = seen.clone();
            ids.push(subs.add(Topic::Open, Arc::new(move |_| seen.lock().push(i))));
        }
        subs.add(Topic::Close, Arc::new(|_| panic!("close handler called on open")));

        subs.emit(&Notification::Open);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);

        assert!(subs.remove(ids[2]));
        assert!(!subs.remove(ids[2]));
        seen.lock().clear();
        subs.emit(&Notification::Open);
        assert_eq!(*seen.lock(), vec![0, 1, 3, 4]);
        assert_eq!(subs.len(), 5);
    }
}
