use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use crate::protocol::Broadcast;

/// Fan-out of router events to zero or more listeners.
///
/// Listeners that have gone away are pruned on the next publish; having no
/// listener at all is a normal state.
#[derive(Debug, Clone, Default)]
pub struct Bus {
    subscribers: Arc<Mutex<Vec<Sender<Broadcast>>>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<Broadcast> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber and return how many got it.
    pub fn publish(&self, event: &Broadcast) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(name: &str) -> Broadcast {
        Broadcast::KeyboardCommand {
            command: name.to_string(),
            tab_id: 1,
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_not_an_error() {
        let bus = Bus::new();
        assert_eq!(bus.publish(&command("save-content")), 0);
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let bus = Bus::new();
        let a = bus.subscribe();
        let b = bus.clone().subscribe();
        assert_eq!(bus.publish(&command("save-content")), 2);
        assert_eq!(a.try_recv().unwrap(), command("save-content"));
        assert_eq!(b.try_recv().unwrap(), command("save-content"));
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = Bus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);
        assert_eq!(bus.publish(&command("reset-content")), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert!(keep.try_recv().is_ok());
    }
}
