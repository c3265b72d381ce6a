// src/window/messaging.rs
//! Cross-window message delivery.
//!
//! [`MessageHub`] stands in for the opener window's message listener list.
//! Every registered [`MessageListener`] receives each event posted after its
//! registration, in posting order. Listeners deregister themselves on drop,
//! so a flow cannot leak a registration on any exit path.

use crate::error::WindowError;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// A window that can be replied to (the `source` of a message event).
pub trait MessageSource: Send + Sync {
    /// Posts `message` to the window, delivered only if the window's current
    /// origin equals `target_origin`.
    fn post_message(&self, message: Value, target_origin: &str) -> Result<(), WindowError>;

    /// Host identifier of the window, when the host can tell windows apart.
    fn window_id(&self) -> Option<u64> {
        None
    }
}

/// One delivered cross-window message.
#[derive(Clone)]
pub struct MessageEvent {
    /// Origin of the sending window, e.g. "https://idp.example"
    pub origin: String,
    pub data: Value,
    pub source: Option<Arc<dyn MessageSource>>,
}

impl MessageEvent {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
            source: None,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn MessageSource>) -> Self {
        self.source = Some(source);
        self
    }
}

impl fmt::Debug for MessageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEvent")
            .field("origin", &self.origin)
            .field("data", &self.data)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

/// Process-wide registry of message listeners.
///
/// Shared behind an `Arc` by everything that posts or listens.
pub struct MessageHub {
    next_listener_id: AtomicU64,
    listeners: Mutex<HashMap<u64, mpsc::UnboundedSender<MessageEvent>>>,
}

impl MessageHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_listener_id: AtomicU64::new(0),
            listeners: Mutex::new(HashMap::new()),
        })
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<MessageEvent>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a listener. It stays registered until the returned guard is dropped.
    pub fn add_listener(self: &Arc<Self>) -> MessageListener {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.registry().insert(id, sender);
        debug!("message listener {} registered", id);
        MessageListener {
            id,
            hub: Arc::clone(self),
            receiver,
        }
    }

    /// Delivers `event` to every registered listener.
    ///
    /// # Returns
    /// How many listeners received the event
    pub fn post(&self, event: MessageEvent) -> usize {
        let registry = self.registry();
        registry
            .values()
            .filter(|sender| sender.send(event.clone()).is_ok())
            .count()
    }

    /// Number of currently registered listeners.
    pub fn listener_count(&self) -> usize {
        self.registry().len()
    }

    fn remove_listener(&self, id: u64) -> bool {
        let removed = self.registry().remove(&id).is_some();
        if removed {
            debug!("message listener {} removed", id);
        }
        removed
    }
}

/// A registration on a [`MessageHub`]. Deregisters on drop.
pub struct MessageListener {
    id: u64,
    hub: Arc<MessageHub>,
    receiver: mpsc::UnboundedReceiver<MessageEvent>,
}

impl MessageListener {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next event. The hub keeps the sending half until this
    /// guard is dropped, so a live listener does not yield `None`.
    pub async fn next(&mut self) -> Option<MessageEvent> {
        self.receiver.recv().await
    }

    /// Returns an already queued event without waiting.
    #[cfg(test)]
    fn try_next(&mut self) -> Option<MessageEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for MessageListener {
    fn drop(&mut self) {
        self.hub.remove_listener(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_post_reaches_every_listener_in_order() {
        let hub = MessageHub::new();
        let mut first = hub.add_listener();
        let mut second = hub.add_listener();
        assert_ne!(first.id(), second.id());

        assert_eq!(hub.post(MessageEvent::new("https://a.example", json!(1))), 2);
        assert_eq!(hub.post(MessageEvent::new("https://a.example", json!(2))), 2);

        assert_eq!(first.next().await.unwrap().data, json!(1));
        assert_eq!(first.next().await.unwrap().data, json!(2));
        assert_eq!(second.next().await.unwrap().data, json!(1));
        assert_eq!(second.next().await.unwrap().data, json!(2));
    }

    #[test]
    fn test_listener_only_sees_events_after_registration() {
        let hub = MessageHub::new();
        assert_eq!(hub.post(MessageEvent::new("https://a.example", json!("early"))), 0);
        let mut listener = hub.add_listener();
        assert!(listener.try_next().is_none());
        hub.post(MessageEvent::new("https://a.example", json!("late")));
        assert_eq!(listener.try_next().unwrap().data, json!("late"));
    }

    #[test]
    fn test_drop_deregisters() {
        let hub = MessageHub::new();
        let listener = hub.add_listener();
        let other = hub.add_listener();
        assert_eq!(hub.listener_count(), 2);

        drop(listener);
        assert_eq!(hub.listener_count(), 1);
        assert_eq!(hub.post(MessageEvent::new("https://a.example", json!(null))), 1);

        drop(other);
        assert_eq!(hub.listener_count(), 0);
    }
}
