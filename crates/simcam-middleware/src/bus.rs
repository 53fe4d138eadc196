//! Topic-based publish/subscribe bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so every
//! subscriber receives every message and a slow subscriber never blocks the
//! publisher; it lags and loses the oldest messages instead.
//!
//! Unlike a plain broadcast channel, publishers can register
//! [`PeerCallbacks`] that fire whenever a subscriber joins or leaves the
//! topic. Sensor bridges use these to switch expensive rendering on only
//! while somebody is listening.
//!
//! # Callback semantics
//!
//! | Event | Callback fired |
//! |---|---|
//! | [`MessageBus::subscribe`] | `on_connect` of every publisher on the topic |
//! | [`TopicReceiver`] dropped | `on_disconnect` of every publisher on the topic |
//! | [`MessageBus::advertise`] on a topic with `n` subscribers | the new publisher's `on_connect`, `n` times |
//!
//! Callbacks run synchronously on the thread that triggered them, after the
//! bus lock has been released.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use simcam_types::{Event, SimcamError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default channel capacity (number of buffered messages per topic before
/// old ones are dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 16;

/// A subscriber lifecycle callback.
pub type PeerCallback = Arc<dyn Fn() + Send + Sync>;

/// Callbacks a publisher wants invoked as subscribers come and go.
#[derive(Clone, Default)]
pub struct PeerCallbacks {
    pub on_connect: Option<PeerCallback>,
    pub on_disconnect: Option<PeerCallback>,
}

impl PeerCallbacks {
    pub fn new(
        on_connect: impl Fn() + Send + Sync + 'static,
        on_disconnect: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_connect: Some(Arc::new(on_connect)),
            on_disconnect: Some(Arc::new(on_disconnect)),
        }
    }
}

impl std::fmt::Debug for PeerCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerCallbacks")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .finish()
    }
}

struct TopicEntry {
    sender: broadcast::Sender<Event>,
    publishers: Vec<(u64, PeerCallbacks)>,
    subscribers: usize,
}

struct BusInner {
    capacity: usize,
    topics: Mutex<HashMap<String, TopicEntry>>,
    next_publisher_id: AtomicU64,
}

impl BusInner {
    fn entry<'a>(
        &self,
        topics: &'a mut HashMap<String, TopicEntry>,
        topic: &str,
    ) -> &'a mut TopicEntry {
        topics.entry(topic.to_string()).or_insert_with(|| {
            let (sender, _) = broadcast::channel(self.capacity);
            TopicEntry {
                sender,
                publishers: Vec::new(),
                subscribers: 0,
            }
        })
    }
}

/// Shared message bus. Clone it cheaply – all clones share the same topics.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    /// Create a new bus. `capacity` is applied to every topic independently.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                capacity: capacity.max(1),
                topics: Mutex::new(HashMap::new()),
                next_publisher_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a publisher on `topic`.
    ///
    /// `callbacks.on_connect` is invoked once for every subscriber already
    /// present, so the publisher's view of the subscriber count starts out
    /// correct.
    pub fn advertise(&self, topic: &str, callbacks: PeerCallbacks) -> TopicPublisher {
        let id = self.inner.next_publisher_id.fetch_add(1, Ordering::Relaxed);
        let (sender, existing) = {
            let mut topics = self.inner.topics.lock();
            let entry = self.inner.entry(&mut topics, topic);
            entry.publishers.push((id, callbacks.clone()));
            (entry.sender.clone(), entry.subscribers)
        };
        debug!(topic, existing_subscribers = existing, "advertised topic");

        if let Some(on_connect) = &callbacks.on_connect {
            for _ in 0..existing {
                on_connect();
            }
        }

        TopicPublisher {
            bus: Arc::clone(&self.inner),
            topic: topic.to_string(),
            id,
            sender,
        }
    }

    /// Subscribe to `topic`, creating it if nobody has advertised it yet.
    ///
    /// Fires `on_connect` on every publisher of the topic before returning.
    pub fn subscribe(&self, topic: &str) -> TopicReceiver {
        let (receiver, callbacks) = {
            let mut topics = self.inner.topics.lock();
            let entry = self.inner.entry(&mut topics, topic);
            entry.subscribers += 1;
            let callbacks: Vec<PeerCallback> = entry
                .publishers
                .iter()
                .filter_map(|(_, cb)| cb.on_connect.clone())
                .collect();
            (entry.sender.subscribe(), callbacks)
        };
        debug!(topic, "subscriber connected");

        for on_connect in callbacks {
            on_connect();
        }

        TopicReceiver {
            bus: Arc::clone(&self.inner),
            topic: topic.to_string(),
            receiver,
        }
    }

    /// Number of live subscribers on `topic` (0 for unknown topics).
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .lock()
            .get(topic)
            .map_or(0, |entry| entry.subscribers)
    }

    /// Names of every topic the bus has seen, sorted.
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.topics.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("capacity", &self.inner.capacity)
            .field("topics", &self.topic_names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Publishing handle for a single topic.
///
/// Dropping it unregisters its [`PeerCallbacks`]; messages already
/// delivered stay with the subscribers.
pub struct TopicPublisher {
    bus: Arc<BusInner>,
    topic: String,
    id: u64,
    sender: broadcast::Sender<Event>,
}

impl TopicPublisher {
    /// Publish `event` to every current subscriber.
    ///
    /// Returns the number of subscribers that were handed the event.
    ///
    /// # Errors
    ///
    /// Returns [`SimcamError::Channel`] when nobody is subscribed.
    pub fn publish(&self, event: Event) -> Result<usize, SimcamError> {
        self.sender.send(event).map_err(|_| {
            SimcamError::Channel(format!("no subscribers for topic {}", self.topic))
        })
    }

    /// Number of live subscribers on this topic.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for TopicPublisher {
    fn drop(&mut self) {
        let mut topics = self.bus.topics.lock();
        if let Some(entry) = topics.get_mut(&self.topic) {
            entry.publishers.retain(|(id, _)| *id != self.id);
        }
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single topic.
///
/// Obtained via [`MessageBus::subscribe`]. Dropping it counts as a
/// disconnect and fires the publishers' `on_disconnect` callbacks.
pub struct TopicReceiver {
    bus: Arc<BusInner>,
    topic: String,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking receive, skipping over any lag gap.
    ///
    /// Returns `None` when no message is currently queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "receiver lagged");
                }
                Err(_) => return None,
            }
        }
    }

    /// Drain every queued message.
    pub fn drain(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for TopicReceiver {
    fn drop(&mut self) {
        let callbacks: Vec<PeerCallback> = {
            let mut topics = self.bus.topics.lock();
            match topics.get_mut(&self.topic) {
                Some(entry) => {
                    entry.subscribers = entry.subscribers.saturating_sub(1);
                    entry
                        .publishers
                        .iter()
                        .filter_map(|(_, cb)| cb.on_disconnect.clone())
                        .collect()
                }
                None => Vec::new(),
            }
        };
        debug!(topic = %self.topic, "subscriber disconnected");

        for on_disconnect in callbacks {
            on_disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simcam_types::EventPayload;
    use std::sync::atomic::AtomicUsize;

    fn make_event(value: f64) -> Event {
        Event::new("/test", EventPayload::Float64(value))
    }

    fn counting_callbacks() -> (PeerCallbacks, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let connects = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&connects);
        let d = Arc::clone(&disconnects);
        let callbacks = PeerCallbacks::new(
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                d.fetch_add(1, Ordering::SeqCst);
            },
        );
        (callbacks, connects, disconnects)
    }

    #[tokio::test]
    async fn publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = MessageBus::default();
        let publisher = bus.advertise("/cam/image_raw", PeerCallbacks::default());
        let mut rx = bus.subscribe("/cam/image_raw");

        let event = make_event(1.0);
        assert_eq!(publisher.publish(event.clone())?, 1);

        let received = rx.recv().await?;
        assert_eq!(received.id, event.id);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_returns_error() {
        let bus = MessageBus::default();
        let publisher = bus.advertise("/nobody", PeerCallbacks::default());
        let result = publisher.publish(make_event(0.0));
        assert!(matches!(result, Err(SimcamError::Channel(_))));
    }

    #[test]
    fn subscribe_and_drop_fire_peer_callbacks() {
        let bus = MessageBus::default();
        let (callbacks, connects, disconnects) = counting_callbacks();
        let _publisher = bus.advertise("/cam/image_raw", callbacks);

        let rx1 = bus.subscribe("/cam/image_raw");
        let rx2 = bus.subscribe("/cam/image_raw");
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(bus.subscriber_count("/cam/image_raw"), 2);

        drop(rx1);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        drop(rx2);
        assert_eq!(disconnects.load(Ordering::SeqCst), 2);
        assert_eq!(bus.subscriber_count("/cam/image_raw"), 0);
    }

    #[test]
    fn late_advertise_sees_existing_subscribers() {
        let bus = MessageBus::default();
        let _rx = bus.subscribe("/cam/camera_info");
        let (callbacks, connects, _) = counting_callbacks();
        let _publisher = bus.advertise("/cam/camera_info", callbacks);
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_publisher_no_longer_receives_callbacks() {
        let bus = MessageBus::default();
        let (callbacks, connects, _) = counting_callbacks();
        let publisher = bus.advertise("/t", callbacks);
        drop(publisher);
        let _rx = bus.subscribe("/t");
        assert_eq!(connects.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn subscribers_on_other_topics_do_not_trigger_callbacks() {
        let bus = MessageBus::default();
        let (callbacks, connects, _) = counting_callbacks();
        let _publisher = bus.advertise("/a", callbacks);
        let _rx = bus.subscribe("/b");
        assert_eq!(connects.load(Ordering::SeqCst), 0);
        assert_eq!(bus.topic_names(), vec!["/a".to_string(), "/b".to_string()]);
    }

    #[test]
    fn try_recv_skips_lag_and_drains() {
        let bus = MessageBus::new(4);
        let publisher = bus.advertise("/flood", PeerCallbacks::default());
        let mut rx = bus.subscribe("/flood");
        for i in 0..20 {
            publisher.publish(make_event(f64::from(i))).unwrap();
        }
        let drained = rx.drain();
        assert_eq!(drained.len(), 4, "only the newest `capacity` messages survive");
        assert!(rx.try_recv().is_none());
    }
}
