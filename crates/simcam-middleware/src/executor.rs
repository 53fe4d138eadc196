//! [`CallbackQueue`] – single-threaded subscription executor.
//!
//! Each queue owns one OS thread running a current-thread Tokio runtime.
//! Subscription handlers registered on the queue are invoked one at a time
//! on that thread, never on the caller's thread, so a simulator's update
//! loop is not blocked by middleware-side callbacks.
//!
//! # Example
//!
//! ```rust
//! use simcam_middleware::{CallbackQueue, MessageBus, PeerCallbacks};
//! use simcam_types::{Event, EventPayload};
//!
//! let bus = MessageBus::default();
//! let publisher = bus.advertise("/cam/set_update_rate", PeerCallbacks::default());
//! let (tx, rx) = std::sync::mpsc::channel();
//!
//! let handle = CallbackQueue::new("camera_queue")
//!     .with_subscription(bus.subscribe("/cam/set_update_rate"), move |event| {
//!         let _ = tx.send(event);
//!     })
//!     .spawn()
//!     .expect("queue thread must start");
//!
//! publisher.publish(Event::new("/ctl", EventPayload::Float64(5.0))).unwrap();
//! assert!(rx.recv_timeout(std::time::Duration::from_secs(1)).is_ok());
//! drop(handle); // stops and joins the thread
//! ```

use std::thread::JoinHandle;

use simcam_types::{Event, SimcamError};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::bus::TopicReceiver;

type Handler = Box<dyn FnMut(Event) + Send>;

/// Builder for a dedicated callback thread.
pub struct CallbackQueue {
    name: String,
    subscriptions: Vec<(TopicReceiver, Handler)>,
}

impl CallbackQueue {
    /// Create an empty queue. `name` becomes the OS thread name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscriptions: Vec::new(),
        }
    }

    /// Service `receiver` on the queue thread, passing every event to
    /// `handler`.
    pub fn with_subscription(
        mut self,
        receiver: TopicReceiver,
        handler: impl FnMut(Event) + Send + 'static,
    ) -> Self {
        self.subscriptions.push((receiver, Box::new(handler)));
        self
    }

    /// Start the queue thread.
    ///
    /// # Errors
    ///
    /// Returns [`SimcamError::Channel`] if the OS refuses to spawn the
    /// thread.
    pub fn spawn(self) -> Result<QueueHandle, SimcamError> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let name = self.name.clone();
        let subscriptions = self.subscriptions;

        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_queue(subscriptions, shutdown_rx))
            .map_err(|e| SimcamError::Channel(format!("failed to spawn queue '{name}': {e}")))?;

        debug!(queue = %self.name, "callback queue started");
        Ok(QueueHandle {
            name: self.name,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }
}

fn run_queue(subscriptions: Vec<(TopicReceiver, Handler)>, shutdown: oneshot::Receiver<()>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build callback queue runtime");
            return;
        }
    };

    runtime.block_on(async move {
        let mut tasks = JoinSet::new();
        for (mut receiver, mut handler) in subscriptions {
            tasks.spawn(async move {
                loop {
                    match receiver.recv().await {
                        Ok(event) => handler(event),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(topic = %receiver.topic(), lagged_by = n, "callback queue lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }

        // Resolves on an explicit shutdown or when the handle is dropped.
        let _ = shutdown.await;
        tasks.shutdown().await;
    });
}

/// Running queue thread. Dropping the handle stops and joins the thread.
pub struct QueueHandle {
    name: String,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl QueueHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the queue and wait for its thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!(queue = %self.name, "callback queue thread panicked");
        }
    }
}

impl Drop for QueueHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MessageBus, PeerCallbacks};
    use simcam_types::EventPayload;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn handler_runs_on_queue_thread() {
        let bus = MessageBus::default();
        let publisher = bus.advertise("/cam/set_hfov", PeerCallbacks::default());
        let (tx, rx) = mpsc::channel();

        let handle = CallbackQueue::new("camera_queue_test")
            .with_subscription(bus.subscribe("/cam/set_hfov"), move |_event| {
                let name = std::thread::current().name().map(str::to_string);
                let _ = tx.send(name);
            })
            .spawn()
            .unwrap();

        publisher
            .publish(Event::new("/ctl", EventPayload::Float64(1.2)))
            .unwrap();
        let thread_name = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(thread_name.as_deref(), Some("camera_queue_test"));
        assert_eq!(handle.name(), "camera_queue_test");
    }

    #[test]
    fn handlers_are_serialised_in_publish_order() {
        let bus = MessageBus::default();
        let publisher = bus.advertise("/rate", PeerCallbacks::default());
        let (tx, rx) = mpsc::channel();

        let _handle = CallbackQueue::new("ordered")
            .with_subscription(bus.subscribe("/rate"), move |event| {
                if let EventPayload::Float64(v) = event.payload {
                    let _ = tx.send(v);
                }
            })
            .spawn()
            .unwrap();

        for v in [1.0, 2.0, 3.0] {
            publisher.publish(Event::new("/ctl", EventPayload::Float64(v))).unwrap();
        }
        let got: Vec<f64> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        assert_eq!(got, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn shutdown_releases_subscriptions() {
        let bus = MessageBus::default();
        let handle = CallbackQueue::new("short_lived")
            .with_subscription(bus.subscribe("/x"), |_| {})
            .spawn()
            .unwrap();
        assert_eq!(bus.subscriber_count("/x"), 1);
        handle.shutdown();
        assert_eq!(bus.subscriber_count("/x"), 0);
    }
}
