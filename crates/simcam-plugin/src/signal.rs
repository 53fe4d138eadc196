//! A minimal callback signal with RAII connections.
//!
//! Used for the load-completion event: interested parties
//! [`connect`][LoadSignal::connect] a callback and keep the returned
//! [`SignalConnection`] alive for as long as they want to be notified.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Slot = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Slots {
    next_id: AtomicU64,
    slots: Mutex<Vec<(u64, Slot)>>,
}

/// A signal that can be fired any number of times.
#[derive(Clone, Default)]
pub struct LoadSignal {
    inner: Arc<Slots>,
}

impl LoadSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`. It stays registered until the returned
    /// connection is dropped.
    #[must_use = "dropping the connection unregisters the callback"]
    pub fn connect(&self, callback: impl Fn() + Send + Sync + 'static) -> SignalConnection {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.slots.lock().push((id, Arc::new(callback)));
        SignalConnection {
            slots: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Invoke every connected callback on the calling thread.
    pub fn fire(&self) {
        let slots: Vec<Slot> = self
            .inner
            .slots
            .lock()
            .iter()
            .map(|(_, slot)| Arc::clone(slot))
            .collect();
        for slot in slots {
            slot();
        }
    }

    pub fn connection_count(&self) -> usize {
        self.inner.slots.lock().len()
    }
}

/// Keeps a callback connected to a [`LoadSignal`]; dropping it disconnects.
pub struct SignalConnection {
    slots: Weak<Slots>,
    id: u64,
}

impl Drop for SignalConnection {
    fn drop(&mut self) {
        if let Some(slots) = self.slots.upgrade() {
            slots.slots.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn fire_invokes_connected_callbacks() {
        let signal = LoadSignal::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _conn = signal.connect(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        signal.fire();
        signal.fire();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_connection_disconnects() {
        let signal = LoadSignal::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let conn = signal.connect(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(signal.connection_count(), 1);
        drop(conn);
        signal.fire();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn connection_outliving_signal_is_harmless() {
        let signal = LoadSignal::new();
        let conn = signal.connect(|| {});
        drop(signal);
        drop(conn);
    }
}
