//! Subscriber reference counting and sensor activation.
//!
//! [`SubscriberCount`] counts camera-info subscribers, which never touch
//! activation. [`ConnectionTracker`] counts image subscribers:
//!
//! * the first image subscriber remembers whether the sensor was already
//!   active, then switches it on;
//! * the last image subscriber leaving switches it off again, unless it was
//!   active before the first subscriber arrived.
//!
//! A tracker can be shared (via `Arc`) by several camera instances that sit
//! on the same sensor, so the sensor stays on while any of their image
//! topics has a listener. Camera-info counts always belong to one camera.

use parking_lot::Mutex;
use simcam_hal::Sensor;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Counts {
    image: usize,
    was_active: bool,
}

/// Image subscriber count and activation memory for one sensor.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    counts: Mutex<Counts>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// An image subscriber connected.
    pub fn image_connect(&self, sensor: &dyn Sensor) {
        let mut counts = self.counts.lock();
        if counts.image == 0 {
            counts.was_active = sensor.is_active();
        }
        counts.image += 1;
        sensor.set_active(true);
        debug!(sensor = sensor.name(), image_connections = counts.image, "image subscriber connected");
    }

    /// An image subscriber disconnected. Unbalanced calls are ignored.
    pub fn image_disconnect(&self, sensor: &dyn Sensor) {
        let mut counts = self.counts.lock();
        if counts.image == 0 {
            warn!(sensor = sensor.name(), "image disconnect without a matching connect");
            return;
        }
        counts.image -= 1;
        if counts.image == 0 && !counts.was_active {
            sensor.set_active(false);
        }
        debug!(sensor = sensor.name(), image_connections = counts.image, "image subscriber disconnected");
    }

    pub fn image_connections(&self) -> usize {
        self.counts.lock().image
    }

    /// Whether the sensor was active before the current run of image
    /// subscribers began.
    pub fn was_active(&self) -> bool {
        self.counts.lock().was_active
    }
}

/// Subscriber count of one camera's camera-info topic.
#[derive(Debug, Default)]
pub struct SubscriberCount {
    count: Mutex<usize>,
}

impl SubscriberCount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self) {
        *self.count.lock() += 1;
    }

    /// Unbalanced calls are ignored.
    pub fn disconnect(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
    }

    pub fn get(&self) -> usize {
        *self.count.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use simcam_hal::{SimCameraSensor, SimRenderCamera};

    fn sensor() -> std::sync::Arc<SimCameraSensor> {
        SimCameraSensor::new(
            "cam",
            "camera_link",
            10.0,
            vec![SimRenderCamera::new("camera", 4, 4, "L8", 1.0)],
        )
    }

    #[test]
    fn first_image_subscriber_activates_sensor() {
        let sensor = sensor();
        let tracker = ConnectionTracker::new();
        tracker.image_connect(sensor.as_ref());
        assert!(sensor.is_active());
        assert_eq!(tracker.image_connections(), 1);
        assert!(!tracker.was_active());
    }

    #[test]
    fn last_image_subscriber_deactivates_sensor() {
        let sensor = sensor();
        let tracker = ConnectionTracker::new();
        tracker.image_connect(sensor.as_ref());
        tracker.image_connect(sensor.as_ref());
        tracker.image_disconnect(sensor.as_ref());
        assert!(sensor.is_active(), "one subscriber is still listening");
        tracker.image_disconnect(sensor.as_ref());
        assert!(!sensor.is_active());
    }

    #[test]
    fn previously_active_sensor_stays_active() {
        let sensor = sensor();
        sensor.set_active(true);
        let tracker = ConnectionTracker::new();
        tracker.image_connect(sensor.as_ref());
        tracker.image_disconnect(sensor.as_ref());
        assert!(sensor.is_active());
        assert!(tracker.was_active());
    }

    #[test]
    fn unbalanced_disconnect_is_ignored() {
        let sensor = sensor();
        let tracker = ConnectionTracker::new();
        let info = SubscriberCount::new();
        tracker.image_disconnect(sensor.as_ref());
        info.disconnect();
        assert_eq!(tracker.image_connections(), 0);
        assert_eq!(info.get(), 0);
        assert_eq!(sensor.activation_changes(), 0);
    }

    #[test]
    fn info_subscribers_do_not_activate_sensor() {
        let sensor = sensor();
        let tracker = ConnectionTracker::new();
        let info = SubscriberCount::new();
        info.connect();
        info.connect();
        assert_eq!(info.get(), 2);
        assert_eq!(tracker.image_connections(), 0);
        assert!(!sensor.is_active());
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        ImageConnect,
        ImageDisconnect,
        InfoConnect,
        InfoDisconnect,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::ImageConnect),
            Just(Op::ImageDisconnect),
            Just(Op::InfoConnect),
            Just(Op::InfoDisconnect),
        ]
    }

    proptest! {
        #[test]
        fn counts_track_a_clamped_model(initially_active: bool, ops in proptest::collection::vec(op(), 0..64)) {
            let sensor = sensor();
            sensor.set_active(initially_active);
            let tracker = ConnectionTracker::new();
            let info_count = SubscriberCount::new();
            let (mut image, mut info) = (0usize, 0usize);

            for op in ops {
                match op {
                    Op::ImageConnect => { tracker.image_connect(sensor.as_ref()); image += 1; }
                    Op::ImageDisconnect => { tracker.image_disconnect(sensor.as_ref()); image = image.saturating_sub(1); }
                    Op::InfoConnect => { info_count.connect(); info += 1; }
                    Op::InfoDisconnect => { info_count.disconnect(); info = info.saturating_sub(1); }
                }
                prop_assert_eq!(tracker.image_connections(), image);
                prop_assert_eq!(info_count.get(), info);
                if image > 0 {
                    prop_assert!(sensor.is_active());
                }
            }
        }

        #[test]
        fn n_connects_then_n_disconnects_restore_activation(initially_active: bool, n in 1usize..16) {
            let sensor = sensor();
            sensor.set_active(initially_active);
            let tracker = ConnectionTracker::new();
            for _ in 0..n {
                tracker.image_connect(sensor.as_ref());
            }
            for _ in 0..n {
                tracker.image_disconnect(sensor.as_ref());
            }
            prop_assert_eq!(sensor.is_active(), initially_active);
            prop_assert_eq!(tracker.image_connections(), 0);
        }
    }
}
