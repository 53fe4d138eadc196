//! [`MultiCamera`] – one [`CameraUtils`] per rendering camera of a
//! multi-camera (e.g. stereo) sensor.
//!
//! Each camera publishes under `<camera_name>/<camera>`. The first camera is
//! the reference with a zero baseline; every other camera carries the
//! description's `hack_baseline`. All cameras share one
//! [`ConnectionTracker`], so the sensor stays on while any of their image
//! topics has a listener. Camera-info subscribers are counted per camera.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use simcam_hal::{Description, Sensor, World};
use simcam_middleware::MessageBus;
use simcam_types::SimcamError;
use tracing::{debug, info};

use crate::connection::ConnectionTracker;
use crate::signal::SignalConnection;
use crate::utils::CameraUtils;

pub struct MultiCamera {
    sensor: Arc<dyn Sensor>,
    connections: Arc<ConnectionTracker>,
    cameras: Vec<CameraUtils>,
}

impl MultiCamera {
    /// Start the deferred load of every camera on `sensor`.
    ///
    /// # Errors
    ///
    /// [`SimcamError::Configuration`] when the sensor has no cameras, or any
    /// error from [`CameraUtils::load`].
    pub fn load(
        bus: MessageBus,
        sensor: Arc<dyn Sensor>,
        world: Arc<dyn World>,
        description: &Description,
    ) -> Result<Self, SimcamError> {
        Self::load_inner(bus, sensor, world, description, None).map(|(multi, _)| multi)
    }

    /// Like [`load`][Self::load]; `on_loaded` runs once after every camera
    /// has finished loading.
    pub fn load_with_callback(
        bus: MessageBus,
        sensor: Arc<dyn Sensor>,
        world: Arc<dyn World>,
        description: &Description,
        on_loaded: impl Fn() + Send + Sync + 'static,
    ) -> Result<(Self, Vec<SignalConnection>), SimcamError> {
        Self::load_inner(bus, sensor, world, description, Some(Arc::new(on_loaded)))
    }

    fn load_inner(
        bus: MessageBus,
        sensor: Arc<dyn Sensor>,
        world: Arc<dyn World>,
        description: &Description,
        on_loaded: Option<Arc<dyn Fn() + Send + Sync>>,
    ) -> Result<(Self, Vec<SignalConnection>), SimcamError> {
        let rendering = sensor.cameras();
        if rendering.is_empty() {
            return Err(SimcamError::Configuration(format!(
                "sensor '{}' has no cameras",
                sensor.name()
            )));
        }

        let connections = Arc::new(ConnectionTracker::new());
        let remaining = Arc::new(AtomicUsize::new(rendering.len()));
        let mut cameras = Vec::with_capacity(rendering.len());
        let mut handles = Vec::new();

        for (index, camera) in rendering.iter().enumerate() {
            let utils = CameraUtils::with_connections(bus.clone(), Arc::clone(&connections));
            if let Some(callback) = &on_loaded {
                let (callback, remaining) = (Arc::clone(callback), Arc::clone(&remaining));
                handles.push(utils.on_load(move || {
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        callback();
                    }
                }));
            }
            let suffix = format!("/{}", camera.name());
            let baseline = if index == 0 { 0.0 } else { description.plugin.hack_baseline };
            utils.load_camera(
                Arc::clone(&sensor),
                Arc::clone(&world),
                description,
                &suffix,
                index,
                Some(baseline),
            )?;
            debug!(camera = camera.name(), index, "camera load started");
            cameras.push(utils);
        }

        info!(sensor = sensor.name(), cameras = cameras.len(), "multi-camera sensor loading");
        let multi = Self {
            sensor,
            connections,
            cameras,
        };
        Ok((multi, handles))
    }

    /// Frame hook for camera `index`. Out-of-range indices are ignored.
    pub fn on_new_frame(&self, index: usize, image: &[u8]) {
        let Some(utils) = self.cameras.get(index) else {
            return;
        };
        if !self.sensor.is_active() {
            if self.connections.image_connections() > 0 {
                self.sensor.set_active(true);
            }
            return;
        }
        let stamp = self.sensor.last_measurement_time();
        utils.put_camera_data(image, stamp);
        utils.publish_camera_info(stamp);
    }

    pub fn cameras(&self) -> &[CameraUtils] {
        &self.cameras
    }

    pub fn connections(&self) -> &Arc<ConnectionTracker> {
        &self.connections
    }

    pub fn sensor(&self) -> &Arc<dyn Sensor> {
        &self.sensor
    }
}
