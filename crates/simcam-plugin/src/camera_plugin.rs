//! [`CameraPlugin`] – the single-camera sensor plugin.

use std::sync::Arc;

use simcam_hal::{Description, Sensor, World};
use simcam_middleware::MessageBus;
use simcam_types::SimcamError;
use tracing::debug;

use crate::signal::SignalConnection;
use crate::utils::CameraUtils;

/// Publishes the frames of a single-camera sensor.
pub struct CameraPlugin {
    sensor: Arc<dyn Sensor>,
    utils: CameraUtils,
}

impl CameraPlugin {
    /// Create the plugin and start its deferred load.
    ///
    /// # Errors
    ///
    /// See [`CameraUtils::load`].
    pub fn load(
        bus: MessageBus,
        sensor: Arc<dyn Sensor>,
        world: Arc<dyn World>,
        description: &Description,
    ) -> Result<Self, SimcamError> {
        let utils = CameraUtils::new(bus);
        utils.load(Arc::clone(&sensor), world, description, "")?;
        Ok(Self { sensor, utils })
    }

    /// Like [`load`][Self::load] but runs `on_loaded` once the camera is
    /// initialised.
    pub fn load_with_callback(
        bus: MessageBus,
        sensor: Arc<dyn Sensor>,
        world: Arc<dyn World>,
        description: &Description,
        on_loaded: impl Fn() + Send + Sync + 'static,
    ) -> Result<(Self, SignalConnection), SimcamError> {
        let utils = CameraUtils::new(bus);
        let connection = utils.on_load(on_loaded);
        utils.load(Arc::clone(&sensor), world, description, "")?;
        Ok((Self { sensor, utils }, connection))
    }

    /// Frame hook, called by the simulator after each render.
    ///
    /// An inactive sensor with image subscribers is switched back on and the
    /// frame is skipped.
    pub fn on_new_frame(&self, image: &[u8]) {
        if !self.sensor.is_active() {
            if self.utils.connections().image_connections() > 0 {
                debug!(sensor = self.sensor.name(), "reactivating sensor for subscribers");
                self.sensor.set_active(true);
            }
            return;
        }
        let stamp = self.sensor.last_measurement_time();
        self.utils.put_camera_data(image, stamp);
        self.utils.publish_camera_info(stamp);
    }

    pub fn utils(&self) -> &CameraUtils {
        &self.utils
    }

    pub fn sensor(&self) -> &Arc<dyn Sensor> {
        &self.sensor
    }
}
