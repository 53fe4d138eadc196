//! `Sensor` and `World` traits: the non-rendering half of the simulator
//! seam.

use std::sync::Arc;

use simcam_types::SimTime;

use crate::camera::RenderCamera;

/// A simulated camera sensor.
///
/// The bridge switches it on and off as subscribers come and go and reads
/// its measurement time to stamp outgoing messages.
pub trait Sensor: Send + Sync {
    /// Sensor name from the description, e.g. `"front_camera"`.
    fn name(&self) -> &str;

    /// Frame the sensor is mounted on, e.g. `"camera_link"`.
    fn parent_frame(&self) -> &str;

    /// Whether the simulator is currently rendering and updating this sensor.
    fn is_active(&self) -> bool;

    /// Enable or disable rendering for this sensor.
    fn set_active(&self, active: bool);

    /// Configured update rate in Hz (0 = as fast as possible).
    fn update_rate(&self) -> f64;

    /// Change the update rate in Hz.
    fn set_update_rate(&self, hz: f64);

    /// Simulation time of the most recent measurement.
    fn last_measurement_time(&self) -> SimTime;

    /// Rendering cameras owned by this sensor, in description order.
    fn cameras(&self) -> Vec<Arc<dyn RenderCamera>>;
}

/// The simulated world a sensor lives in.
pub trait World: Send + Sync {
    fn name(&self) -> &str;

    /// Current simulation time.
    fn sim_time(&self) -> SimTime;
}
