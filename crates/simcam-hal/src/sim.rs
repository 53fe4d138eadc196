//! In-process stand-ins for a simulator's camera sensor and world.
//!
//! These stubs let the whole bridge run in unit tests and the demo CLI
//! without a physics or rendering engine.
//!
//! # Stub behaviour
//!
//! | Type | Behaviour |
//! |---|---|
//! | [`SimRenderCamera`] | Stores geometry/format/FOV; [`render`][SimRenderCamera::render] returns a deterministic gradient buffer. |
//! | [`SimCameraSensor`] | Stores the active flag, update rate and last measurement time; counts activation toggles. |
//! | [`SimWorld`] | A manually advanced simulation clock. |
//!
//! # Example
//!
//! ```rust
//! use simcam_hal::{Description, RenderCamera, Sensor, SimCameraSensor, SimWorld, World};
//!
//! let description = Description::from_toml_str(r#"
//!     [sensor]
//!     name = "front"
//!     update_rate = 10.0
//!     [[sensor.camera]]
//!     horizontal_fov = 1.0
//!     width = 4
//!     height = 2
//!     format = "L8"
//! "#).unwrap();
//!
//! let sensor = SimCameraSensor::from_description(&description.sensor);
//! let world = SimWorld::new("default");
//! world.advance(0.1);
//!
//! assert!(!sensor.is_active());
//! assert_eq!(sensor.cameras()[0].image_width(), 4);
//! assert!((world.sim_time().as_secs_f64() - 0.1).abs() < 1e-9);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use simcam_types::SimTime;
use simcam_types::encodings::{FALLBACK_LAYOUT, pixel_layout};
use tracing::debug;

use crate::camera::RenderCamera;
use crate::description::{CameraDescription, SensorDescription};
use crate::sensor::{Sensor, World};

// ────────────────────────────────────────────────────────────────────────────
// Stub rendering camera
// ────────────────────────────────────────────────────────────────────────────

/// A simulated rendering camera.
pub struct SimRenderCamera {
    name: String,
    width: u32,
    height: u32,
    format: String,
    hfov: Mutex<f64>,
}

impl SimRenderCamera {
    pub fn new(
        name: impl Into<String>,
        width: u32,
        height: u32,
        format: impl Into<String>,
        hfov_rad: f64,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            width,
            height,
            format: format.into(),
            hfov: Mutex::new(hfov_rad),
        })
    }

    pub fn from_description(description: &CameraDescription) -> Arc<Self> {
        Self::new(
            description.name.clone(),
            description.width,
            description.height,
            description.format.clone(),
            description.horizontal_fov,
        )
    }

    /// Render one frame: a gradient whose phase advances with `frame`.
    ///
    /// The buffer is exactly `width * height * depth` bytes.
    pub fn render(&self, frame: u64) -> Vec<u8> {
        let len = self.width as usize * self.height as usize * self.image_depth() as usize;
        (0..len)
            .map(|i| (i as u64).wrapping_add(frame) as u8)
            .collect()
    }
}

impl RenderCamera for SimRenderCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn image_width(&self) -> u32 {
        self.width
    }

    fn image_height(&self) -> u32 {
        self.height
    }

    fn image_depth(&self) -> u32 {
        pixel_layout(&self.format)
            .unwrap_or(FALLBACK_LAYOUT)
            .bytes_per_pixel
    }

    fn image_format(&self) -> String {
        self.format.clone()
    }

    fn hfov(&self) -> f64 {
        *self.hfov.lock()
    }

    fn set_hfov(&self, hfov_rad: f64) {
        debug!(camera = %self.name, hfov_rad, "hfov changed");
        *self.hfov.lock() = hfov_rad;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stub camera sensor
// ────────────────────────────────────────────────────────────────────────────

/// A simulated camera sensor owning one or more [`SimRenderCamera`]s.
pub struct SimCameraSensor {
    name: String,
    parent_frame: String,
    active: AtomicBool,
    update_rate: Mutex<f64>,
    last_measurement: Mutex<SimTime>,
    cameras: Vec<Arc<SimRenderCamera>>,
    activation_changes: AtomicUsize,
}

impl SimCameraSensor {
    pub fn new(
        name: impl Into<String>,
        parent_frame: impl Into<String>,
        update_rate: f64,
        cameras: Vec<Arc<SimRenderCamera>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            parent_frame: parent_frame.into(),
            active: AtomicBool::new(false),
            update_rate: Mutex::new(update_rate),
            last_measurement: Mutex::new(SimTime::ZERO),
            cameras,
            activation_changes: AtomicUsize::new(0),
        })
    }

    /// Build a sensor and its cameras from a description. `always_on`
    /// sensors start active.
    pub fn from_description(description: &SensorDescription) -> Arc<Self> {
        let cameras = description
            .cameras
            .iter()
            .map(SimRenderCamera::from_description)
            .collect();
        let sensor = Self::new(
            description.name.clone(),
            description.parent_frame.clone(),
            description.update_rate,
            cameras,
        );
        sensor.active.store(description.always_on, Ordering::SeqCst);
        sensor
    }

    /// Record that a measurement was taken at `time`.
    pub fn set_measurement_time(&self, time: SimTime) {
        *self.last_measurement.lock() = time;
    }

    /// The concrete cameras, for rendering.
    pub fn sim_cameras(&self) -> &[Arc<SimRenderCamera>] {
        &self.cameras
    }

    /// Number of times [`Sensor::set_active`] actually flipped the flag.
    pub fn activation_changes(&self) -> usize {
        self.activation_changes.load(Ordering::SeqCst)
    }
}

impl Sensor for SimCameraSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn parent_frame(&self) -> &str {
        &self.parent_frame
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn set_active(&self, active: bool) {
        if self.active.swap(active, Ordering::SeqCst) != active {
            self.activation_changes.fetch_add(1, Ordering::SeqCst);
            debug!(sensor = %self.name, active, "sensor activation changed");
        }
    }

    fn update_rate(&self) -> f64 {
        *self.update_rate.lock()
    }

    fn set_update_rate(&self, hz: f64) {
        *self.update_rate.lock() = hz;
    }

    fn last_measurement_time(&self) -> SimTime {
        *self.last_measurement.lock()
    }

    fn cameras(&self) -> Vec<Arc<dyn RenderCamera>> {
        self.cameras
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn RenderCamera>)
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stub world
// ────────────────────────────────────────────────────────────────────────────

/// A simulated world with a manually driven clock.
pub struct SimWorld {
    name: String,
    time: Mutex<SimTime>,
}

impl SimWorld {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            time: Mutex::new(SimTime::ZERO),
        })
    }

    pub fn set_sim_time(&self, time: SimTime) {
        *self.time.lock() = time;
    }

    /// Step the clock forward by `secs` and return the new time.
    pub fn advance(&self, secs: f64) -> SimTime {
        let mut time = self.time.lock();
        *time = SimTime::from_secs_f64(time.as_secs_f64() + secs);
        *time
    }
}

impl World for SimWorld {
    fn name(&self) -> &str {
        &self.name
    }

    fn sim_time(&self) -> SimTime {
        *self.time.lock()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
