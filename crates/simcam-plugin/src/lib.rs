//! `simcam-plugin` – bridges simulated camera frames onto the topic bus.
//!
//! # Modules
//!
//! - [`utils`] – [`CameraUtils`]: deferred load, topic advertising,
//!   throttled image and camera-info publishing, reconfiguration via
//!   `set_hfov` / `set_update_rate`.
//! - [`connection`] – [`ConnectionTracker`], [`SubscriberCount`]: subscriber counting and
//!   sensor activation.
//! - [`calibration`] – [`CameraCalibration`]: pinhole intrinsics and
//!   `plumb_bob` distortion for `CameraInfo`.
//! - [`signal`] – [`LoadSignal`]: load-completion callbacks.
//! - [`camera_plugin`] / [`multi_camera`] – frame hooks for single- and
//!   multi-camera sensors.

pub mod calibration;
pub mod camera_plugin;
pub mod connection;
pub mod multi_camera;
pub mod signal;
pub mod utils;

pub use calibration::{CameraCalibration, Distortion, focal_length_from_hfov};
pub use camera_plugin::CameraPlugin;
pub use connection::{ConnectionTracker, SubscriberCount};
pub use multi_camera::MultiCamera;
pub use signal::{LoadSignal, SignalConnection};
pub use utils::{CameraUtils, SET_HFOV_TOPIC, SET_UPDATE_RATE_TOPIC};
