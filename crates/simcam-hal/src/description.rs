//! Sensor description – the static configuration of a simulated camera and
//! of the bridge plugin attached to it.
//!
//! Descriptions are TOML documents:
//!
//! ```toml
//! [sensor]
//! name = "stereo"
//! update_rate = 30.0
//! parent_frame = "camera_link"
//!
//! [[sensor.camera]]
//! name = "left"
//! horizontal_fov = 1.3962634
//! width = 800
//! height = 600
//! format = "R8G8B8"
//!
//! [plugin]
//! robot_namespace = "robot"
//! camera_name = "stereo"
//! frame_name = "left_camera_optical_frame"
//! hack_baseline = 0.07
//! ```
//!
//! Every `[plugin]` key is optional; see [`PluginParams`] for defaults.

use std::collections::HashSet;
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use simcam_types::SimcamError;

/// A complete description file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    pub sensor: SensorDescription,
    #[serde(default)]
    pub plugin: PluginParams,
}

/// The `[sensor]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDescription {
    pub name: String,
    /// Hz; 0 renders every simulation step.
    #[serde(default)]
    pub update_rate: f64,
    /// Render even without subscribers.
    #[serde(default)]
    pub always_on: bool,
    #[serde(default = "default_parent_frame")]
    pub parent_frame: String,
    #[serde(rename = "camera")]
    pub cameras: Vec<CameraDescription>,
}

/// One `[[sensor.camera]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDescription {
    #[serde(default = "default_camera_name")]
    pub name: String,
    /// Radians.
    pub horizontal_fov: f64,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_format")]
    pub format: String,
}

/// The `[plugin]` table: how the bridge names and calibrates the camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginParams {
    pub robot_namespace: String,
    pub camera_name: String,
    pub image_topic_name: String,
    pub camera_info_topic_name: String,
    pub frame_name: String,
    /// Deprecated override of `sensor.update_rate`.
    pub update_rate: Option<f64>,
    pub cx_prime: f64,
    pub cx: f64,
    pub cy: f64,
    pub focal_length: f64,
    pub hack_baseline: f64,
    pub distortion_k1: f64,
    pub distortion_k2: f64,
    pub distortion_k3: f64,
    pub distortion_t1: f64,
    pub distortion_t2: f64,
}

impl Default for PluginParams {
    fn default() -> Self {
        Self {
            robot_namespace: String::new(),
            camera_name: String::new(),
            image_topic_name: "image_raw".to_string(),
            camera_info_topic_name: "camera_info".to_string(),
            frame_name: "world".to_string(),
            update_rate: None,
            cx_prime: 0.0,
            cx: 0.0,
            cy: 0.0,
            focal_length: 0.0,
            hack_baseline: 0.0,
            distortion_k1: 0.0,
            distortion_k2: 0.0,
            distortion_k3: 0.0,
            distortion_t1: 0.0,
            distortion_t2: 0.0,
        }
    }
}

fn default_parent_frame() -> String {
    "camera_link".to_string()
}
fn default_camera_name() -> String {
    "camera".to_string()
}
fn default_format() -> String {
    "R8G8B8".to_string()
}

impl Description {
    /// Parse and validate a description from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`SimcamError::Configuration`] on malformed TOML or when
    /// [`validate`][Self::validate] rejects the contents.
    pub fn from_toml_str(raw: &str) -> Result<Self, SimcamError> {
        let description: Description = toml::from_str(raw)
            .map_err(|e| SimcamError::Configuration(format!("failed to parse description: {e}")))?;
        description.validate()?;
        Ok(description)
    }

    /// Read, parse and validate a description file.
    pub fn load(path: &Path) -> Result<Self, SimcamError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            SimcamError::Configuration(format!(
                "failed to read description at {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Check the invariants the bridge relies on.
    pub fn validate(&self) -> Result<(), SimcamError> {
        let sensor = &self.sensor;
        if sensor.name.trim().is_empty() {
            return Err(SimcamError::Configuration("sensor.name must not be empty".into()));
        }
        if !(sensor.update_rate.is_finite() && sensor.update_rate >= 0.0) {
            return Err(SimcamError::Configuration(format!(
                "sensor.update_rate must be >= 0, got {}",
                sensor.update_rate
            )));
        }
        if sensor.cameras.is_empty() {
            return Err(SimcamError::Configuration(format!(
                "sensor '{}' declares no [[sensor.camera]]",
                sensor.name
            )));
        }

        let mut names = HashSet::new();
        for camera in &sensor.cameras {
            if !names.insert(camera.name.as_str()) {
                return Err(SimcamError::Configuration(format!(
                    "duplicate camera name '{}'",
                    camera.name
                )));
            }
            if camera.width == 0 || camera.height == 0 {
                return Err(SimcamError::Configuration(format!(
                    "camera '{}' has an empty image ({}x{})",
                    camera.name, camera.width, camera.height
                )));
            }
            if !(camera.horizontal_fov > 0.0 && camera.horizontal_fov < PI) {
                return Err(SimcamError::Configuration(format!(
                    "camera '{}' horizontal_fov must lie in (0, pi), got {}",
                    camera.name, camera.horizontal_fov
                )));
            }
        }

        if let Some(rate) = self.plugin.update_rate
            && !(rate.is_finite() && rate >= 0.0)
        {
            return Err(SimcamError::Configuration(format!(
                "plugin.update_rate must be >= 0, got {rate}"
            )));
        }
        Ok(())
    }

    /// Whether this describes a multi-camera (e.g. stereo) sensor.
    pub fn is_multi_camera(&self) -> bool {
        self.sensor.cameras.len() > 1
    }
}
