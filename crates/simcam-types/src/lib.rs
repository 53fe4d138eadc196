//! `simcam-types` – shared vocabulary for the simcam workspace.
//!
//! Holds the message envelope routed over the in-process bus, the
//! middleware-native sensor messages, simulation time, and the workspace
//! error type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod encodings;
pub mod sensor_msgs;
pub mod time;

pub use sensor_msgs::{CameraInfo, Header, Image};
pub use time::SimTime;

/// Unified message envelope for the topic bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Publishing node, e.g. `"/robot/front_camera"`.
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped with the wall-clock time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// `sensor_msgs/msg/Image`
    Image(Image),
    /// `sensor_msgs/msg/CameraInfo`
    CameraInfo(CameraInfo),
    /// `std_msgs/msg/Float64`, used by the reconfiguration topics.
    Float64(f64),
}

/// Global error type for the simcam workspace.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimcamError {
    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Middleware Channel Error: {0}")]
    Channel(String),

    #[error("Sensor Fault on {sensor}: {details}")]
    SensorFault { sensor: String, details: String },

    #[error("Invalid Frame: {0}")]
    InvalidFrame(String),

    #[error("Middleware Serialization Error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_new_stamps_fresh_ids() {
        let a = Event::new("/cam", EventPayload::Float64(1.0));
        let b = Event::new("/cam", EventPayload::Float64(1.0));
        assert_ne!(a.id, b.id);
        assert_eq!(a.source, "/cam");
    }

    #[test]
    fn event_with_image_payload_is_json_serialisable() {
        let mut image = Image::default();
        image
            .fill(encodings::MONO8, 1, 2, 2, &[7, 9])
            .expect("fill must succeed");
        let event = Event::new("/robot/cam", EventPayload::Image(image));
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        match back.payload {
            EventPayload::Image(img) => assert_eq!(img.data, vec![7, 9]),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn simcam_error_display() {
        let err = SimcamError::SensorFault {
            sensor: "front_camera".to_string(),
            details: "render target lost".to_string(),
        };
        assert!(err.to_string().contains("front_camera"));

        let err = SimcamError::Configuration("missing <camera>".to_string());
        assert!(err.to_string().starts_with("Configuration Error"));
    }
}
