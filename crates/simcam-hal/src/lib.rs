//! `simcam-hal` – the simulator seam.
//!
//! The bridge never talks to a physics/rendering engine directly; it talks
//! to the traits in this crate. A simulator binding implements them for its
//! own sensor handles, and the [`sim`] stubs implement them in-process for
//! tests and the demo CLI.
//!
//! # Modules
//!
//! - [`camera`] – [`RenderCamera`][camera::RenderCamera]: image geometry,
//!   pixel format and field of view of one rendering camera.
//! - [`sensor`] – [`Sensor`][sensor::Sensor] (activation, update rate,
//!   measurement time) and [`World`][sensor::World] (simulation clock).
//! - [`description`] – TOML sensor description with plugin parameters.
//! - [`sim`] – in-process stub sensor, camera and world.

pub mod camera;
pub mod description;
pub mod sensor;
pub mod sim;

pub use camera::RenderCamera;
pub use description::{CameraDescription, Description, PluginParams, SensorDescription};
pub use sensor::{Sensor, World};
pub use sim::{SimCameraSensor, SimRenderCamera, SimWorld};
