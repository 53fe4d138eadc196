//! `simcam-middleware` – the transport seam.
//!
//! An in-process stand-in for a robotics publish/subscribe stack, exposing
//! only what a sensor bridge needs: named topics, subscriber-count
//! callbacks on the publishing side, namespaced nodes, and a dedicated
//! callback executor.
//!
//! # Modules
//!
//! - [`bus`] – topic-based publish/subscribe bus built on Tokio broadcast
//!   channels, with per-publisher peer connect/disconnect callbacks.
//! - [`node`] – [`Node`]: namespace resolution on top of the bus.
//! - [`executor`] – [`CallbackQueue`]: single-threaded executor running on
//!   its own OS thread, servicing subscription callbacks.

pub mod bus;
pub mod executor;
pub mod node;

pub use bus::{MessageBus, PeerCallbacks, TopicPublisher, TopicReceiver};
pub use executor::{CallbackQueue, QueueHandle};
pub use node::Node;
