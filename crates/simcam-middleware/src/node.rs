//! [`Node`] – a named, namespaced handle onto the [`MessageBus`].
//!
//! Relative topic names are resolved against the node's namespace, so a
//! camera node in `/robot/front_camera` advertising `image_raw` publishes
//! on `/robot/front_camera/image_raw`. Names starting with `/` are used
//! verbatim.

use simcam_types::SimcamError;
use tracing::info;

use crate::bus::{MessageBus, PeerCallbacks, TopicPublisher, TopicReceiver};

/// A middleware node.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    namespace: String,
    bus: MessageBus,
}

impl Node {
    /// Create a node called `name` inside `namespace`.
    ///
    /// The namespace is normalised: duplicate and trailing slashes are
    /// removed and a leading slash is added, so `""` becomes `/` and
    /// `"robot//cam/"` becomes `/robot/cam`.
    ///
    /// # Errors
    ///
    /// Returns [`SimcamError::Configuration`] when the name or a namespace
    /// segment contains characters other than ASCII alphanumerics and `_`,
    /// or starts with a digit.
    pub fn new(bus: &MessageBus, namespace: &str, name: &str) -> Result<Self, SimcamError> {
        validate_token(name)
            .map_err(|e| SimcamError::Configuration(format!("node name '{name}': {e}")))?;

        let segments: Vec<&str> = namespace.split('/').filter(|s| !s.is_empty()).collect();
        for segment in &segments {
            validate_token(segment).map_err(|e| {
                SimcamError::Configuration(format!("namespace '{namespace}': {e}"))
            })?;
        }
        let namespace = format!("/{}", segments.join("/"));

        info!(node = name, namespace = %namespace, "created node");
        Ok(Self {
            name: name.to_string(),
            namespace,
            bus: bus.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fully qualified node name, e.g. `/robot/front_camera/camera_node`.
    pub fn fully_qualified_name(&self) -> String {
        join(&self.namespace, &self.name)
    }

    /// Resolve a topic name against this node's namespace.
    pub fn resolve(&self, topic: &str) -> String {
        if topic.starts_with('/') {
            topic.to_string()
        } else {
            join(&self.namespace, topic)
        }
    }

    /// Advertise `topic` (resolved) with subscriber lifecycle callbacks.
    pub fn advertise(&self, topic: &str, callbacks: PeerCallbacks) -> TopicPublisher {
        self.bus.advertise(&self.resolve(topic), callbacks)
    }

    /// Subscribe to `topic` (resolved).
    pub fn subscribe(&self, topic: &str) -> TopicReceiver {
        self.bus.subscribe(&self.resolve(topic))
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }
}

fn join(namespace: &str, name: &str) -> String {
    if namespace == "/" {
        format!("/{name}")
    } else {
        format!("{namespace}/{name}")
    }
}

fn validate_token(token: &str) -> Result<(), String> {
    let Some(first) = token.chars().next() else {
        return Err("must not be empty".to_string());
    };
    if first.is_ascii_digit() {
        return Err(format!("'{token}' must not start with a digit"));
    }
    if let Some(bad) = token.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(format!("'{token}' contains invalid character '{bad}'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_is_normalised() {
        let bus = MessageBus::default();
        let node = Node::new(&bus, "robot//front_camera/", "camera_node").unwrap();
        assert_eq!(node.namespace(), "/robot/front_camera");
        assert_eq!(node.fully_qualified_name(), "/robot/front_camera/camera_node");
    }

    #[test]
    fn empty_namespace_is_root() {
        let bus = MessageBus::default();
        let node = Node::new(&bus, "", "cam").unwrap();
        assert_eq!(node.namespace(), "/");
        assert_eq!(node.resolve("image_raw"), "/image_raw");
    }

    #[test]
    fn relative_and_absolute_topics_resolve() {
        let bus = MessageBus::default();
        let node = Node::new(&bus, "/robot/cam", "cam").unwrap();
        assert_eq!(node.resolve("image_raw"), "/robot/cam/image_raw");
        assert_eq!(node.resolve("/clock"), "/clock");
    }

    #[test]
    fn invalid_names_are_rejected() {
        let bus = MessageBus::default();
        assert!(matches!(
            Node::new(&bus, "/robot/my-cam", "cam"),
            Err(SimcamError::Configuration(_))
        ));
        assert!(Node::new(&bus, "/robot", "9cam").is_err());
        assert!(Node::new(&bus, "/robot", "").is_err());
    }

    #[test]
    fn advertise_and_subscribe_share_resolved_topic() {
        let bus = MessageBus::default();
        let node = Node::new(&bus, "/robot/cam", "cam").unwrap();
        let publisher = node.advertise("image_raw", PeerCallbacks::default());
        let _rx = node.subscribe("image_raw");
        assert_eq!(publisher.topic(), "/robot/cam/image_raw");
        assert_eq!(bus.subscriber_count("/robot/cam/image_raw"), 1);
    }
}
