//! [`CameraUtils`] – the per-camera bridge between a simulated sensor and
//! the topic bus.
//!
//! # Lifecycle
//!
//! 1. [`CameraUtils::load`] binds the sensor, world and description and
//!    returns immediately.
//! 2. A named load thread creates the [`Node`], advertises the image and
//!    camera-info topics, starts the camera queue thread servicing
//!    `set_hfov` / `set_update_rate`, runs initialisation and then fires
//!    the load signal ([`CameraUtils::on_load`]).
//! 3. The simulator calls [`put_camera_data`][CameraUtils::put_camera_data]
//!    and [`publish_camera_info`][CameraUtils::publish_camera_info] on every
//!    frame; both are throttled to the update rate and skipped while nobody
//!    listens.
//!
//! # Threads
//!
//! | Thread | Work |
//! |---|---|
//! | simulator update | `put_camera_data`, `publish_camera_info` |
//! | `simcam-load` | node creation and init, runs once |
//! | camera queue | `set_hfov` / `set_update_rate` handlers until drop |

use std::sync::{Arc, OnceLock, Weak};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use simcam_hal::{Description, PluginParams, RenderCamera, Sensor, World};
use simcam_middleware::{CallbackQueue, MessageBus, Node, PeerCallbacks, QueueHandle, TopicPublisher};
use simcam_types::encodings::{FALLBACK_LAYOUT, PixelLayout, pixel_layout};
use simcam_types::{CameraInfo, Event, EventPayload, Header, Image, SimTime, SimcamError};
use tracing::{debug, error, info, warn};

use crate::calibration::CameraCalibration;
use crate::connection::{ConnectionTracker, SubscriberCount};
use crate::signal::{LoadSignal, SignalConnection};

/// Topic carrying field-of-view changes in radians.
pub const SET_HFOV_TOPIC: &str = "set_hfov";
/// Topic carrying update-rate changes in Hz.
pub const SET_UPDATE_RATE_TOPIC: &str = "set_update_rate";

/// Slack when comparing elapsed simulation time with the update period;
/// the clock resolution is one nanosecond.
const PERIOD_EPSILON: f64 = 1e-9;

/// Everything fixed by `load`.
struct Binding {
    sensor: Arc<dyn Sensor>,
    world: Arc<dyn World>,
    camera: Arc<dyn RenderCamera>,
    params: PluginParams,
    camera_name: String,
    baseline: Option<f64>,
}

/// Created by the load thread.
struct Transport {
    node: Node,
    image: TopicPublisher,
    info: TopicPublisher,
}

/// Mutable numeric configuration, present once initialised.
struct State {
    width: u32,
    height: u32,
    layout: PixelLayout,
    update_rate: f64,
    update_period: f64,
    last_update_time: Option<SimTime>,
    last_info_update_time: Option<SimTime>,
    calibration: CameraCalibration,
}

impl State {
    /// Whether a period has passed since `last`. A clock that went backwards
    /// (world reset) forgets `last`.
    fn due(last: &mut Option<SimTime>, now: SimTime, period: f64) -> bool {
        match *last {
            Some(prev) if now < prev => {
                warn!(
                    last = prev.as_secs_f64(),
                    now = now.as_secs_f64(),
                    "simulation time went backwards, resetting throttle"
                );
                *last = None;
                true
            }
            Some(prev) => now - prev + PERIOD_EPSILON >= period,
            None => true,
        }
    }
}

struct Inner {
    bus: MessageBus,
    connections: Arc<ConnectionTracker>,
    info_connections: Arc<SubscriberCount>,
    load_signal: LoadSignal,
    binding: OnceLock<Binding>,
    transport: OnceLock<Transport>,
    state: Mutex<Option<State>>,
    queue: Mutex<Option<QueueHandle>>,
}

/// Bridges one rendering camera of a sensor onto the bus.
///
/// Dropping a `CameraUtils` waits for the load thread, then stops and joins
/// the camera queue thread.
pub struct CameraUtils {
    inner: Arc<Inner>,
    load_thread: Mutex<Option<JoinHandle<()>>>,
}

impl CameraUtils {
    /// A utility with its own connection tracker.
    pub fn new(bus: MessageBus) -> Self {
        Self::with_connections(bus, Arc::new(ConnectionTracker::new()))
    }

    /// A utility sharing image `connections` with other cameras of the
    /// same sensor. Its camera-info subscribers are still counted on their
    /// own.
    pub fn with_connections(bus: MessageBus, connections: Arc<ConnectionTracker>) -> Self {
        Self {
            inner: Arc::new(Inner {
                bus,
                connections,
                info_connections: Arc::new(SubscriberCount::new()),
                load_signal: LoadSignal::new(),
                binding: OnceLock::new(),
                transport: OnceLock::new(),
                state: Mutex::new(None),
                queue: Mutex::new(None),
            }),
            load_thread: Mutex::new(None),
        }
    }

    /// Bind the sensor's first camera and start the load thread.
    ///
    /// `suffix` is appended to the configured camera name.
    ///
    /// # Errors
    ///
    /// [`SimcamError::Configuration`] if this utility was already loaded or
    /// the sensor has no camera; [`SimcamError::Channel`] if the load thread
    /// cannot be spawned.
    pub fn load(
        &self,
        sensor: Arc<dyn Sensor>,
        world: Arc<dyn World>,
        description: &Description,
        suffix: &str,
    ) -> Result<(), SimcamError> {
        self.load_camera(sensor, world, description, suffix, 0, None)
    }

    /// Like [`load`][Self::load], overriding the description's
    /// `hack_baseline`.
    pub fn load_with_baseline(
        &self,
        sensor: Arc<dyn Sensor>,
        world: Arc<dyn World>,
        description: &Description,
        suffix: &str,
        baseline: f64,
    ) -> Result<(), SimcamError> {
        self.load_camera(sensor, world, description, suffix, 0, Some(baseline))
    }

    pub(crate) fn load_camera(
        &self,
        sensor: Arc<dyn Sensor>,
        world: Arc<dyn World>,
        description: &Description,
        suffix: &str,
        camera_index: usize,
        baseline: Option<f64>,
    ) -> Result<(), SimcamError> {
        let camera = sensor.cameras().get(camera_index).cloned().ok_or_else(|| {
            SimcamError::Configuration(format!(
                "sensor '{}' has no camera at index {camera_index}",
                sensor.name()
            ))
        })?;
        let camera_name = format!("{}{suffix}", description.plugin.camera_name);
        let binding = Binding {
            sensor,
            world,
            camera,
            params: description.plugin.clone(),
            camera_name: camera_name.clone(),
            baseline,
        };
        if self.inner.binding.set(binding).is_err() {
            return Err(SimcamError::Configuration(format!(
                "camera '{camera_name}' is already loaded"
            )));
        }

        let inner = Arc::clone(&self.inner);
        let thread = std::thread::Builder::new()
            .name("simcam-load".to_string())
            .spawn(move || inner.run_load())
            .map_err(|e| SimcamError::Channel(format!("failed to spawn load thread: {e}")))?;
        *self.load_thread.lock() = Some(thread);
        debug!(camera = %camera_name, "deferred load started");
        Ok(())
    }

    /// Call `callback` once loading completes.
    ///
    /// The callback runs on the load thread. Register it before calling
    /// [`load`][Self::load]; a completed load is not replayed.
    #[must_use = "dropping the connection unregisters the callback"]
    pub fn on_load(&self, callback: impl Fn() + Send + Sync + 'static) -> SignalConnection {
        self.inner.load_signal.connect(callback)
    }

    /// Publish one frame copied from `src` if someone is listening and an
    /// update period has passed.
    pub fn put_camera_data(&self, src: &[u8], sensor_update_time: SimTime) {
        self.inner.put_camera_data(src, sensor_update_time);
    }

    /// Publish the calibration if someone is listening and an update period
    /// has passed.
    pub fn publish_camera_info(&self, sensor_update_time: SimTime) {
        self.inner.publish_camera_info(sensor_update_time);
    }

    /// Change the field of view, as the `set_hfov` topic does.
    pub fn set_hfov(&self, hfov_rad: f64) {
        self.inner.set_hfov(hfov_rad);
    }

    /// Change the update rate, as the `set_update_rate` topic does.
    pub fn set_update_rate(&self, hz: f64) {
        self.inner.set_update_rate(hz);
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().is_some()
    }

    /// Configured update rate in Hz; `None` before initialisation.
    pub fn update_rate(&self) -> Option<f64> {
        self.inner.state.lock().as_ref().map(|s| s.update_rate)
    }

    /// Seconds between publishes; 0 publishes every frame.
    pub fn update_period(&self) -> Option<f64> {
        self.inner.state.lock().as_ref().map(|s| s.update_period)
    }

    /// Snapshot of the calibration message that would be published now.
    pub fn camera_info(&self) -> Option<CameraInfo> {
        let frame_name = self.inner.binding.get()?.params.frame_name.clone();
        let state = self.inner.state.lock();
        let state = state.as_ref()?;
        Some(state.calibration.camera_info(&frame_name, state.width, state.height))
    }

    /// Camera name including the load suffix.
    pub fn camera_name(&self) -> Option<&str> {
        self.inner.binding.get().map(|b| b.camera_name.as_str())
    }

    /// Resolved image topic, once the load thread has advertised it.
    pub fn image_topic(&self) -> Option<&str> {
        self.inner.transport.get().map(|t| t.image.topic())
    }

    /// Resolved camera-info topic, once the load thread has advertised it.
    pub fn camera_info_topic(&self) -> Option<&str> {
        self.inner.transport.get().map(|t| t.info.topic())
    }

    /// Fully qualified name of the node, once created.
    pub fn node_name(&self) -> Option<String> {
        self.inner.transport.get().map(|t| t.node.fully_qualified_name())
    }

    /// Resolve `topic` against this camera's node namespace.
    pub fn resolve_topic(&self, topic: &str) -> Option<String> {
        self.inner.transport.get().map(|t| t.node.resolve(topic))
    }

    pub fn connections(&self) -> &Arc<ConnectionTracker> {
        &self.inner.connections
    }

    /// Subscribers on this camera's camera-info topic.
    pub fn info_connections(&self) -> usize {
        self.inner.info_connections.get()
    }
}

impl Drop for CameraUtils {
    fn drop(&mut self) {
        if let Some(thread) = self.load_thread.lock().take()
            && thread.join().is_err()
        {
            error!("camera load thread panicked");
        }
        // Queue handlers hold only weak references, so stopping the queue
        // here guarantees the last strong reference is released on this
        // thread.
        let queue = self.inner.queue.lock().take();
        if let Some(queue) = queue {
            queue.shutdown();
        }
    }
}

impl Inner {
    fn run_load(self: Arc<Self>) {
        let Some(binding) = self.binding.get() else {
            error!("load thread started without a bound sensor");
            return;
        };
        match self.connect(binding) {
            Ok(()) => {
                self.init(binding);
                info!(
                    camera = %binding.camera_name,
                    sensor = binding.sensor.name(),
                    "camera loaded"
                );
                self.load_signal.fire();
            }
            Err(e) => error!(camera = %binding.camera_name, error = %e, "camera load failed"),
        }
    }

    /// Create the node, advertise topics and start the camera queue.
    fn connect(self: &Arc<Self>, binding: &Binding) -> Result<(), SimcamError> {
        let namespace = format!("{}/{}", binding.params.robot_namespace, binding.camera_name);
        let node = Node::new(&self.bus, &namespace, binding.sensor.name())?;

        let image_callbacks = {
            let (tracker, sensor) = (Arc::clone(&self.connections), Arc::clone(&binding.sensor));
            let (tracker2, sensor2) = (Arc::clone(&self.connections), Arc::clone(&binding.sensor));
            PeerCallbacks::new(
                move || tracker.image_connect(sensor.as_ref()),
                move || tracker2.image_disconnect(sensor2.as_ref()),
            )
        };
        let info_callbacks = {
            let count = Arc::clone(&self.info_connections);
            let count2 = Arc::clone(&self.info_connections);
            PeerCallbacks::new(move || count.connect(), move || count2.disconnect())
        };
        let image = node.advertise(&binding.params.image_topic_name, image_callbacks);
        let info = node.advertise(&binding.params.camera_info_topic_name, info_callbacks);

        let hfov_target = Arc::downgrade(self);
        let rate_target = Arc::downgrade(self);
        let queue = CallbackQueue::new(format!("{}-queue", binding.sensor.name()))
            .with_subscription(node.subscribe(SET_HFOV_TOPIC), move |event| {
                with_float(&hfov_target, event, Inner::set_hfov)
            })
            .with_subscription(node.subscribe(SET_UPDATE_RATE_TOPIC), move |event| {
                with_float(&rate_target, event, Inner::set_update_rate)
            })
            .spawn()?;

        debug!(
            node = %node.fully_qualified_name(),
            image_topic = image.topic(),
            info_topic = info.topic(),
            "camera topics advertised"
        );
        *self.queue.lock() = Some(queue);
        if self.transport.set(Transport { node, image, info }).is_err() {
            return Err(SimcamError::Configuration(format!(
                "camera '{}' transport created twice",
                binding.camera_name
            )));
        }
        Ok(())
    }

    fn init(&self, binding: &Binding) {
        let camera = &binding.camera;
        let update_rate = match binding.params.update_rate {
            Some(rate) => {
                warn!(
                    camera = %binding.camera_name,
                    rate,
                    "plugin.update_rate is deprecated, set sensor.update_rate instead"
                );
                binding.sensor.set_update_rate(rate);
                rate
            }
            None => binding.sensor.update_rate(),
        };

        let format = camera.image_format();
        let layout = pixel_layout(&format).unwrap_or_else(|| {
            error!(
                camera = %binding.camera_name,
                format = %format,
                fallback = FALLBACK_LAYOUT.encoding,
                "unsupported pixel format"
            );
            FALLBACK_LAYOUT
        });

        let (width, height) = (camera.image_width(), camera.image_height());
        let mut calibration = CameraCalibration::from_params(&binding.params, binding.baseline);
        calibration.resolve(&binding.camera_name, width, height, camera.hfov());

        *self.state.lock() = Some(State {
            width,
            height,
            layout,
            update_rate,
            update_period: period_for(update_rate),
            last_update_time: None,
            last_info_update_time: None,
            calibration,
        });
    }

    fn put_camera_data(&self, src: &[u8], sensor_update_time: SimTime) {
        let (Some(binding), Some(transport)) = (self.binding.get(), self.transport.get()) else {
            return;
        };
        if self.connections.image_connections() == 0 {
            return;
        }
        let now = binding.world.sim_time();

        let image = {
            let mut state = self.state.lock();
            let Some(state) = state.as_mut() else {
                return;
            };
            if state.width == 0 || state.height == 0 {
                return;
            }
            let period = state.update_period;
            if !State::due(&mut state.last_update_time, now, period) {
                return;
            }
            let mut image = Image {
                header: Header {
                    stamp: sensor_update_time,
                    frame_id: binding.params.frame_name.clone(),
                },
                ..Image::default()
            };
            let step = state.layout.bytes_per_pixel * state.width;
            if let Err(e) = image.fill(state.layout.encoding, state.height, state.width, step, src) {
                warn!(camera = %binding.camera_name, error = %e, "dropping frame");
                return;
            }
            state.last_update_time = Some(now);
            image
        };

        let event = Event::new(transport.node.fully_qualified_name(), EventPayload::Image(image));
        if let Err(e) = transport.image.publish(event) {
            debug!(topic = transport.image.topic(), error = %e, "image not delivered");
        }
    }

    fn publish_camera_info(&self, sensor_update_time: SimTime) {
        let (Some(binding), Some(transport)) = (self.binding.get(), self.transport.get()) else {
            return;
        };
        if self.info_connections.get() == 0 {
            return;
        }
        let now = binding.world.sim_time();

        let mut camera_info = {
            let mut state = self.state.lock();
            let Some(state) = state.as_mut() else {
                return;
            };
            let period = state.update_period;
            if !State::due(&mut state.last_info_update_time, now, period) {
                return;
            }
            state.last_info_update_time = Some(now);
            state
                .calibration
                .camera_info(&binding.params.frame_name, state.width, state.height)
        };
        camera_info.header.stamp = sensor_update_time;

        let event = Event::new(
            transport.node.fully_qualified_name(),
            EventPayload::CameraInfo(camera_info),
        );
        if let Err(e) = transport.info.publish(event) {
            debug!(topic = transport.info.topic(), error = %e, "camera info not delivered");
        }
    }

    fn set_hfov(&self, hfov_rad: f64) {
        let Some(binding) = self.binding.get() else {
            return;
        };
        binding.camera.set_hfov(hfov_rad);
        let mut state = self.state.lock();
        if let Some(state) = state.as_mut()
            && state.calibration.update_hfov(state.width, hfov_rad)
        {
            debug!(
                camera = %binding.camera_name,
                focal_length = state.calibration.focal_length,
                "focal length recomputed"
            );
        }
        info!(camera = %binding.camera_name, hfov_rad, "hfov updated");
    }

    fn set_update_rate(&self, hz: f64) {
        let Some(binding) = self.binding.get() else {
            return;
        };
        binding.sensor.set_update_rate(hz);
        if let Some(state) = self.state.lock().as_mut() {
            state.update_rate = hz;
            state.update_period = period_for(hz);
        }
        info!(camera = %binding.camera_name, hz, "update rate changed");
    }
}

fn period_for(rate: f64) -> f64 {
    if rate > 0.0 { 1.0 / rate } else { 0.0 }
}

fn with_float(target: &Weak<Inner>, event: Event, apply: fn(&Inner, f64)) {
    let EventPayload::Float64(value) = event.payload else {
        warn!(source = %event.source, "ignoring non-float reconfiguration message");
        return;
    };
    if let Some(inner) = target.upgrade() {
        apply(&inner, value);
    }
}
