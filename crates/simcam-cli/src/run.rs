//! `simcam run` – drive a stub sensor through the bridge and echo the bus.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use simcam_hal::{Description, Sensor, SimCameraSensor, SimWorld, World};
use simcam_middleware::{MessageBus, TopicReceiver};
use simcam_plugin::{CameraPlugin, CameraUtils, MultiCamera, SignalConnection};
use simcam_types::{EventPayload, SimcamError};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cli::RunArgs;
use crate::config::Config;

const LOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Effective settings after merging config, environment and flags.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub description_path: PathBuf,
    pub bus_capacity: usize,
    pub frame_rate: f64,
    pub frames: u64,
    pub real_time: bool,
}

impl RunSettings {
    pub fn resolve(args: &RunArgs, cfg: &Config) -> Result<Self, SimcamError> {
        let description_path = args
            .description
            .clone()
            .or_else(|| cfg.description_path.clone())
            .ok_or_else(|| {
                SimcamError::Configuration(
                    "no description given; pass --description or set description_path".into(),
                )
            })?;
        let frame_rate = args.frame_rate.unwrap_or(cfg.frame_rate);
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            return Err(SimcamError::Configuration(format!(
                "frame_rate must be > 0, got {frame_rate}"
            )));
        }
        let frames = args.frames.unwrap_or(cfg.frames);
        Ok(Self {
            description_path,
            bus_capacity: args.bus_capacity.unwrap_or(cfg.bus_capacity),
            frame_rate,
            frames,
            // Endless runs are paced, otherwise they would spin.
            real_time: args.real_time || frames == 0,
        })
    }
}

/// Messages seen on one topic.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSummary {
    pub topic: String,
    pub messages: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub sensor: String,
    pub steps: u64,
    pub sim_time: f64,
    pub topics: Vec<TopicSummary>,
}

enum Bridge {
    Single(CameraPlugin),
    Multi(MultiCamera),
}

impl Bridge {
    fn cameras(&self) -> Vec<&CameraUtils> {
        match self {
            Bridge::Single(plugin) => vec![plugin.utils()],
            Bridge::Multi(multi) => multi.cameras().iter().collect(),
        }
    }

    fn on_new_frame(&self, index: usize, image: &[u8]) {
        match self {
            Bridge::Single(plugin) => plugin.on_new_frame(image),
            Bridge::Multi(multi) => multi.on_new_frame(index, image),
        }
    }
}

/// Load the bridge and block until every camera has finished its deferred
/// load.
fn load_bridge(
    bus: &MessageBus,
    sensor: &Arc<SimCameraSensor>,
    world: &Arc<SimWorld>,
    description: &Description,
) -> Result<Bridge, SimcamError> {
    let (tx, rx) = mpsc::channel();
    let notify = move || {
        let _ = tx.send(());
    };
    let (bridge, _connections): (Bridge, Vec<SignalConnection>) = if description.is_multi_camera() {
        let (multi, handles) = MultiCamera::load_with_callback(
            bus.clone(),
            sensor.clone(),
            world.clone(),
            description,
            notify,
        )?;
        (Bridge::Multi(multi), handles)
    } else {
        let (plugin, handle) = CameraPlugin::load_with_callback(
            bus.clone(),
            sensor.clone(),
            world.clone(),
            description,
            notify,
        )?;
        (Bridge::Single(plugin), vec![handle])
    };

    rx.recv_timeout(LOAD_TIMEOUT).map_err(|_| SimcamError::SensorFault {
        sensor: sensor.name().to_string(),
        details: "camera load did not complete; see the log for the cause".into(),
    })?;
    Ok(bridge)
}

pub fn run(settings: &RunSettings, shutdown: Arc<AtomicBool>) -> Result<RunSummary, SimcamError> {
    let description = Description::load(&settings.description_path)?;
    let bus = MessageBus::new(settings.bus_capacity);
    let sensor = SimCameraSensor::from_description(&description.sensor);
    let world = SimWorld::new("default");

    let bridge = load_bridge(&bus, &sensor, &world, &description)?;

    let topics: Vec<String> = bridge
        .cameras()
        .iter()
        .flat_map(|c| [c.image_topic(), c.camera_info_topic()])
        .flatten()
        .map(str::to_string)
        .collect();
    info!(sensor = sensor.name(), topics = ?topics, "bridge ready");

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| SimcamError::Channel(format!("failed to start echo runtime: {e}")))?;
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut echoes = JoinSet::new();
    let mut counters = Vec::with_capacity(topics.len());
    for topic in &topics {
        let stats = Arc::new(EchoStats::default());
        counters.push((topic.clone(), Arc::clone(&stats)));
        let receiver = bus.subscribe(topic);
        echoes.spawn_on(echo(receiver, stats, stop_rx.clone()), runtime.handle());
    }

    let dt = 1.0 / settings.frame_rate;
    let mut steps = 0u64;
    while settings.frames == 0 || steps < settings.frames {
        if shutdown.load(Ordering::SeqCst) {
            warn!(steps, "stopping early on operator request");
            break;
        }
        let now = world.advance(dt);
        sensor.set_measurement_time(now);
        for (index, camera) in sensor.sim_cameras().iter().enumerate() {
            bridge.on_new_frame(index, &camera.render(steps));
        }
        steps += 1;
        if settings.real_time {
            std::thread::sleep(Duration::from_secs_f64(dt));
        }
    }

    let _ = stop_tx.send(true);
    runtime.block_on(async {
        while echoes.join_next().await.is_some() {}
    });
    drop(bridge);

    Ok(RunSummary {
        sensor: sensor.name().to_string(),
        steps,
        sim_time: world.sim_time().as_secs_f64(),
        topics: counters
            .into_iter()
            .map(|(topic, stats)| TopicSummary {
                topic,
                messages: stats.messages.load(Ordering::SeqCst),
                bytes: stats.bytes.load(Ordering::SeqCst),
            })
            .collect(),
    })
}

#[derive(Debug, Default)]
struct EchoStats {
    messages: AtomicU64,
    bytes: AtomicU64,
}

impl EchoStats {
    fn record(&self, topic: &str, payload: &EventPayload) {
        self.messages.fetch_add(1, Ordering::SeqCst);
        match payload {
            EventPayload::Image(image) => {
                self.bytes.fetch_add(image.data.len() as u64, Ordering::SeqCst);
                debug!(
                    topic,
                    stamp = image.header.stamp.as_secs_f64(),
                    width = image.width,
                    height = image.height,
                    encoding = %image.encoding,
                    "image"
                );
            }
            EventPayload::CameraInfo(info) => {
                debug!(
                    topic,
                    stamp = info.header.stamp.as_secs_f64(),
                    focal_length = info.focal_length_x(),
                    "camera_info"
                );
            }
            EventPayload::Float64(value) => debug!(topic, value, "float64"),
        }
    }
}

async fn echo(mut receiver: TopicReceiver, stats: Arc<EchoStats>, mut stop: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            event = receiver.recv() => match event {
                Ok(event) => stats.record(receiver.topic(), &event.payload),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = receiver.topic(), lagged_by = n, "echo subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = stop.changed() => {
                for event in receiver.drain() {
                    stats.record(receiver.topic(), &event.payload);
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEREO: &str = r#"
        [sensor]
        name = "stereo"
        update_rate = 10.0

        [[sensor.camera]]
        name = "left"
        horizontal_fov = 1.0
        width = 4
        height = 2
        format = "L8"

        [[sensor.camera]]
        name = "right"
        horizontal_fov = 1.0
        width = 4
        height = 2
        format = "L8"

        [plugin]
        robot_namespace = "robot"
        camera_name = "stereo"
        hack_baseline = 0.07
    "#;

    fn settings(path: PathBuf, frames: u64) -> RunSettings {
        RunSettings {
            description_path: path,
            bus_capacity: 64,
            frame_rate: 30.0,
            frames,
            real_time: false,
        }
    }

    #[test]
    fn flags_override_config() {
        let cfg = Config {
            description_path: Some(PathBuf::from("cfg.toml")),
            frames: 3,
            ..Config::default()
        };
        let args = RunArgs {
            frames: Some(7),
            ..RunArgs::default()
        };
        let s = RunSettings::resolve(&args, &cfg).unwrap();
        assert_eq!(s.description_path, PathBuf::from("cfg.toml"));
        assert_eq!(s.frames, 7);
        assert!(!s.real_time);
    }

    #[test]
    fn endless_runs_are_paced_and_description_is_required() {
        let cfg = Config {
            description_path: Some(PathBuf::from("cfg.toml")),
            frames: 0,
            ..Config::default()
        };
        assert!(RunSettings::resolve(&RunArgs::default(), &cfg).unwrap().real_time);
        assert!(matches!(
            RunSettings::resolve(&RunArgs::default(), &Config::default()),
            Err(SimcamError::Configuration(_))
        ));

        let bad_rate = RunArgs {
            frame_rate: Some(0.0),
            ..RunArgs::default()
        };
        assert!(RunSettings::resolve(&bad_rate, &cfg).is_err());
    }

    #[test]
    fn stereo_run_publishes_at_sensor_rate() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("stereo.toml");
        std::fs::write(&path, STEREO).unwrap();

        // One simulated second at 30 steps/s with a 10 Hz sensor.
        let summary = run(&settings(path, 30), Arc::new(AtomicBool::new(false))).unwrap();
        assert_eq!(summary.sensor, "stereo");
        assert_eq!(summary.steps, 30);
        assert!((summary.sim_time - 1.0).abs() < 1e-6);
        assert_eq!(summary.topics.len(), 4);

        for topic in &summary.topics {
            assert!(
                (9..=11).contains(&topic.messages),
                "{} saw {} messages",
                topic.topic,
                topic.messages
            );
            if topic.topic.ends_with("image_raw") {
                assert_eq!(topic.bytes, topic.messages * 8);
            }
        }
    }

    #[test]
    fn shutdown_flag_stops_before_first_step() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("stereo.toml");
        std::fs::write(&path, STEREO).unwrap();

        let summary = run(&settings(path, 30), Arc::new(AtomicBool::new(true))).unwrap();
        assert_eq!(summary.steps, 0);
        assert!(summary.topics.iter().all(|t| t.messages == 0));
    }

    #[test]
    fn missing_description_fails() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = run(&settings(dir.path().join("absent.toml"), 1), Arc::new(AtomicBool::new(false)))
            .unwrap_err();
        assert!(matches!(err, SimcamError::Configuration(_)));
    }
}
