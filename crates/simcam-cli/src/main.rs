//! `simcam` – drive a simulated camera through the topic bridge.
//!
//! * `simcam run` loads a sensor description, bridges its cameras onto an
//!   in-process bus, echoes every image and camera-info topic and prints a
//!   per-topic summary. Ctrl-C stops the simulation early.
//! * `simcam validate <file>` checks a description.
//! * `simcam config` shows (and optionally saves) the runtime configuration.

mod cli;
mod config;
mod run;
mod telemetry;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use colored::Colorize;
use simcam_hal::Description;
use simcam_types::SimcamError;
use simcam_types::encodings::pixel_layout;
use tracing::{error, info, warn};

use cli::{Cli, Commands, ConfigArgs, RunArgs, ValidateArgs};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _telemetry = telemetry::init_tracing("simcam", cli.log_format);
    info!(version = env!("CARGO_PKG_VERSION"), "simcam starting");

    let result = match &cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Validate(args) => cmd_validate(args),
        Commands::Config(args) => cmd_config(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn cmd_run(args: &RunArgs) -> Result<(), SimcamError> {
    let cfg = config::load()?;
    let settings = run::RunSettings::resolve(args, &cfg)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping simulation …".yellow().bold());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    println!(
        "  Simulating {} at {} steps/s ({})",
        settings.description_path.display().to_string().bold(),
        settings.frame_rate,
        if settings.frames == 0 {
            "until Ctrl-C".to_string()
        } else {
            format!("{} steps", settings.frames)
        }
        .dimmed()
    );

    let summary = run::run(&settings, shutdown)?;

    println!();
    println!(
        "  {} {} – {} steps, {:.3}s simulated",
        "✓".green().bold(),
        summary.sensor.bold(),
        summary.steps,
        summary.sim_time
    );
    for topic in &summary.topics {
        let messages = if topic.messages == 0 {
            topic.messages.to_string().yellow()
        } else {
            topic.messages.to_string().green()
        };
        println!(
            "    {:<40} {:>6} msgs {:>10} bytes",
            topic.topic.cyan(),
            messages,
            topic.bytes
        );
    }
    Ok(())
}

fn cmd_validate(args: &ValidateArgs) -> Result<(), SimcamError> {
    let description = Description::load(&args.file)?;

    if args.json {
        let json = serde_json::to_string_pretty(&description)
            .map_err(|e| SimcamError::Serialization(e.to_string()))?;
        println!("{json}");
        return Ok(());
    }

    println!(
        "  {} {} is valid",
        "✓".green().bold(),
        args.file.display().to_string().bold()
    );
    println!(
        "    sensor {} ({} Hz, {} camera(s))",
        description.sensor.name.bold(),
        description.sensor.update_rate,
        description.sensor.cameras.len()
    );
    for camera in &description.sensor.cameras {
        let encoding = match pixel_layout(&camera.format) {
            Some(layout) => layout.encoding.normal(),
            None => "unsupported, falls back to bgr8".yellow(),
        };
        println!(
            "    • {:<12} {}x{} {} ({})",
            camera.name,
            camera.width,
            camera.height,
            camera.format,
            encoding
        );
    }
    if description.plugin.update_rate.is_some() {
        println!(
            "    {}",
            "plugin.update_rate is deprecated; set sensor.update_rate instead".yellow()
        );
    }
    Ok(())
}

fn cmd_config(args: &ConfigArgs) -> Result<(), SimcamError> {
    let cfg = config::load()?;
    let raw = toml::to_string_pretty(&cfg)
        .map_err(|e| SimcamError::Serialization(e.to_string()))?;
    println!("{raw}");
    if args.write {
        let path = config::save(&cfg)?;
        println!(
            "  {} Config saved to {}",
            "✓".green().bold(),
            path.display().to_string().bold()
        );
    }
    Ok(())
}
