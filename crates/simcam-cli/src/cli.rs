//! Command-line arguments.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Drive a simulated camera sensor through the topic bridge.
#[derive(Parser, Debug)]
#[command(name = "simcam", version, about)]
pub struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value = "compact", global = true, env = "SIMCAM_LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Simulate a sensor and echo everything it publishes
    Run(RunArgs),

    /// Parse and validate a sensor description
    Validate(ValidateArgs),

    /// Show the effective runtime configuration
    Config(ConfigArgs),
}

/// Flags override `~/.simcam/config.toml` and `SIMCAM_*` variables.
#[derive(Parser, Debug, Clone, Default)]
pub struct RunArgs {
    /// Sensor description (TOML)
    #[arg(short, long)]
    pub description: Option<PathBuf>,

    /// Simulation steps to run; 0 runs until Ctrl-C
    #[arg(long)]
    pub frames: Option<u64>,

    /// Simulation steps per simulated second
    #[arg(long)]
    pub frame_rate: Option<f64>,

    /// Per-topic bus buffer
    #[arg(long)]
    pub bus_capacity: Option<usize>,

    /// Sleep between steps so simulated time tracks wall-clock time
    #[arg(long)]
    pub real_time: bool,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Description file to check
    pub file: PathBuf,

    /// Print the parsed description as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Write the effective configuration to ~/.simcam/config.toml
    #[arg(long)]
    pub write: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_overrides() {
        let cli = Cli::try_parse_from([
            "simcam", "run", "-d", "stereo.toml", "--frames", "10", "--real-time",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.description, Some(PathBuf::from("stereo.toml")));
        assert_eq!(args.frames, Some(10));
        assert!(args.real_time);
        assert!(args.frame_rate.is_none());
    }

    #[test]
    fn parses_validate_with_json_and_global_format() {
        let cli =
            Cli::try_parse_from(["simcam", "validate", "front.toml", "--json", "--log-format", "json"])
                .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Commands::Validate(ValidateArgs { json: true, .. })));
    }

    #[test]
    fn validate_requires_a_file() {
        assert!(Cli::try_parse_from(["simcam", "validate"]).is_err());
    }
}
