use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use omni_race_runtime::config::RaceConfig;
use omni_race_runtime::motor::Maneuver;
use omni_race_runtime::runtime::{self, Mode};

#[derive(Parser, Debug)]
#[command(name = "omni-race", about = "Sequenced race runner for a four-wheel omni base")]
struct Cli {
    /// JSON config file; built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the base board
    #[arg(long)]
    port: Option<String>,

    /// Run against the simulated base
    #[arg(long)]
    sim: bool,

    /// With --sim: space bar is the emergency stop
    #[arg(long)]
    keyboard_estop: bool,

    /// Publish events and health over zenoh
    #[arg(long)]
    telemetry: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the configured course (default)
    Race,
    /// Hold one maneuver and report the distance covered
    Jog {
        #[arg(value_enum)]
        maneuver: Maneuver,
        #[arg(long, default_value_t = 0.3)]
        speed: f32,
        #[arg(long, default_value_t = 100)]
        ticks: u64,
    },
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match RaceConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Config error ({}): {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => RaceConfig::default(),
    };
    if let Some(port) = cli.port {
        config.hardware.port = port;
    }
    config.hardware.simulate |= cli.sim;
    config.hardware.keyboard_estop |= cli.keyboard_estop;
    config.telemetry.enabled |= cli.telemetry;

    let mode = match cli.command.unwrap_or(Command::Race) {
        Command::Race => Mode::Race,
        Command::Jog {
            maneuver,
            speed,
            ticks,
        } => Mode::Jog {
            maneuver,
            speed,
            ticks,
        },
    };
    info!("Starting {:?}", mode);

    if let Err(e) = runtime::run(config, mode).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
