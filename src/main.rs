use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, info, warn};

use rowrelay::{
    fatal, logging, Cli, Relay, Result, Settings, SimulatedRower, WebSocketTransport,
    TRACKED_DATAPOINTS,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(settings.log_level) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }
    debug!("Resolved settings: {settings:?}");

    tokio::select! {
        result = run(settings) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                fatal!("{e}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            ExitCode::SUCCESS
        }
    }
}

async fn run(settings: Settings) -> Result<()> {
    info!("Using {} as rower name.", settings.name);
    info!("Attempting to connect to {}", settings.socket_server_url);
    if settings.simulation_mode {
        info!("This machine is running in simulation mode.");
    } else {
        warn!("No rower hardware binding is available; strokes only flow in simulation mode.");
    }

    let (transport, events) = WebSocketTransport::connect(&settings.socket_server_url)?;
    let rower = SimulatedRower::new(&TRACKED_DATAPOINTS);

    Relay::new(settings, rower, transport).run(events).await
}
