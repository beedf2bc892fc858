//! # Vantage Hub Server
//!
//! Receives people-tracking events from depth sensors and rebroadcasts one
//! merged virtual world to every registered view.
//!
//! ## Usage
//!
//! ```bash
//! vantage_server --config config/vantage.example.toml --port 50505 --echo
//! RUST_LOG=debug vantage_server --duration 60
//! ```

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use vantage::HubConfig;
use vantage_networking::HubServer;

#[derive(Parser, Debug)]
#[command(name = "vantage_server", version, about = "Coordination hub for multi-sensor people tracking")]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Host or IP to bind (overrides server.bind)
    #[arg(long)]
    bind: Option<String>,

    /// UDP port (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Virtual world width (overrides world.max_x)
    #[arg(long, value_name = "UNITS")]
    world_max_x: Option<f32>,

    /// Virtual world depth (overrides world.max_y)
    #[arg(long, value_name = "UNITS")]
    world_max_y: Option<f32>,

    /// Log every inbound message
    #[arg(long)]
    echo: bool,

    /// Run for N seconds then exit
    #[arg(short, long, value_name = "SECS")]
    duration: Option<u64>,

    /// Seconds between status lines
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    stats_interval: u64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(&Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "Hub failed to start");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<HubConfig, vantage::ConfigError> {
    let mut config = match &args.config {
        Some(path) => HubConfig::load(path)?,
        None => HubConfig::default(),
    };

    if let Some(bind) = &args.bind {
        config.server.bind.clone_from(bind);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(max_x) = args.world_max_x {
        config.world.max_x = max_x;
    }
    if let Some(max_y) = args.world_max_y {
        config.world.max_y = max_y;
    }
    config.server.echo_messages |= args.echo;

    config.validate()?;
    Ok(config)
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(args)?;

    tracing::info!(
        bind = %config.server.bind,
        port = config.server.port,
        world_x = config.world.max_x,
        world_y = config.world.max_y,
        preset_calibrations = config.calibration.len(),
        "Starting hub"
    );

    let mut server = HubServer::bind(config.server_config()?, config.hub_state())?;

    let start = Instant::now();
    let limit = args.duration.map(Duration::from_secs);
    let interval = Duration::from_secs(args.stats_interval.max(1));
    let mut next_report = start + interval;

    loop {
        if limit.is_some_and(|limit| start.elapsed() >= limit) {
            break;
        }

        thread::sleep(Duration::from_millis(100));

        if Instant::now() >= next_report {
            next_report += interval;
            log_status(&server, start);
        }
    }

    server.shutdown();
    log_status(&server, start);
    Ok(())
}

fn log_status(server: &HubServer, start: Instant) {
    let hub = server.hub().stats();
    let net = server.transport_stats();

    tracing::info!(
        uptime_s = start.elapsed().as_secs(),
        users = hub.live_users,
        views = hub.subscribers,
        devices = hub.known_devices,
        calibrated = hub.calibrated_devices,
        events = hub.events_handled,
        broadcasts = hub.broadcasts,
        ignored = hub.ignored,
        uncalibrated = hub.uncalibrated_drops,
        delivered = hub.deliveries,
        failed = hub.delivery_failures,
        "Hub status"
    );
    tracing::info!(
        received = net.datagrams_received,
        sent = net.datagrams_sent,
        bytes_in = net.bytes_received,
        bytes_out = net.bytes_sent,
        decode_errors = net.decode_errors,
        queue_overflows = net.queue_overflows,
        send_errors = net.send_errors,
        recv_errors = net.recv_errors,
        "Network status"
    );
}
