//! Bridge executable entry point.
//!
//! # Architecture
//!
//! One bridge executable serves one physical vehicle:
//!
//!     - Resolve the vehicle connection from the command line and parameter file
//!     - Bind the bus publisher and announce the vehicle
//!     - Connect to the vehicle over HTTP or MQTT
//!     - Run the bridge loop and the command listener in the background
//!     - Print a connection marker every second until Ctrl-C

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use structopt::StructOpt;

// Internal
use bridge_lib::{
    bridge::PhysicalCarBridge,
    bus_client::{CommandListener, SharedBus, ZmqBus},
    cli::{resolve_connection, Cli},
    net_ctrl::NetworkController,
    params::BridgeExecParams,
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
    thread::sleep_while_running,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default parameter file, relative to the params directory.
const PARAMS_FILE: &str = "bridge_exec.toml";

/// Period of the console connection markers.
const STATUS_PERIOD: Duration = Duration::from_secs(1);

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let cli = Cli::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("bridge_exec", "sessions")
        .wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Donkeycar Bridge Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: BridgeExecParams = match cli.params {
        Some(ref path) => util::params::load(path)
            .wrap_err_with(|| format!("Could not load bridge params from {}", path))?,
        None => util::params::load_or_default(PARAMS_FILE),
    };

    let config = resolve_connection(&cli, &params);

    info!("Exec parameters loaded");

    // ---- INITIALISE BUS ----

    info!("Initialising bus");

    let zmq_ctx = comms_if::net::zmq::Context::new();

    let bus: SharedBus = Arc::new(Mutex::new(Box::new(
        ZmqBus::new(&zmq_ctx, &params.bus.pub_endpoint)
            .wrap_err("Failed to initialise the bus publisher")?,
    )));

    // ---- INITIALISE VEHICLE ----

    info!(
        "Connecting vehicle {} ({}) at {}:{} over {}",
        cli.vehicle_id, config.car_name, config.car_ip, config.car_port, config.protocol
    );

    let controller = Arc::new(
        NetworkController::new(&session, cli.vehicle_id, &config)
            .wrap_err("Failed to initialise the network controller")?,
    );

    let mut bridge = PhysicalCarBridge::new(
        &session,
        cli.vehicle_id,
        controller,
        bus,
        params.vehicle,
        params.rates,
    );

    if let Err(e) = bridge.announce() {
        warn!("Could not announce vehicle {}: {}", cli.vehicle_id, e);
    }

    let mut listener = CommandListener::start(
        &zmq_ctx,
        &params.bus.cmd_endpoint,
        cli.vehicle_id,
        bridge.command_handler(),
    )
    .wrap_err("Failed to start the command listener")?;

    bridge.start();

    // ---- MAIN LOOP ----

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || running_clone.store(false, Ordering::SeqCst))
        .wrap_err("Failed to set the Ctrl-C handler")?;

    info!("Bridge running, press Ctrl-C to stop\n");

    while running.load(Ordering::SeqCst) {
        print!("{}", if bridge.is_connected() { "." } else { "x" });
        std::io::stdout().flush().ok();

        sleep_while_running(&running, STATUS_PERIOD);
    }

    // ---- SHUTDOWN ----

    println!();
    info!("Shutting down");

    listener.stop();
    bridge.stop();

    info!("End of execution");

    Ok(())
}
