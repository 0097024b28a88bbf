//! # Network Controller
//!
//! The network controller owns the link to one physical vehicle. It selects the transport,
//! rate limits and clamps outgoing commands, and collects telemetry: HTTP telemetry is polled by a
//! background thread, MQTT telemetry is pushed by the transport's own network loop.
//!
//! Nothing in here returns an error once the controller is built. A lost link is only visible
//! through [`NetworkController::is_connected`].

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod telemetry;

pub use telemetry::{TelemetrySample, TelemetryStore};

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use comms_if::vehicle::{CamImage, DriveCommand, Protocol};
use comms_if::VehicleId;
use util::{
    maths::clamp_unit,
    session::Session,
    thread::{join_timeout, sleep_while_running},
};

use crate::transport::{self, ConnectionConfig, ConnectionState, Transport, TransportError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum time to wait for the poll thread to stop.
const POLL_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct NetworkController {
    target: String,

    transport: Arc<dyn Transport>,
    store: Arc<TelemetryStore>,

    min_command_interval: Duration,
    last_command: Mutex<Option<Instant>>,

    poll_period: Duration,
    reconnect_backoff: Duration,
    poll_run: Arc<AtomicBool>,
    poll_jh: Mutex<Option<JoinHandle<()>>>,
}

/// Timing of the HTTP poll thread.
#[derive(Debug, Copy, Clone)]
struct PollTiming {
    period: Duration,
    reconnect_backoff: Duration,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum NetCtrlError {
    #[error("Could not create the vehicle transport: {0}")]
    TransportInitError(TransportError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl NetworkController {
    /// Create the controller for a vehicle and make a first connection attempt.
    ///
    /// If MQTT is requested but unavailable the controller falls back on HTTP. A failed first
    /// connection attempt is not an error, the controller keeps trying to reconnect.
    pub fn new(
        session: &Session,
        vehicle_id: VehicleId,
        config: &ConnectionConfig,
    ) -> Result<Self, NetCtrlError> {
        let target = log_target(vehicle_id);

        let protocol = transport::select_protocol(config, &target);
        let store = Arc::new(TelemetryStore::new(protocol, &target));
        let transport = transport::build(protocol, config, &store, &target)
            .map_err(NetCtrlError::TransportInitError)?;

        let controller = Self::with_transport(session, vehicle_id, transport, store, config);

        info!(
            target: &controller.target,
            "Connecting to {} over {}",
            config.car_name,
            protocol
        );
        let state = controller.transport.connect();
        if !state.connected {
            warn!(
                target: &controller.target,
                "Vehicle {} is not reachable yet", vehicle_id
            );
        }

        Ok(controller)
    }

    /// Create the controller around an existing transport, without connecting it.
    pub fn with_transport(
        session: &Session,
        vehicle_id: VehicleId,
        transport: Arc<dyn Transport>,
        store: Arc<TelemetryStore>,
        config: &ConnectionConfig,
    ) -> Self {
        let target = log_target(vehicle_id);

        debug!(
            target: &target,
            "Network controller created {:.3} s into session {}",
            session.elapsed_seconds(),
            session.exec_name
        );

        Self {
            target,
            transport,
            store,
            min_command_interval: config.min_command_interval,
            last_command: Mutex::new(None),
            poll_period: config.poll_period,
            reconnect_backoff: config.reconnect_backoff,
            poll_run: Arc::new(AtomicBool::new(false)),
            poll_jh: Mutex::new(None),
        }
    }

    /// The protocol in use, after any fallback.
    pub fn protocol(&self) -> Protocol {
        self.transport.protocol()
    }

    /// Send a normalised command to the vehicle.
    ///
    /// Calls made within the minimum command interval of the previous accepted call are dropped
    /// and report `true` without anything being sent. Accepted commands are clamped to `[-1, 1]`
    /// and become the last known steering and throttle. Returns `false` if the transport could not
    /// deliver the command.
    pub fn send_command(&self, steering: f64, throttle: f64) -> bool {
        let now = Instant::now();
        {
            let mut last = self
                .last_command
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if let Some(t) = *last {
                if now.duration_since(t) < self.min_command_interval {
                    trace!(target: &self.target, "Command dropped by the rate limit");
                    return true;
                }
            }
            *last = Some(now);
        }

        let steering = clamp_unit(steering);
        let throttle = clamp_unit(throttle);

        self.store.record_command(steering, throttle);
        self.transport
            .send_command(&DriveCommand::user(steering, throttle))
    }

    /// Start collecting telemetry. For HTTP this starts the poll thread, MQTT telemetry is already
    /// pushed by the transport. Returns `true` once collection is running.
    pub fn start_telemetry_collection(&self) -> bool {
        if self.protocol() == Protocol::Mqtt {
            return true;
        }

        let mut poll_jh = self.poll_jh.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ref jh) = *poll_jh {
            if !jh.is_finished() {
                return true;
            }
        }

        self.poll_run.store(true, Ordering::SeqCst);

        let transport = self.transport.clone();
        let store = self.store.clone();
        let run = self.poll_run.clone();
        let target = self.target.clone();
        let timing = PollTiming {
            period: self.poll_period,
            reconnect_backoff: self.reconnect_backoff,
        };

        *poll_jh = Some(thread::spawn(move || {
            poll_thread(transport, store, run, timing, target)
        }));

        info!(target: &self.target, "Telemetry polling started");
        true
    }

    /// Stop collecting telemetry and close the MQTT session. May be called any number of times.
    pub fn stop_telemetry_collection(&self) {
        self.poll_run.store(false, Ordering::SeqCst);

        let jh = self
            .poll_jh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(jh) = jh {
            if !join_timeout(jh, POLL_JOIN_TIMEOUT) {
                warn!(target: &self.target, "Telemetry poll thread did not stop in time");
            }
            info!(target: &self.target, "Telemetry polling stopped");
        }

        if self.protocol() == Protocol::Mqtt {
            self.transport.shutdown();
        }
    }

    /// The last camera frame received, which may be arbitrarily old.
    pub fn latest_camera_frame(&self) -> Option<Arc<CamImage>> {
        self.store.camera()
    }

    /// The last known normalised `(steering, throttle)`.
    pub fn latest_steering_throttle(&self) -> (f64, f64) {
        self.store.steering_throttle()
    }

    /// Snapshot of everything known about the vehicle.
    pub fn telemetry(&self) -> TelemetrySample {
        self.store.snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }
}

impl Drop for NetworkController {
    fn drop(&mut self) {
        self.stop_telemetry_collection();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Log target of the controller of the given vehicle.
pub fn log_target(vehicle_id: VehicleId) -> String {
    format!("net_ctrl_{}", vehicle_id)
}

/// Background thread polling the vehicle's telemetry and camera.
fn poll_thread(
    transport: Arc<dyn Transport>,
    store: Arc<TelemetryStore>,
    run: Arc<AtomicBool>,
    timing: PollTiming,
    target: String,
) {
    while run.load(Ordering::SeqCst) {
        match poll_once(transport.as_ref(), &store, &target) {
            // The vehicle answers again, only a successful connect brings the link back up
            Ok(()) if !transport.is_connected() => {
                transport.connect();
            }
            Ok(()) => (),
            Err(e) => {
                warn!(target: &target, "Error fetching data from car: {}", e);
                transport.mark_disconnected();

                if !sleep_while_running(&run, timing.reconnect_backoff) {
                    break;
                }
                transport.connect();
            }
        }

        sleep_while_running(&run, timing.period);
    }
}

/// Fetch telemetry then camera once. Only errors meaning the vehicle is unreachable are returned,
/// anything else is logged and skipped.
fn poll_once(
    transport: &dyn Transport,
    store: &TelemetryStore,
    target: &str,
) -> Result<(), TransportError> {
    match transport.fetch_telemetry() {
        Ok(raw) => {
            store.apply_telemetry(Protocol::Http, raw);
        }
        Err(e) => skip_or_fail(e, target)?,
    }

    match transport.fetch_camera() {
        Ok(camera) => {
            store.apply_camera(Protocol::Http, &camera);
        }
        Err(e) => skip_or_fail(e, target)?,
    }

    Ok(())
}

fn skip_or_fail(e: TransportError, target: &str) -> Result<(), TransportError> {
    match e {
        e if e.is_link_error() => Err(e),
        TransportError::StatusError(s) => {
            debug!(target: target, "Vehicle answered {}, skipping", s);
            Ok(())
        }
        e => {
            warn!(target: target, "{}", e);
            Ok(())
        }
    }
}
