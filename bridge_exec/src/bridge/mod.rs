//! # Physical car bridge
//!
//! The bridge connects one physical vehicle to the lab bus:
//!
//! - high level commands received from the bus are scaled from physical units into the car's
//!   normalised range and forwarded to the [`NetworkController`],
//! - the vehicle state, estimated from the car's steering and throttle, is published on the bus
//!   at a fixed rate,
//! - camera frames and controls are forwarded to the [`Visualizer`].
//!
//! The bridge loop never stops on an error: a failed iteration is logged and retried after a
//! longer sleep.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod pose;

pub use pose::PoseEstimator;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use comms_if::{
    bus::{self, VehicleCommand, VehicleState},
    VehicleId,
};
use util::{
    maths::clamp_unit,
    session::Session,
    thread::{join_timeout, sleep_while_running},
};

use crate::bus_client::{publish, BusError, SharedBus};
use crate::net_ctrl::NetworkController;
use crate::params::{RateParams, VehicleParams};
use crate::visualizer::Visualizer;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const BRIDGE_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How long the vehicle outline stays on screen after each state publish.
const VEHICLE_DRAW_DURATION_S: f64 = 0.2;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct PhysicalCarBridge {
    vehicle_id: VehicleId,
    target: String,
    session: Session,

    controller: Arc<NetworkController>,
    bus: SharedBus,
    limits: VehicleParams,
    rates: RateParams,

    /// Last command received from the bus, in physical units
    last_command: Arc<Mutex<Option<VehicleCommand>>>,

    bg_run: Arc<AtomicBool>,
    bg_jh: Option<JoinHandle<()>>,
}

/// State owned by the bridge loop.
pub struct BridgeLoop {
    vehicle_id: VehicleId,
    target: String,
    session: Session,

    controller: Arc<NetworkController>,
    bus: SharedBus,
    visualizer: Visualizer,
    estimator: PoseEstimator,
    limits: VehicleParams,
    state_period: Duration,
    last_state: Option<Instant>,
    last_command: Arc<Mutex<Option<VehicleCommand>>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Outcome of one iteration of the bridge loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The vehicle is not reachable, nothing was done
    Disconnected,

    /// The iteration ran, `published` is true if a state was published
    Ran { published: bool },
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Could not publish the vehicle state: {0}")]
    StatePublishError(BusError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PhysicalCarBridge {
    pub fn new(
        session: &Session,
        vehicle_id: VehicleId,
        controller: Arc<NetworkController>,
        bus: SharedBus,
        limits: VehicleParams,
        rates: RateParams,
    ) -> Self {
        let target = format!("bridge_{}", vehicle_id);

        info!(
            target: &target,
            "Physical car bridge initialised for vehicle {}", vehicle_id
        );

        Self {
            vehicle_id,
            target,
            session: session.clone(),
            controller,
            bus,
            limits,
            rates,
            last_command: Arc::new(Mutex::new(None)),
            bg_run: Arc::new(AtomicBool::new(false)),
            bg_jh: None,
        }
    }

    /// Publish a state at the origin so the lab knows the vehicle exists.
    pub fn announce(&self) -> Result<(), BusError> {
        let state = VehicleState::at_origin(self.vehicle_id, self.session.time_ns());
        publish(&self.bus, &bus::state_topic(self.vehicle_id), &state)
    }

    /// Start telemetry collection and the bridge loop. Does nothing if already running.
    pub fn start(&mut self) -> bool {
        if self.bg_jh.is_some() {
            return true;
        }

        self.controller.start_telemetry_collection();

        let bridge_loop = self.make_loop();
        let run = self.bg_run.clone();
        let loop_period = self.rates.loop_period();
        let disconnected_sleep = self.rates.disconnected_sleep();
        let error_sleep = self.rates.error_sleep();

        self.bg_run.store(true, Ordering::SeqCst);
        self.bg_jh = Some(thread::spawn(move || {
            bridge_thread(
                bridge_loop,
                run,
                loop_period,
                disconnected_sleep,
                error_sleep,
            )
        }));

        info!(
            target: &self.target,
            "Physical car bridge started for vehicle {}", self.vehicle_id
        );
        true
    }

    /// Stop the bridge loop and telemetry collection. May be called any number of times.
    pub fn stop(&mut self) {
        self.bg_run.store(false, Ordering::SeqCst);

        if let Some(jh) = self.bg_jh.take() {
            if !join_timeout(jh, BRIDGE_JOIN_TIMEOUT) {
                warn!(target: &self.target, "Bridge loop did not stop in time");
            }
        }

        self.controller.stop_telemetry_collection();

        info!(
            target: &self.target,
            "Physical car bridge stopped for vehicle {}", self.vehicle_id
        );
    }

    pub fn is_running(&self) -> bool {
        self.bg_jh.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.controller.is_connected()
    }

    /// The last command received from the bus, in physical units.
    pub fn last_command(&self) -> Option<VehicleCommand> {
        *self
            .last_command
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the handler to give to the command listener.
    pub fn command_handler(&self) -> impl FnMut(VehicleCommand) + Send + 'static {
        let controller = self.controller.clone();
        let limits = self.limits;
        let last_command = self.last_command.clone();
        let target = self.target.clone();

        move |cmd| {
            let (steering, throttle) = scale_command(&cmd, &limits);
            trace!(
                target: &target,
                "Command {:?} scaled to ({:.3}, {:.3})",
                cmd,
                steering,
                throttle
            );

            if !controller.send_command(steering, throttle) {
                debug!(target: &target, "Command not delivered to the vehicle");
            }

            *last_command.lock().unwrap_or_else(PoisonError::into_inner) = Some(cmd);
        }
    }

    /// Build the state for a bridge loop.
    pub fn make_loop(&self) -> BridgeLoop {
        BridgeLoop {
            vehicle_id: self.vehicle_id,
            target: self.target.clone(),
            session: self.session.clone(),
            controller: self.controller.clone(),
            bus: self.bus.clone(),
            visualizer: Visualizer::new(
                &self.session,
                self.vehicle_id,
                self.bus.clone(),
                self.rates.vis_draw_period(),
                self.rates.vis_camera_period(),
            ),
            estimator: PoseEstimator::new(),
            limits: self.limits,
            state_period: self.rates.state_publish_period(),
            last_state: None,
            last_command: self.last_command.clone(),
        }
    }
}

impl Drop for PhysicalCarBridge {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

impl BridgeLoop {
    /// Run one iteration of the loop at time `now`.
    pub fn step(&mut self, now: Instant) -> Result<StepOutcome, BridgeError> {
        if !self.controller.is_connected() {
            return Ok(StepOutcome::Disconnected);
        }

        let (steering, throttle) = self.controller.latest_steering_throttle();
        let steering_rad = steering * self.limits.max_steering_rad();
        let speed_ms = throttle * self.limits.max_speed_ms;

        let published = match self.last_state {
            Some(t) if now.saturating_duration_since(t) < self.state_period => false,
            _ => {
                self.last_state = Some(now);
                self.publish_state(steering_rad, speed_ms, now)?;
                true
            }
        };

        if let Some(frame) = self.controller.latest_camera_frame() {
            self.visualizer.visualize_camera_image(&frame, now);
        }

        self.visualizer.visualize_steering_throttle(
            steering_rad,
            speed_ms,
            self.limits.max_steering_rad(),
            self.limits.max_speed_ms,
            now,
        );

        Ok(StepOutcome::Ran { published })
    }

    fn publish_state(
        &mut self,
        steering_rad: f64,
        speed_ms: f64,
        now: Instant,
    ) -> Result<(), BridgeError> {
        let (pose, twist) = self.estimator.update(steering_rad, speed_ms, now);

        let state = VehicleState {
            vehicle_id: self.vehicle_id,
            timestamp_ns: self.session.time_ns(),
            pose,
            twist,
        };

        trace!(
            target: &self.target,
            "State {:?}, last command {:?}",
            state,
            self.last_command
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
        );
        if let Some(raw) = self.controller.telemetry().raw_telemetry {
            debug!(target: &self.target, "Telemetry {}", raw);
        }

        publish(&self.bus, &bus::state_topic(self.vehicle_id), &state)
            .map_err(BridgeError::StatePublishError)?;

        self.visualizer
            .visualize_vehicle(&pose, VEHICLE_DRAW_DURATION_S, now);

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Scale a command from physical units into the car's normalised `(steering, throttle)`.
pub fn scale_command(cmd: &VehicleCommand, limits: &VehicleParams) -> (f64, f64) {
    let steering = clamp_unit(cmd.steering_target / limits.max_steering_rad());
    let throttle = clamp_unit(cmd.velocity_target / limits.max_speed_ms);

    (steering, throttle)
}

fn bridge_thread(
    mut bridge_loop: BridgeLoop,
    run: Arc<AtomicBool>,
    loop_period: Duration,
    disconnected_sleep: Duration,
    error_sleep: Duration,
) {
    while run.load(Ordering::SeqCst) {
        match bridge_loop.step(Instant::now()) {
            Ok(StepOutcome::Disconnected) => {
                sleep_while_running(&run, disconnected_sleep);
            }
            Ok(StepOutcome::Ran { .. }) => {
                sleep_while_running(&run, loop_period);
            }
            Err(e) => {
                error!(target: &bridge_loop.target, "Error in bridge loop: {}", e);
                sleep_while_running(&run, error_sleep);
            }
        }
    }
}
