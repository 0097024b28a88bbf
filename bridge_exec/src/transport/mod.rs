//! # Vehicle transports
//!
//! A [`Transport`] carries drive commands to the vehicle and telemetry back from it. Two
//! implementations exist, [`HttpTransport`] (request/response, telemetry is polled) and
//! `MqttTransport` (publish/subscribe, telemetry is pushed into the [`TelemetryStore`]). The
//! transport is chosen once when the network controller is built and never changes afterwards.
//!
//! Transport failures never propagate as errors out of the trait's command path: they are logged,
//! mark the link as down, and are reported as `false`.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod http;

#[cfg(feature = "mqtt")]
mod mqtt;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::error;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use comms_if::vehicle::{CameraPayload, DriveCommand, Protocol};
use comms_if::VehicleId;

use crate::net_ctrl::TelemetryStore;

pub use http::HttpTransport;
#[cfg(feature = "mqtt")]
pub use mqtt::MqttTransport;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A connection to one vehicle.
pub trait Transport: Send + Sync {
    /// The protocol this transport speaks.
    fn protocol(&self) -> Protocol;

    /// Attempt to (re)connect to the vehicle, returning the resulting state.
    ///
    /// Never fails, an unsuccessful attempt leaves the link marked as disconnected.
    fn connect(&self) -> ConnectionState;

    /// The current state of the link.
    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Mark the link as lost, a later `connect` is required to bring it back.
    fn mark_disconnected(&self);

    /// Send a drive command to the vehicle, returning `true` if the vehicle accepted it.
    fn send_command(&self, cmd: &DriveCommand) -> bool;

    /// Fetch the latest telemetry from the vehicle, for transports which must poll.
    fn fetch_telemetry(&self) -> Result<Value, TransportError> {
        Err(TransportError::Unsupported(self.protocol()))
    }

    /// Fetch the latest camera frame from the vehicle, for transports which must poll.
    fn fetch_camera(&self) -> Result<CameraPayload, TransportError> {
        Err(TransportError::Unsupported(self.protocol()))
    }

    /// Close the link and stop any background activity.
    fn shutdown(&self) {}
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// How to reach one vehicle. Resolved once at startup and never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// The requested protocol, which may fall back on HTTP if MQTT is unavailable
    pub protocol: Protocol,

    /// Name of the car, used in the MQTT topics
    pub car_name: String,

    pub car_ip: String,
    pub car_port: u16,

    /// MQTT broker host, empty if no broker is available
    pub mqtt_broker: String,
    pub mqtt_port: u16,
    pub topic_prefix: String,

    /// Timeout of the HTTP health check
    pub health_timeout: Duration,

    /// Timeout of every other HTTP request
    pub request_timeout: Duration,

    /// How long `connect` waits for the MQTT broker to acknowledge the connection
    pub mqtt_connect_timeout: Duration,

    /// Minimum time between two commands sent to the vehicle
    pub min_command_interval: Duration,

    /// Period of the HTTP telemetry poll
    pub poll_period: Duration,

    /// Sleep before reconnecting after a lost link
    pub reconnect_backoff: Duration,
}

/// Snapshot of the state of a link.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub connected: bool,

    /// Time of the last connection attempt, `None` if there never was one
    pub last_attempt: Option<Instant>,
}

/// Connection flag and attempt time shared between a transport and its background threads.
#[derive(Debug, Default)]
pub struct Link {
    connected: AtomicBool,
    last_attempt: Mutex<Option<Instant>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Could not build the HTTP client: {0}")]
    ClientBuildError(reqwest::Error),

    #[error("Request to the vehicle failed: {0}")]
    RequestError(reqwest::Error),

    #[error("The vehicle answered with status {0}")]
    StatusError(reqwest::StatusCode),

    #[error("Could not decode the vehicle's response: {0}")]
    DecodeError(serde_json::Error),

    #[error("Could not serialise the command: {0}")]
    SerialiseError(serde_json::Error),

    #[error("The vehicle is not connected")]
    NotConnected,

    #[error("The {0} transport does not support polling")]
    Unsupported(Protocol),

    #[cfg(feature = "mqtt")]
    #[error("MQTT client error: {0}")]
    MqttError(rumqttc::ClientError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ConnectionConfig {
    /// Default configuration for the given vehicle, using the `car<id>` naming convention.
    pub fn for_vehicle(vehicle_id: VehicleId) -> Self {
        Self {
            protocol: Protocol::Http,
            car_name: format!("car{}", vehicle_id),
            car_ip: "localhost".into(),
            car_port: 8887,
            mqtt_broker: "localhost".into(),
            mqtt_port: 1883,
            topic_prefix: "donkeycar/".into(),
            health_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(1),
            mqtt_connect_timeout: Duration::from_secs(3),
            min_command_interval: Duration::from_millis(50),
            poll_period: Duration::from_millis(100),
            reconnect_backoff: Duration::from_secs(5),
        }
    }

    /// Base URL of the vehicle's web API.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.car_ip, self.car_port)
    }

    /// Topic `<prefix><car><suffix>` on the MQTT broker.
    pub fn mqtt_topic(&self, suffix: &str) -> String {
        format!("{}{}/{}", self.topic_prefix, self.car_name, suffix)
    }
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a connection attempt.
    pub fn attempt(&self) {
        *self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState {
            connected: self.connected(),
            last_attempt: *self
                .last_attempt
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

impl TransportError {
    /// True if this error means the vehicle could not be reached at all, rather than it answering
    /// something unexpected.
    pub fn is_link_error(&self) -> bool {
        matches!(
            self,
            TransportError::RequestError(_) | TransportError::NotConnected
        )
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// True if an MQTT transport can be built for this configuration.
pub fn mqtt_available(config: &ConnectionConfig) -> bool {
    cfg!(feature = "mqtt") && !config.mqtt_broker.trim().is_empty()
}

/// Choose the protocol actually used for this configuration, falling back on HTTP when MQTT was
/// requested but is unavailable.
pub fn select_protocol(config: &ConnectionConfig, log_target: &str) -> Protocol {
    match config.protocol {
        Protocol::Mqtt if !mqtt_available(config) => {
            error!(
                target: log_target,
                "MQTT requested for {} but no MQTT backend is available, falling back on HTTP",
                config.car_name
            );
            Protocol::Http
        }
        p => p,
    }
}

/// Build the transport for the given protocol. The transport is not connected yet.
pub fn build(
    protocol: Protocol,
    config: &ConnectionConfig,
    store: &Arc<TelemetryStore>,
    log_target: &str,
) -> Result<Arc<dyn Transport>, TransportError> {
    match protocol {
        Protocol::Http => Ok(Arc::new(HttpTransport::new(config, log_target)?)),
        Protocol::Mqtt => build_mqtt(config, store, log_target),
    }
}

#[cfg(feature = "mqtt")]
fn build_mqtt(
    config: &ConnectionConfig,
    store: &Arc<TelemetryStore>,
    log_target: &str,
) -> Result<Arc<dyn Transport>, TransportError> {
    Ok(Arc::new(MqttTransport::new(config, store.clone(), log_target)))
}

#[cfg(not(feature = "mqtt"))]
fn build_mqtt(
    config: &ConnectionConfig,
    _store: &Arc<TelemetryStore>,
    log_target: &str,
) -> Result<Arc<dyn Transport>, TransportError> {
    Ok(Arc::new(HttpTransport::new(config, log_target)?))
}
