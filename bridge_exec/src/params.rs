//! # Bridge Executable Parameters
//!
//! This module provide parameters for the bridge executable, loaded from `bridge_exec.toml`. Every
//! field has a default so a partial (or missing) parameter file still gives a working bridge.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use comms_if::vehicle::Protocol;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeExecParams {
    /// Physical limits of the vehicles
    pub vehicle: VehicleParams,

    /// Loop rates and sleeps
    pub rates: RateParams,

    /// Default vehicle network settings
    pub network: NetworkParams,

    /// Lab bus endpoints
    pub bus: BusParams,

    /// Known cars, selected with `--car-name`
    pub cars: BTreeMap<String, CarParams>,
}

/// Physical limits used to scale between normalised and physical units.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VehicleParams {
    /// Speed reached at full throttle in meters/second
    pub max_speed_ms: f64,

    /// Steering angle reached at full steering in degrees
    pub max_steering_angle_deg: f64,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateParams {
    /// Sleep between two iterations of the bridge loop
    pub loop_period_ms: u64,

    /// Rate at which the vehicle state is published
    pub state_publish_hz: f64,

    /// Sleep of the bridge loop while the vehicle is unreachable
    pub disconnected_sleep_ms: u64,

    /// Sleep of the bridge loop after a failed iteration
    pub error_sleep_ms: u64,

    /// Rate at which HTTP telemetry is polled
    pub poll_hz: f64,

    /// Sleep before reconnecting after a lost link
    pub reconnect_backoff_ms: u64,

    /// Minimum time between two commands sent to the vehicle
    pub min_command_interval_ms: u64,

    /// Maximum rate of visualization drawings
    pub vis_draw_hz: f64,

    /// Maximum rate of forwarded camera frames
    pub vis_camera_hz: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkParams {
    pub protocol: Protocol,
    pub car_ip: String,
    pub car_port: u16,

    /// MQTT broker host, leave empty to disable MQTT
    pub mqtt_broker: String,
    pub mqtt_port: u16,
    pub mqtt_topic_prefix: String,

    pub health_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub mqtt_connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusParams {
    /// Endpoint the bridge binds its publisher to (state, visualization, camera)
    pub pub_endpoint: String,

    /// Endpoint the bridge connects its command subscriber to
    pub cmd_endpoint: String,
}

/// An entry of the named car table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CarParams {
    pub ip: String,
    pub port: u16,

    #[serde(default)]
    pub protocol: Option<Protocol>,

    #[serde(default)]
    pub mqtt_broker: Option<String>,

    #[serde(default)]
    pub mqtt_port: Option<u16>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VehicleParams {
    /// Steering angle reached at full steering in radians.
    pub fn max_steering_rad(&self) -> f64 {
        self.max_steering_angle_deg.to_radians()
    }
}

impl RateParams {
    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(self.loop_period_ms)
    }

    pub fn state_publish_period(&self) -> Duration {
        hz_to_period(self.state_publish_hz, Duration::from_millis(100))
    }

    pub fn disconnected_sleep(&self) -> Duration {
        Duration::from_millis(self.disconnected_sleep_ms)
    }

    pub fn error_sleep(&self) -> Duration {
        Duration::from_millis(self.error_sleep_ms)
    }

    pub fn poll_period(&self) -> Duration {
        hz_to_period(self.poll_hz, Duration::from_millis(100))
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn min_command_interval(&self) -> Duration {
        Duration::from_millis(self.min_command_interval_ms)
    }

    pub fn vis_draw_period(&self) -> Duration {
        hz_to_period(self.vis_draw_hz, Duration::from_millis(50))
    }

    pub fn vis_camera_period(&self) -> Duration {
        hz_to_period(self.vis_camera_hz, Duration::from_millis(100))
    }
}

impl Default for BridgeExecParams {
    fn default() -> Self {
        let mut cars = BTreeMap::new();
        for name in &["testcar", "testcar2"] {
            cars.insert(
                name.to_string(),
                CarParams {
                    ip: "localhost".into(),
                    port: 8887,
                    protocol: None,
                    mqtt_broker: None,
                    mqtt_port: None,
                },
            );
        }

        Self {
            vehicle: VehicleParams::default(),
            rates: RateParams::default(),
            network: NetworkParams::default(),
            bus: BusParams::default(),
            cars,
        }
    }
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            max_speed_ms: 1.0,
            max_steering_angle_deg: 30.0,
        }
    }
}

impl Default for RateParams {
    fn default() -> Self {
        Self {
            loop_period_ms: 10,
            state_publish_hz: 10.0,
            disconnected_sleep_ms: 2000,
            error_sleep_ms: 1000,
            poll_hz: 10.0,
            reconnect_backoff_ms: 5000,
            min_command_interval_ms: 50,
            vis_draw_hz: 20.0,
            vis_camera_hz: 10.0,
        }
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            protocol: Protocol::Http,
            car_ip: "localhost".into(),
            car_port: 8887,
            mqtt_broker: "localhost".into(),
            mqtt_port: 1883,
            mqtt_topic_prefix: "donkeycar/".into(),
            health_timeout_ms: 3000,
            request_timeout_ms: 1000,
            mqtt_connect_timeout_ms: 3000,
        }
    }
}

impl Default for BusParams {
    fn default() -> Self {
        Self {
            pub_endpoint: "tcp://*:5600".into(),
            cmd_endpoint: "tcp://localhost:5601".into(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert a rate into a period, non-positive rates give a zero period (no limit).
///
/// Rates so low that their period cannot be represented give `default`.
fn hz_to_period(hz: f64, default: Duration) -> Duration {
    if !(hz > 0.0 && hz.is_finite()) {
        return Duration::from_secs(0);
    }

    match Duration::try_from_secs_f64(1.0 / hz) {
        Ok(p) => p,
        Err(e) => {
            warn!(
                "Rate of {} Hz gives an invalid period ({}), using {:?}",
                hz, e, default
            );
            default
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_toml() {
        let params: BridgeExecParams = toml::from_str(
            r#"
            [vehicle]
            max_speed_ms = 2.5

            [network]
            protocol = "mqtt"

            [cars.garage]
            ip = "10.0.0.7"
            port = 9000
            protocol = "http"
            "#,
        )
        .unwrap();

        assert_eq!(params.vehicle.max_speed_ms, 2.5);
        assert_eq!(params.vehicle.max_steering_angle_deg, 30.0);
        assert_eq!(params.network.protocol, Protocol::Mqtt);
        assert_eq!(params.network.car_port, 8887);
        assert_eq!(params.cars.len(), 1);
        assert_eq!(params.cars["garage"].protocol, Some(Protocol::Http));
    }

    #[test]
    fn test_shipped_file_matches_defaults() {
        let params: BridgeExecParams =
            toml::from_str(include_str!("../../params/bridge_exec.toml")).unwrap();

        assert_eq!(params, BridgeExecParams::default());
    }

    #[test]
    fn test_default_periods() {
        let rates = RateParams::default();

        assert_eq!(rates.state_publish_period(), Duration::from_millis(100));
        assert_eq!(rates.vis_draw_period(), Duration::from_millis(50));
        assert_eq!(rates.min_command_interval(), Duration::from_millis(50));
        assert_eq!(
            hz_to_period(0.0, Duration::from_millis(100)),
            Duration::from_secs(0)
        );
    }

    #[test]
    fn test_tiny_rate_falls_back() {
        let default = Duration::from_millis(100);
        assert_eq!(hz_to_period(1e-300, default), default);
        assert_eq!(hz_to_period(1e-20, default), default);

        let rates = RateParams {
            poll_hz: 1e-300,
            state_publish_hz: 1e-20,
            ..RateParams::default()
        };
        assert_eq!(rates.poll_period(), Duration::from_millis(100));
        assert_eq!(rates.state_publish_period(), Duration::from_millis(100));

        // Slow but representable rates are kept
        assert_eq!(hz_to_period(0.5, default), Duration::from_secs(2));
    }
}
