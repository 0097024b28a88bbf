//! # Command line interface
//!
//! The connection to the vehicle is resolved once at startup, in order of precedence:
//!
//! 1. explicit command line flags,
//! 2. the entry of `--car-name` in the `[cars]` table of the parameter file,
//! 3. the `[network]` defaults of the parameter file.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use std::time::Duration;
use structopt::StructOpt;

use comms_if::vehicle::Protocol;
use comms_if::VehicleId;

use crate::params::BridgeExecParams;
use crate::transport::ConnectionConfig;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "bridge_exec",
    about = "Bridge a physical donkeycar to the lab bus over HTTP or MQTT"
)]
pub struct Cli {
    /// Id of the vehicle in the lab
    #[structopt(long)]
    pub vehicle_id: VehicleId,

    /// Protocol used to talk to the car, "http" or "mqtt"
    #[structopt(long)]
    pub protocol: Option<Protocol>,

    /// Name of a car from the parameter file's car table
    #[structopt(long)]
    pub car_name: Option<String>,

    /// IP address or host name of the car
    #[structopt(long)]
    pub ip: Option<String>,

    /// Port of the car's web controller
    #[structopt(long)]
    pub port: Option<u16>,

    /// Host of the MQTT broker
    #[structopt(long)]
    pub mqtt_broker: Option<String>,

    /// Port of the MQTT broker
    #[structopt(long)]
    pub mqtt_port: Option<u16>,

    /// Parameter file, relative to the params directory unless absolute
    #[structopt(long)]
    pub params: Option<String>,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Resolve the connection configuration of the vehicle.
pub fn resolve_connection(cli: &Cli, params: &BridgeExecParams) -> ConnectionConfig {
    let net = &params.network;
    let rates = &params.rates;

    // Defaults
    let mut config = ConnectionConfig {
        protocol: net.protocol,
        car_ip: net.car_ip.clone(),
        car_port: net.car_port,
        mqtt_broker: net.mqtt_broker.clone(),
        mqtt_port: net.mqtt_port,
        topic_prefix: net.mqtt_topic_prefix.clone(),
        health_timeout: Duration::from_millis(net.health_timeout_ms),
        request_timeout: Duration::from_millis(net.request_timeout_ms),
        mqtt_connect_timeout: Duration::from_millis(net.mqtt_connect_timeout_ms),
        min_command_interval: rates.min_command_interval(),
        poll_period: rates.poll_period(),
        reconnect_backoff: rates.reconnect_backoff(),
        ..ConnectionConfig::for_vehicle(cli.vehicle_id)
    };

    // Named car
    if let Some(ref name) = cli.car_name {
        config.car_name = name.clone();

        match params.cars.get(name) {
            Some(car) => {
                config.car_ip = car.ip.clone();
                config.car_port = car.port;
                if let Some(p) = car.protocol {
                    config.protocol = p;
                }
                if let Some(ref b) = car.mqtt_broker {
                    config.mqtt_broker = b.clone();
                }
                if let Some(p) = car.mqtt_port {
                    config.mqtt_port = p;
                }
            }
            None => warn!("Car \"{}\" is not in the car table, using defaults", name),
        }
    }

    // Explicit flags
    if let Some(p) = cli.protocol {
        config.protocol = p;
    }
    if let Some(ref ip) = cli.ip {
        config.car_ip = ip.clone();
    }
    if let Some(port) = cli.port {
        config.car_port = port;
    }
    if let Some(ref b) = cli.mqtt_broker {
        config.mqtt_broker = b.clone();
    }
    if let Some(p) = cli.mqtt_port {
        config.mqtt_port = p;
    }

    config
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::CarParams;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["bridge_exec"];
        full.extend_from_slice(args);
        Cli::from_iter_safe(full).unwrap()
    }

    fn params() -> BridgeExecParams {
        let mut params = BridgeExecParams::default();
        params.cars.insert(
            "garage".into(),
            CarParams {
                ip: "10.0.0.7".into(),
                port: 9000,
                protocol: Some(Protocol::Mqtt),
                mqtt_broker: None,
                mqtt_port: Some(1999),
            },
        );
        params
    }

    #[test]
    fn test_vehicle_id_required() {
        assert!(Cli::from_iter_safe(vec!["bridge_exec"]).is_err());
        assert!(Cli::from_iter_safe(vec!["bridge_exec", "--vehicle-id", "2", "--protocol", "ros"])
            .is_err());
    }

    #[test]
    fn test_defaults() {
        let config = resolve_connection(&cli(&["--vehicle-id", "3"]), &params());

        assert_eq!(config.protocol, Protocol::Http);
        assert_eq!(config.car_name, "car3");
        assert_eq!(config.car_ip, "localhost");
        assert_eq!(config.car_port, 8887);
        assert_eq!(config.mqtt_port, 1883);
        assert_eq!(config.topic_prefix, "donkeycar/");
        assert_eq!(config.min_command_interval.as_millis(), 50);
    }

    #[test]
    fn test_named_car() {
        let config = resolve_connection(
            &cli(&["--vehicle-id", "3", "--car-name", "garage"]),
            &params(),
        );

        assert_eq!(config.car_name, "garage");
        assert_eq!(config.car_ip, "10.0.0.7");
        assert_eq!(config.car_port, 9000);
        assert_eq!(config.protocol, Protocol::Mqtt);
        assert_eq!(config.mqtt_port, 1999);
        assert_eq!(config.mqtt_broker, "localhost");
    }

    #[test]
    fn test_flags_win() {
        let config = resolve_connection(
            &cli(&[
                "--vehicle-id",
                "3",
                "--car-name",
                "garage",
                "--ip",
                "192.168.1.20",
                "--protocol",
                "http",
                "--mqtt-port",
                "1884",
            ]),
            &params(),
        );

        assert_eq!(config.car_ip, "192.168.1.20");
        assert_eq!(config.car_port, 9000);
        assert_eq!(config.protocol, Protocol::Http);
        assert_eq!(config.mqtt_port, 1884);
    }

    #[test]
    fn test_unknown_car() {
        let config = resolve_connection(
            &cli(&["--vehicle-id", "3", "--car-name", "nope", "--port", "8000"]),
            &params(),
        );

        assert_eq!(config.car_name, "nope");
        assert_eq!(config.car_ip, "localhost");
        assert_eq!(config.car_port, 8000);
    }
}
