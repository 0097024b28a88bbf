//! # MQTT transport
//!
//! Drive commands are published to `<prefix><car>/drive`. Telemetry and camera frames are pushed by
//! the car on `<prefix><car>/telemetry` and `<prefix><car>/camera`, which are subscribed to each
//! time the broker acknowledges a connection. A background thread drives the client's network
//! loop and feeds incoming messages into the telemetry store.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};
use rumqttc::{Client, ConnectReturnCode, Connection, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use comms_if::vehicle::{DriveCommand, Protocol};
use util::thread::{join_timeout, sleep_while_running};

use super::{ConnectionConfig, ConnectionState, Link, Transport, TransportError};
use crate::net_ctrl::TelemetryStore;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Capacity of the request channel between the client handle and the network loop.
const REQUEST_CAP: usize = 10;

const NETWORK_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

const CONNECT_POLL_PERIOD: Duration = Duration::from_millis(10);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct MqttTransport {
    options: MqttOptions,
    drive_topic: String,
    subscriptions: [String; 2],
    connect_timeout: Duration,
    reconnect_backoff: Duration,

    link: Arc<Link>,
    client: Mutex<Option<Client>>,
    bg_run: Arc<AtomicBool>,
    bg_jh: Mutex<Option<JoinHandle<()>>>,

    store: Arc<TelemetryStore>,
    target: String,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MqttTransport {
    /// Create a new transport for the car described by `config`. The broker is not contacted until
    /// `connect` is called.
    pub fn new(config: &ConnectionConfig, store: Arc<TelemetryStore>, log_target: &str) -> Self {
        let client_id = format!("donkeycar_bridge_{}", config.car_name);
        let mut options = MqttOptions::new(client_id, config.mqtt_broker.clone(), config.mqtt_port);
        options.set_keep_alive(KEEP_ALIVE);

        Self {
            options,
            drive_topic: config.mqtt_topic("drive"),
            subscriptions: [config.mqtt_topic("telemetry"), config.mqtt_topic("camera")],
            connect_timeout: config.mqtt_connect_timeout,
            reconnect_backoff: config.reconnect_backoff,
            link: Arc::new(Link::new()),
            client: Mutex::new(None),
            bg_run: Arc::new(AtomicBool::new(false)),
            bg_jh: Mutex::new(None),
            store,
            target: log_target.to_string(),
        }
    }

    /// Start the network loop if it is not already running.
    fn start_network_loop(&self) {
        let mut bg_jh = self.bg_jh.lock().unwrap_or_else(PoisonError::into_inner);
        if bg_jh.is_some() {
            return;
        }

        let (client, connection) = Client::new(self.options.clone(), REQUEST_CAP);
        *self.client.lock().unwrap_or_else(PoisonError::into_inner) = Some(client.clone());

        self.bg_run.store(true, Ordering::SeqCst);

        let ctx = NetworkLoop {
            client,
            subscriptions: self.subscriptions.clone(),
            reconnect_backoff: self.reconnect_backoff,
            link: self.link.clone(),
            run: self.bg_run.clone(),
            store: self.store.clone(),
            target: self.target.clone(),
        };

        info!(
            target: &self.target,
            "Connecting to MQTT broker {}:{}",
            self.options.broker_address().0,
            self.options.broker_address().1
        );

        *bg_jh = Some(thread::spawn(move || ctx.run(connection)));
    }
}

impl Transport for MqttTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Mqtt
    }

    fn connect(&self) -> ConnectionState {
        self.link.attempt();
        self.start_network_loop();

        // Wait for the broker to acknowledge the connection
        let start = Instant::now();
        while !self.link.connected() && start.elapsed() < self.connect_timeout {
            thread::sleep(CONNECT_POLL_PERIOD);
        }

        if !self.link.connected() {
            warn!(
                target: &self.target,
                "MQTT broker did not acknowledge the connection within {:?}", self.connect_timeout
            );
        }

        self.link.state()
    }

    fn state(&self) -> ConnectionState {
        self.link.state()
    }

    fn mark_disconnected(&self) {
        self.link.set_connected(false);
    }

    fn send_command(&self, cmd: &DriveCommand) -> bool {
        if !self.link.connected() {
            return false;
        }

        let payload = match serde_json::to_vec(cmd) {
            Ok(p) => p,
            Err(e) => {
                warn!(target: &self.target, "{}", TransportError::SerialiseError(e));
                return false;
            }
        };

        let mut client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        let result = match client.as_mut() {
            Some(c) => c
                .try_publish(self.drive_topic.as_str(), QoS::AtMostOnce, false, payload)
                .map_err(TransportError::MqttError),
            None => Err(TransportError::NotConnected),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(target: &self.target, "Drive command failed: {}", e);
                false
            }
        }
    }

    fn shutdown(&self) {
        self.bg_run.store(false, Ordering::SeqCst);

        if let Some(mut client) = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            if let Err(e) = client.try_disconnect() {
                debug!(target: &self.target, "MQTT disconnect request failed: {}", e);
            }
        }

        self.link.set_connected(false);

        let jh = self
            .bg_jh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(jh) = jh {
            if !join_timeout(jh, NETWORK_JOIN_TIMEOUT) {
                warn!(target: &self.target, "MQTT network loop did not exit in time");
            }
            info!(target: &self.target, "MQTT session closed");
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ------------------------------------------------------------------------------------------------
// NETWORK LOOP
// ------------------------------------------------------------------------------------------------

struct NetworkLoop {
    client: Client,
    subscriptions: [String; 2],
    reconnect_backoff: Duration,
    link: Arc<Link>,
    run: Arc<AtomicBool>,
    store: Arc<TelemetryStore>,
    target: String,
}

impl NetworkLoop {
    fn run(mut self, mut connection: Connection) {
        for notification in connection.iter() {
            if !self.run.load(Ordering::SeqCst) {
                break;
            }

            match notification {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        info!(target: &self.target, "Connected to MQTT broker");
                        self.link.set_connected(true);
                        self.subscribe();
                    } else {
                        warn!(
                            target: &self.target,
                            "MQTT broker refused the connection: {:?}", ack.code
                        );
                        self.link.set_connected(false);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.store
                        .dispatch_message(Protocol::Mqtt, &publish.topic, &publish.payload);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!(target: &self.target, "MQTT broker closed the connection");
                    self.link.set_connected(false);
                }
                Ok(_) => (),
                Err(e) => {
                    if self.link.connected() {
                        warn!(target: &self.target, "MQTT connection lost: {}", e);
                    } else {
                        debug!(target: &self.target, "MQTT connection error: {}", e);
                    }
                    self.link.set_connected(false);

                    // The next iteration reconnects
                    if !sleep_while_running(&self.run, self.reconnect_backoff) {
                        break;
                    }
                }
            }
        }

        self.link.set_connected(false);
    }

    fn subscribe(&mut self) {
        for topic in self.subscriptions.iter() {
            match self.client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                Ok(()) => debug!(target: &self.target, "Subscribed to {}", topic),
                Err(e) => warn!(target: &self.target, "Could not subscribe to {}: {}", topic, e),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Nothing listens on port 1 of the loopback, so every connection is refused.
    fn unreachable() -> MqttTransport {
        let config = ConnectionConfig {
            protocol: Protocol::Mqtt,
            mqtt_broker: "127.0.0.1".into(),
            mqtt_port: 1,
            mqtt_connect_timeout: Duration::from_millis(300),
            reconnect_backoff: Duration::from_millis(50),
            ..ConnectionConfig::for_vehicle(2)
        };
        let store = Arc::new(TelemetryStore::new(Protocol::Mqtt, "mqtt_test"));

        MqttTransport::new(&config, store, "mqtt_test")
    }

    #[test]
    fn test_topics() {
        let transport = unreachable();

        assert_eq!(transport.drive_topic, "donkeycar/car2/drive");
        assert_eq!(
            transport.subscriptions,
            [
                "donkeycar/car2/telemetry".to_string(),
                "donkeycar/car2/camera".to_string()
            ]
        );
        assert_eq!(transport.protocol(), Protocol::Mqtt);
    }

    #[test]
    fn test_unreachable_broker() {
        let transport = unreachable();
        assert!(transport.state().last_attempt.is_none());

        // Not connected yet, nothing is published
        assert!(!transport.send_command(&DriveCommand::user(0.1, 0.1)));

        let start = Instant::now();
        let state = transport.connect();
        let elapsed = start.elapsed();

        assert!(!state.connected);
        assert!(state.last_attempt.is_some());
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_secs(2));

        assert!(!transport.send_command(&DriveCommand::user(0.1, 0.1)));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_shutdown_twice() {
        let transport = unreachable();
        transport.connect();

        let start = Instant::now();
        transport.shutdown();
        assert!(start.elapsed() < Duration::from_millis(2500));
        assert!(!transport.is_connected());

        let start = Instant::now();
        transport.shutdown();
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(!transport.is_connected());

        assert!(transport.client.lock().unwrap().is_none());
        assert!(transport.bg_jh.lock().unwrap().is_none());
    }

    #[test]
    fn test_drop_stops_network_loop() {
        let transport = unreachable();
        transport.connect();
        let run = transport.bg_run.clone();
        let link = transport.link.clone();

        let start = Instant::now();
        drop(transport);

        assert!(start.elapsed() < Duration::from_millis(2500));
        assert!(!run.load(Ordering::SeqCst));
        assert!(!link.connected());
    }

    #[test]
    fn test_shutdown_without_connect() {
        let transport = unreachable();

        transport.shutdown();
        transport.shutdown();
        assert!(!transport.is_connected());
    }
}
