//! # Lab bus client
//!
//! The bridge publishes vehicle state, drawing commands and camera frames on a bound ZMQ `PUB`
//! socket, and receives high level commands on a `SUB` socket connected to the lab's command
//! publisher. Every message is two frames: `[topic, json]`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, trace, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use comms_if::{
    bus::{self, VehicleCommand},
    net::{zmq, MonitoredSocket, MonitoredSocketError, SocketOptions},
    VehicleId,
};
use util::thread::join_timeout;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const LISTENER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Sleep after a failed receive, so a broken socket doesn't spin.
const LISTENER_ERROR_SLEEP: Duration = Duration::from_millis(100);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something messages can be written to.
pub trait BusWriter: Send {
    fn write(&mut self, topic: &str, payload: &str) -> Result<(), BusError>;
}

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// A bus writer shared by everything that publishes.
pub type SharedBus = Arc<Mutex<Box<dyn BusWriter>>>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Bus writer over a bound ZMQ publisher.
pub struct ZmqBus {
    socket: MonitoredSocket,
}

/// Background listener for the commands of one vehicle.
pub struct CommandListener {
    bg_run: Arc<AtomicBool>,
    bg_jh: Option<JoinHandle<()>>,
    target: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not subscribe to {0}: {1}")]
    SubscribeError(String, zmq::Error),

    #[error("Could not send the message: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialise the message: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ZmqBus {
    /// Bind a publisher to the given endpoint.
    pub fn new(ctx: &zmq::Context, endpoint: &str) -> Result<Self, BusError> {
        let socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            linger: 1,
            send_timeout: 10,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(ctx, zmq::PUB, socket_options, endpoint)
            .map_err(BusError::SocketError)?;

        info!("Bus publisher bound to {}", endpoint);

        Ok(Self { socket })
    }
}

impl BusWriter for ZmqBus {
    fn write(&mut self, topic: &str, payload: &str) -> Result<(), BusError> {
        self.socket
            .send_multipart(vec![topic.as_bytes(), payload.as_bytes()], 0)
            .map_err(BusError::SendError)
    }
}

impl CommandListener {
    /// Subscribe to the commands of `vehicle_id` and call `handler` with each one, on a background
    /// thread.
    pub fn start<F>(
        ctx: &zmq::Context,
        endpoint: &str,
        vehicle_id: VehicleId,
        handler: F,
    ) -> Result<Self, BusError>
    where
        F: FnMut(VehicleCommand) + Send + 'static,
    {
        let target = format!("bridge_{}", vehicle_id);

        let socket_options = SocketOptions {
            block_on_first_connect: false,
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: 100,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(ctx, zmq::SUB, socket_options, endpoint)
            .map_err(BusError::SocketError)?;

        let topic = bus::command_topic(vehicle_id);
        socket
            .set_subscribe(topic.as_bytes())
            .map_err(|e| BusError::SubscribeError(topic.clone(), e))?;

        info!(target: &target, "Listening for {} on {}", topic, endpoint);

        let bg_run = Arc::new(AtomicBool::new(true));
        let bg_run_clone = bg_run.clone();
        let target_clone = target.clone();

        let bg_jh = Some(thread::spawn(move || {
            listener_thread(socket, vehicle_id, bg_run_clone, handler, target_clone)
        }));

        Ok(Self {
            bg_run,
            bg_jh,
            target,
        })
    }

    /// Stop listening. May be called any number of times.
    pub fn stop(&mut self) {
        self.bg_run.store(false, Ordering::SeqCst);

        if let Some(jh) = self.bg_jh.take() {
            if !join_timeout(jh, LISTENER_JOIN_TIMEOUT) {
                warn!(target: &self.target, "Command listener did not stop in time");
            }
        }
    }
}

impl Drop for CommandListener {
    fn drop(&mut self) {
        self.stop();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Serialise and publish a message on the shared bus.
pub fn publish<T: Serialize>(bus: &SharedBus, topic: &str, msg: &T) -> Result<(), BusError> {
    let payload = serde_json::to_string(msg).map_err(BusError::SerializationError)?;

    bus.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .write(topic, &payload)
}

/// Decode a received message, returning `None` if it is malformed or addressed to another vehicle.
pub fn decode_command(frames: &[Vec<u8>], vehicle_id: VehicleId) -> Option<VehicleCommand> {
    let payload = match frames {
        [_topic, payload] => payload,
        _ => {
            debug!("Expected a [topic, payload] message, got {} frames", frames.len());
            return None;
        }
    };

    let cmd: VehicleCommand = match serde_json::from_slice(payload) {
        Ok(c) => c,
        Err(e) => {
            warn!("Invalid vehicle command: {}", e);
            return None;
        }
    };

    if cmd.vehicle_id != vehicle_id {
        trace!("Ignoring command for vehicle {}", cmd.vehicle_id);
        return None;
    }

    Some(cmd)
}

fn listener_thread<F>(
    socket: MonitoredSocket,
    vehicle_id: VehicleId,
    run: Arc<AtomicBool>,
    mut handler: F,
    target: String,
) where
    F: FnMut(VehicleCommand),
{
    let mut was_connected = false;

    while run.load(Ordering::SeqCst) {
        let connected = socket.connected();
        if connected != was_connected {
            if connected {
                info!(target: &target, "Connected to the command publisher");
            } else {
                warn!(target: &target, "Lost the command publisher");
            }
            was_connected = connected;
        }

        match socket.recv_multipart(0) {
            Ok(frames) => {
                if let Some(cmd) = decode_command(&frames, vehicle_id) {
                    handler(cmd);
                }
            }
            Err(zmq::Error::EAGAIN) => (),
            Err(e) => {
                warn!(target: &target, "Could not receive a command: {}", e);
                thread::sleep(LISTENER_ERROR_SLEEP);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn frames(topic: &str, payload: &str) -> Vec<Vec<u8>> {
        vec![topic.as_bytes().to_vec(), payload.as_bytes().to_vec()]
    }

    #[test]
    fn test_decode_command() {
        let msg = frames(
            "vehicle_command_2",
            r#"{"vehicle_id": 2, "steering_target": 0.1, "velocity_target": 0.4}"#,
        );
        let cmd = decode_command(&msg, 2).unwrap();
        assert_eq!(cmd.velocity_target, 0.4);

        // Other vehicles, bad JSON and bad framing are dropped
        assert!(decode_command(&msg, 3).is_none());
        assert!(decode_command(&frames("vehicle_command_2", "{"), 2).is_none());
        assert!(decode_command(&msg[..1], 2).is_none());
    }

    #[test]
    fn test_pub_sub() {
        let ctx = zmq::Context::new();
        let endpoint = "inproc://bus_client_test";

        let mut publisher = ZmqBus::new(&ctx, endpoint).unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let mut listener = CommandListener::start(&ctx, endpoint, 5, move |cmd| {
            received_clone.lock().unwrap().push(cmd)
        })
        .unwrap();

        // Slow joiner: keep publishing until the subscriber is attached
        let cmd = VehicleCommand {
            vehicle_id: 5,
            steering_target: 0.2,
            velocity_target: 0.3,
        };
        let payload = serde_json::to_string(&cmd).unwrap();
        let other = payload.replace("\"vehicle_id\":5", "\"vehicle_id\":6");
        for _ in 0..100 {
            publisher.write("vehicle_command_5", &payload).unwrap();
            publisher.write("vehicle_command_6", &other).unwrap();
            if !received.lock().unwrap().is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }

        listener.stop();
        listener.stop();

        let received = received.lock().unwrap();
        assert!(!received.is_empty());
        assert!(received.iter().all(|c| *c == cmd));
    }
}
