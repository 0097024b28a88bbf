//! # HTTP transport
//!
//! Talks to the donkeycar web controller:
//!
//! - `GET /api/health` - liveness check, a `200` marks the link as up
//! - `POST /api/drive` - normalised drive command
//! - `GET /api/telemetry` - telemetry JSON
//! - `GET /api/camera` - `{"image": <base64>}`

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use comms_if::vehicle::{CameraPayload, DriveCommand, Protocol};

use super::{ConnectionConfig, ConnectionState, Link, Transport, TransportError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const HEALTH_PATH: &str = "/api/health";
const DRIVE_PATH: &str = "/api/drive";
const TELEMETRY_PATH: &str = "/api/telemetry";
const CAMERA_PATH: &str = "/api/camera";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct HttpTransport {
    client: Client,
    base_url: String,
    health_timeout: Duration,
    request_timeout: Duration,
    link: Link,
    target: String,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HttpTransport {
    /// Create a new transport for the car described by `config`. No request is made yet.
    pub fn new(config: &ConnectionConfig, log_target: &str) -> Result<Self, TransportError> {
        Self::with_base_url(
            &config.base_url(),
            config.health_timeout,
            config.request_timeout,
            log_target,
        )
    }

    /// Create a new transport for the web controller at `base_url`, e.g. `"http://10.0.0.4:8887"`.
    pub fn with_base_url(
        base_url: &str,
        health_timeout: Duration,
        request_timeout: Duration,
        log_target: &str,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .build()
            .map_err(TransportError::ClientBuildError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            health_timeout,
            request_timeout,
            link: Link::new(),
            target: log_target.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query the health endpoint.
    pub fn check_health(&self) -> Result<(), TransportError> {
        let response = self
            .client
            .get(self.url(HEALTH_PATH))
            .timeout(self.health_timeout)
            .send()
            .map_err(TransportError::RequestError)?;

        expect_ok(&response)
    }

    /// Post a drive command.
    pub fn post_drive(&self, cmd: &DriveCommand) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.url(DRIVE_PATH))
            .json(cmd)
            .timeout(self.request_timeout)
            .send()
            .map_err(TransportError::RequestError)?;

        expect_ok(&response)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let response = self
            .client
            .get(self.url(path))
            .timeout(self.request_timeout)
            .send()
            .map_err(TransportError::RequestError)?;

        expect_ok(&response)?;

        let body = response.bytes().map_err(TransportError::RequestError)?;
        serde_json::from_slice(&body).map_err(TransportError::DecodeError)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Transport for HttpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    fn connect(&self) -> ConnectionState {
        self.link.attempt();

        match self.check_health() {
            Ok(()) => {
                if !self.link.connected() {
                    info!(target: &self.target, "Connected to {}", self.base_url);
                }
                self.link.set_connected(true);
            }
            Err(e) => {
                warn!(
                    target: &self.target,
                    "Could not connect to {}: {}", self.base_url, e
                );
                self.link.set_connected(false);
            }
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
        if !self.link.connected() && !self.connect().connected {
            return false;
        }

        match self.post_drive(cmd) {
            Ok(()) => true,
            Err(e) => {
                warn!(target: &self.target, "Drive command failed: {}", e);
                if e.is_link_error() {
                    self.link.set_connected(false);
                }
                false
            }
        }
    }

    fn fetch_telemetry(&self) -> Result<Value, TransportError> {
        let telemetry = self.get_json(TELEMETRY_PATH)?;
        debug!(target: &self.target, "Telemetry: {}", telemetry);
        Ok(telemetry)
    }

    fn fetch_camera(&self) -> Result<CameraPayload, TransportError> {
        self.get_json(CAMERA_PATH)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn expect_ok(response: &Response) -> Result<(), TransportError> {
    match response.status() {
        StatusCode::OK => Ok(()),
        s => Err(TransportError::StatusError(s)),
    }
}
