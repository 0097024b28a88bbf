//! HTTP transport tests against a mock donkeycar web controller.
//!
//! The blocking reqwest client must not be created, used or dropped on an async worker, so every
//! transport operation runs inside `spawn_blocking`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bridge_lib::net_ctrl::{NetworkController, TelemetryStore};
use bridge_lib::transport::{ConnectionConfig, HttpTransport, Transport};
use comms_if::vehicle::{DriveCommand, Protocol};
use util::session::Session;

// ------------------------------------------------------------------------------------------------
// HELPERS
// ------------------------------------------------------------------------------------------------

const TIMEOUT: Duration = Duration::from_millis(500);

fn transport(uri: &str) -> HttpTransport {
    HttpTransport::with_base_url(uri, TIMEOUT, TIMEOUT, "http_test").unwrap()
}

fn config(server: &MockServer) -> ConnectionConfig {
    let addr = server.address();

    ConnectionConfig {
        car_ip: addr.ip().to_string(),
        car_port: addr.port(),
        health_timeout: TIMEOUT,
        request_timeout: TIMEOUT,
        poll_period: Duration::from_millis(20),
        reconnect_backoff: Duration::from_millis(50),
        ..ConnectionConfig::for_vehicle(1)
    }
}

async fn mount_health(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// A small PNG, base64 encoded.
fn png_base64(width: u32, height: u32) -> String {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
    let mut bytes = Vec::new();
    img.write_to(&mut bytes, image::ImageOutputFormat::Png).unwrap();
    base64::encode(&bytes)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn test_health_check_connects() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    let uri = server.uri();

    let state = tokio::task::spawn_blocking(move || transport(&uri).connect())
        .await
        .unwrap();

    assert!(state.connected);
    assert!(state.last_attempt.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unhealthy_vehicle() {
    let server = MockServer::start().await;
    mount_health(&server, 503).await;
    let uri = server.uri();

    let (connected, sent) = tokio::task::spawn_blocking(move || {
        let t = transport(&uri);
        let connected = t.connect().connected;
        let sent = t.send_command(&DriveCommand::user(0.0, 0.2));
        (connected, sent)
    })
    .await
    .unwrap();

    assert!(!connected);
    assert!(!sent);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_drive_command_body() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    Mock::given(method("POST"))
        .and(path("/api/drive"))
        .and(body_json(json!({
            "steering": 0.25,
            "throttle": -0.5,
            "drive_mode": "user",
            "recording": false
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let uri = server.uri();

    let sent = tokio::task::spawn_blocking(move || {
        let t = transport(&uri);
        t.connect();
        t.send_command(&DriveCommand::user(0.25, -0.5))
    })
    .await
    .unwrap();

    assert!(sent);
    server.verify().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_drive_rejected_keeps_link() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    Mock::given(method("POST"))
        .and(path("/api/drive"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let uri = server.uri();

    let (sent, connected) = tokio::task::spawn_blocking(move || {
        let t = transport(&uri);
        t.connect();
        let sent = t.send_command(&DriveCommand::user(0.0, 0.0));
        (sent, t.is_connected())
    })
    .await
    .unwrap();

    // The vehicle answered, so the link is still up
    assert!(!sent);
    assert!(connected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_telemetry_and_camera() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/telemetry"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "steering": 0.1,
            "throttle": 0.3,
            "battery": 7.4
        })))
        .mount(&server)
        .await;
    let image = png_base64(4, 3);
    Mock::given(method("GET"))
        .and(path("/api/camera"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "image": image })))
        .mount(&server)
        .await;
    let uri = server.uri();

    let (telemetry, camera) = tokio::task::spawn_blocking(move || {
        let t = transport(&uri);
        (t.fetch_telemetry(), t.fetch_camera())
    })
    .await
    .unwrap();

    let telemetry = telemetry.unwrap();
    assert_eq!(telemetry["throttle"], 0.3);
    assert_eq!(telemetry["battery"], 7.4);
    assert_eq!(camera.unwrap().image, Some(image));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_loss() {
    // Pooled servers keep listening after being dropped, this one shuts down
    let server = MockServer::builder().start().await;
    mount_health(&server, 200).await;
    let uri = server.uri();

    // Kept alive across the await, and only dropped on a blocking thread
    let t = tokio::task::spawn_blocking(move || {
        let t = transport(&uri);
        assert!(t.connect().connected);
        t
    })
    .await
    .unwrap();

    // The vehicle goes away
    drop(server);

    let (sent, connected) = tokio::task::spawn_blocking(move || {
        thread::sleep(Duration::from_millis(200));
        let sent = t.send_command(&DriveCommand::user(0.0, 0.0));
        let connected = t.is_connected();
        (sent, connected)
    })
    .await
    .unwrap();

    assert!(!sent);
    assert!(!connected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_controller_polls_telemetry() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    Mock::given(method("GET"))
        .and(path("/api/telemetry"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"steering": -0.4, "throttle": 0.6})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/camera"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "image": png_base64(8, 6) })),
        )
        .mount(&server)
        .await;
    let config = config(&server);

    let (connected, steering_throttle, camera_size) = tokio::task::spawn_blocking(move || {
        let session = Session::detached("http_test");
        let controller = NetworkController::new(&session, 1, &config).unwrap();
        assert_eq!(controller.protocol(), Protocol::Http);

        controller.start_telemetry_collection();

        let deadline = Instant::now() + Duration::from_secs(3);
        while controller.latest_camera_frame().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }

        let camera_size = controller
            .latest_camera_frame()
            .map(|f| (f.width(), f.height()));
        let result = (
            controller.is_connected(),
            controller.latest_steering_throttle(),
            camera_size,
        );

        controller.stop_telemetry_collection();
        result
    })
    .await
    .unwrap();

    assert!(connected);
    assert_eq!(steering_throttle, (-0.4, 0.6));
    assert_eq!(camera_size, Some((8, 6)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_controller_rejects_other_protocol() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    let config = config(&server);

    let accepted = tokio::task::spawn_blocking(move || {
        let session = Session::detached("http_test");
        let store = Arc::new(TelemetryStore::new(Protocol::Http, "http_test"));
        let http: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config, "http_test").unwrap());
        let controller =
            NetworkController::with_transport(&session, 1, http, store.clone(), &config);

        let accepted = store.apply_telemetry(Protocol::Mqtt, json!({"steering": 1.0}));
        assert_eq!(controller.latest_steering_throttle(), (0.0, 0.0));
        accepted
    })
    .await
    .unwrap();

    assert!(!accepted);
}
