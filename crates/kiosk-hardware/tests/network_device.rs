//! NetworkDevice against an in-process relay controller.

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use kiosk_core::DeviceKind;
use kiosk_hardware::{AnyTriggerDevice, HardwareError, NetworkDevice, TriggerDevice};
use kiosk_network::{RelayClient, RelayClientConfig};
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;

async fn spawn_controller(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    address
}

fn healthy_controller() -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({ "uptime": 12 })) }))
        .route("/trigger", post(|| async { Json(json!({ "duration": 250 })) }))
}

fn client(timeout: Duration) -> RelayClient {
    RelayClient::new(RelayClientConfig {
        timeout,
        ..RelayClientConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_connect_sets_connected_and_latency() {
    let address = spawn_controller(healthy_controller()).await;
    let mut device = NetworkDevice::with_address(client(Duration::from_secs(2)), &address).unwrap();

    device.connect().await.unwrap();

    assert!(device.is_connected());
    assert!(device.last_latency().is_some());
    assert_eq!(device.address(), Some(address));
}

#[tokio::test]
async fn test_trigger_success() {
    let address = spawn_controller(healthy_controller()).await;
    let mut device = NetworkDevice::with_address(client(Duration::from_secs(2)), &address).unwrap();
    device.connect().await.unwrap();

    let outcome = device.trigger(250).await.unwrap();

    assert!(outcome.ok);
    assert_eq!(outcome.duration_ms, Some(250));
}

#[tokio::test]
async fn test_trigger_http_500_surfaces_status() {
    let app = Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route(
            "/trigger",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
    let address = spawn_controller(app).await;
    let mut device = NetworkDevice::with_address(client(Duration::from_secs(2)), &address).unwrap();
    device.connect().await.unwrap();

    let outcome = device.attempt(250).await;

    assert!(!outcome.ok);
    assert!(outcome.message.unwrap().contains("HTTP 500"));
}

#[tokio::test]
async fn test_health_failure_clears_connected() {
    let app = Router::new().route("/health", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
    let address = spawn_controller(app).await;
    let mut device = NetworkDevice::with_address(client(Duration::from_secs(2)), &address).unwrap();

    let err = device.health_check().await.unwrap_err();

    assert!(matches!(err, HardwareError::Protocol { .. }));
    assert!(!device.is_connected());
}

#[tokio::test]
async fn test_health_timeout_clears_connected() {
    let app = Router::new().route(
        "/health",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            StatusCode::OK
        }),
    );
    let address = spawn_controller(app).await;
    let mut device =
        NetworkDevice::with_address(client(Duration::from_millis(100)), &address).unwrap();

    let err = device.health_check().await.unwrap_err();

    assert!(matches!(err, HardwareError::Timeout { duration_ms: 100 }));
    assert!(!device.is_connected());
}

#[tokio::test]
async fn test_changing_address_drops_connection() {
    let address = spawn_controller(healthy_controller()).await;
    let mut device = NetworkDevice::with_address(client(Duration::from_secs(2)), &address).unwrap();
    device.connect().await.unwrap();

    device.set_address("192.0.2.10").unwrap();

    assert!(!device.is_connected());
    assert!(device.last_latency().is_none());
}

#[tokio::test]
async fn test_trigger_not_gated_on_health() {
    let address = spawn_controller(healthy_controller()).await;
    let mut device = NetworkDevice::with_address(client(Duration::from_secs(2)), &address).unwrap();

    // No connect: the request is still attempted.
    let outcome = device.trigger(250).await.unwrap();
    assert!(outcome.ok);
}

#[tokio::test]
async fn test_enum_dispatch_reports_network_kind() {
    let address = spawn_controller(healthy_controller()).await;
    let mut device = AnyTriggerDevice::from(
        NetworkDevice::with_address(client(Duration::from_secs(2)), &address).unwrap(),
    );

    device.connect().await.unwrap();
    assert_eq!(device.kind(), DeviceKind::Network);

    device.release().await;
    assert!(!device.is_connected());
}
