//! HTTP surface over a simulated controller

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::util::ServiceExt;

use plcbridge::api::create_api_routes;
use plcbridge::core::bootstrap::Bridge;
use plcbridge::core::transport::SimulatedPlc;

mod common;
use common::{addr, sim_bridge};

async fn json_request(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(json) => request.body(Body::from(serde_json::to_string(&json).unwrap())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = if body_bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };
    (status, body)
}

fn router(bridge: &Bridge) -> Router {
    create_api_routes(bridge.app_state())
}

async fn polled_bridge() -> (SimulatedPlc, Bridge) {
    let (plc, bridge) = sim_bridge();
    plc.set_words(&addr("D0"), &[100, 0xFFFF, 7]);
    let mut bits = vec![false; 100];
    bits[0] = true;
    bits[16] = true;
    plc.set_bits(&addr("M501"), &bits);
    assert!(bridge.poller.poll_cycle().await.is_clean());
    (plc, bridge)
}

#[tokio::test]
async fn test_health_and_status() {
    let (_plc, bridge) = sim_bridge();
    let app = router(&bridge);

    let (status, body) = json_request(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");

    let (status, body) = json_request(&app, "GET", "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["plc"]["state"], "disconnected");
    assert_eq!(body["data"]["stations"], 4);

    let (status, body) = json_request(&app, "GET", "/api/stations", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stations"][3], "station4");
    assert_eq!(body["data"]["servo"], "servo1");
}

#[tokio::test]
async fn test_station_data_before_first_read() {
    let (_plc, bridge) = sim_bridge();
    let app = router(&bridge);

    let (status, body) = json_request(&app, "GET", "/api/station2/data", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["message"], "No data yet");

    let (status, _) = json_request(&app, "GET", "/api/station7/data", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_station_data_after_poll() {
    let (_plc, bridge) = polled_bridge().await;
    let app = router(&bridge);

    let (status, body) = json_request(&app, "GET", "/api/station1/data", None).await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["values"]["D0"], 100);
    assert_eq!(data["values"]["D1"], -1);
    assert_eq!(data["values"]["D2"], 7);
    assert_eq!(data["bits1"].as_array().unwrap().len(), 15);
    assert_eq!(data["bits1"][0], true);
    assert_eq!(data["bits2"][1], true);
    assert!(data["timestamp"].as_str().unwrap().len() == "2025-01-01 00:00:00".len());

    let (status, body) = json_request(&app, "GET", "/api/station3/data", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].get("bits1").is_none());
}

#[tokio::test]
async fn test_control_validation() {
    let (plc, bridge) = sim_bridge();
    let app = router(&bridge);

    let (status, body) = json_request(&app, "POST", "/api/station1/control", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Missing action parameter");

    let (status, _) = json_request(&app, "POST", "/api/station1/control", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = json_request(
        &app,
        "POST",
        "/api/station1/control",
        Some(json!({"action": "launch"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = json_request(
        &app,
        "POST",
        "/api/station9/control",
        Some(json!({"action": "start"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(plc.connect_attempts(), 0);
}

#[tokio::test]
async fn test_control_acknowledges_resolved_address() {
    let (_plc, bridge) = sim_bridge();
    let app = router(&bridge);

    let (status, body) = json_request(
        &app,
        "POST",
        "/api/station2/control",
        Some(json!({"action": "servo_on"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["action"], "servo_on");
    assert_eq!(body["data"]["address"], "M113");

    let (status, body) = json_request(
        &app,
        "POST",
        "/api/station4/control",
        Some(json!({"action": "button12"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["address"], "M542");
}

#[tokio::test]
async fn test_servo_read_and_write() {
    let (plc, bridge) = sim_bridge();
    let mut window = [0u16; 20];
    window[5] = 0x0002;
    window[6] = 0x0001;
    window[7] = 0xFFFF;
    window[8] = 0xFFFF;
    plc.set_words(&addr("D71"), &window);
    let app = router(&bridge);

    let (status, body) = json_request(&app, "GET", "/api/servo1/read", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["position"], 0x0001_0002);
    assert_eq!(body["data"]["speed"], 0xFFFF_FFFFu32);
    assert_eq!(body["data"]["values"].as_array().unwrap().len(), 20);

    let values: Vec<i64> = (1..=20).collect();
    let (status, body) = json_request(
        &app,
        "POST",
        "/api/servo1/write",
        Some(json!({ "values": values })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["address"], "D51");
    assert_eq!(plc.word(&addr("D51")), 1);
    assert_eq!(plc.word(&addr("D70")), 20);

    let (status, _) = json_request(&app, "GET", "/api/servo2/read", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_servo_write_rejects_malformed_payloads() {
    let (plc, bridge) = sim_bridge();
    let app = router(&bridge);

    let short: Vec<i64> = (0..19).collect();
    let mut mixed: Vec<Value> = (0..19).map(|i| json!(i)).collect();
    mixed.push(json!("twenty"));
    let floats = vec![1.5f64; 20];
    let payloads = [
        json!({ "values": short }),
        json!({ "values": mixed }),
        json!({ "values": floats }),
        json!({ "values": "all of them" }),
        json!({}),
    ];

    for payload in payloads {
        let (status, body) =
            json_request(&app, "POST", "/api/servo1/write", Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Expected 20 integers in 'values'");
    }
    assert_eq!(plc.connect_attempts(), 0);
    assert_eq!(plc.exchanges(), 0);
}

#[tokio::test]
async fn test_servo_read_with_unreachable_controller() {
    let (plc, bridge) = sim_bridge();
    plc.set_fail_connect(true);
    let app = router(&bridge);

    let (status, body) = json_request(&app, "GET", "/api/servo1/read", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
}
