use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use surge_dispatch::api::rest::router;
use surge_dispatch::config::Config;
use surge_dispatch::state::AppState;

fn test_config() -> Config {
    Config {
        http_port: 0,
        log_level: "debug".to_string(),
        event_buffer_size: 64,
        presence_ttl_secs: 300,
        eviction_interval_secs: 120,
        snapshot_interval_secs: 15,
        supply_freshness_secs: 600,
        booking_expiry_secs: 300,
        expiry_interval_secs: 60,
    }
}

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(test_config()));
    (router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn push_driver(app: &axum::Router, lat: f64, lng: f64) -> Uuid {
    let id = Uuid::new_v4();
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/providers/{id}/presence"),
            json!({
                "location": { "lat": lat, "lng": lng },
                "heading_degrees": 45.0,
                "speed_kmh": 20.0,
                "is_available": true,
                "role": "driver",
                "verified": true
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    id
}

async fn create_ride_booking(app: &axum::Router) -> Value {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/bookings",
            json!({
                "customer_id": Uuid::new_v4(),
                "kind": { "ride": { "ride_type": "economy" } },
                "pickup": { "lat": 5.6037, "lng": -0.187 },
                "dropoff": { "lat": 5.62, "lng": -0.17 }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["providers"], 0);
    assert_eq!(body["bookings"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("surge_multiplier"));
    assert!(body.contains("rejections_total"));
}

#[tokio::test]
async fn presence_push_then_offline() {
    let (app, state) = setup();
    let id = push_driver(&app, 5.6037, -0.187).await;
    assert_eq!(state.presence.len(), 1);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/providers/{id}/offline"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(state.presence.len(), 0);

    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/providers/{id}/offline"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn presence_push_rejects_bad_coordinates() {
    let (app, _state) = setup();
    let id = Uuid::new_v4();
    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/providers/{id}/presence"),
            json!({
                "location": { "lat": 95.0, "lng": 0.0 },
                "is_available": true,
                "role": "driver",
                "verified": true
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn nearby_excludes_out_of_radius_providers() {
    let (app, _state) = setup();
    push_driver(&app, 5.6040, -0.186).await;
    push_driver(&app, 6.70, -1.62).await;

    let res = app
        .oneshot(get_request(
            "/providers/nearby?lat=5.6037&lng=-0.187&radius_km=5",
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn quiet_weekday_afternoon_ride_has_flat_surge() {
    let (app, _state) = setup();
    for _ in 0..5 {
        push_driver(&app, 5.604, -0.186).await;
    }

    // Tuesday 14:00 UTC.
    let res = app
        .oneshot(json_request(
            "POST",
            "/estimates/ride",
            json!({
                "pickup": { "lat": 5.6037, "lng": -0.187 },
                "dropoff": { "lat": 5.62, "lng": -0.17 },
                "ride_type": "economy",
                "scheduled_at": "2026-08-18T14:00:00Z"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    assert_eq!(body["surge"]["multiplier"], 1.0);

    let subtotal = body["subtotal"].as_f64().unwrap();
    let total = body["total"].as_f64().unwrap();
    assert_eq!(total, subtotal.round().max(10.0));
    assert!(total >= 10.0);
}

#[tokio::test]
async fn rush_hour_ride_applies_rush_factor_without_weekend_stacking() {
    let (app, _state) = setup();
    for _ in 0..5 {
        push_driver(&app, 5.604, -0.186).await;
    }

    // Tuesday 08:00 UTC: rush hour on a weekday.
    let res = app
        .oneshot(json_request(
            "POST",
            "/estimates/ride",
            json!({
                "pickup": { "lat": 5.6037, "lng": -0.187 },
                "dropoff": { "lat": 5.62, "lng": -0.17 },
                "ride_type": "economy",
                "scheduled_at": "2026-08-18T08:00:00Z"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    assert_eq!(body["surge"]["multiplier"], 1.5);
    assert_eq!(body["surge"]["reason"], "computed");
}

#[tokio::test]
async fn no_supply_ride_uses_fixed_surge_at_any_hour() {
    let (app, _state) = setup();

    for hour in ["03:00:00", "08:00:00", "14:00:00"] {
        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/estimates/ride",
                json!({
                    "pickup": { "lat": 5.6037, "lng": -0.187 },
                    "dropoff": { "lat": 5.62, "lng": -0.17 },
                    "ride_type": "economy",
                    "scheduled_at": format!("2026-08-18T{hour}Z")
                }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body = body_json(res).await;
        assert_eq!(body["surge"]["multiplier"], 1.5);
        assert_eq!(body["surge"]["reason"], "no_supply");
    }
}

#[tokio::test]
async fn ride_estimate_rejects_invalid_coordinates() {
    let (app, _state) = setup();
    let res = app
        .oneshot(json_request(
            "POST",
            "/estimates/ride",
            json!({
                "pickup": { "lat": 120.0, "lng": -0.187 },
                "dropoff": { "lat": 5.62, "lng": -0.17 },
                "ride_type": "economy"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn day_hire_estimate_rejects_zero_hours() {
    let (app, _state) = setup();
    let res = app
        .oneshot(json_request(
            "POST",
            "/estimates/day",
            json!({ "hours": 0.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn shared_ride_share_decreases_with_more_passengers() {
    let (app, _state) = setup();

    let mut last = f64::INFINITY;
    for count in 1..=4 {
        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/estimates/shared",
                json!({ "total_group_price": 120.0, "new_passenger_count": count }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body = body_json(res).await;
        let per_passenger = body["per_passenger"].as_f64().unwrap();
        assert!(per_passenger <= last);
        assert!(body["discount_rate"].as_f64().unwrap() <= 0.5);
        last = per_passenger;
    }
}

#[tokio::test]
async fn pricing_update_rejects_surge_above_ceiling() {
    let (app, _state) = setup();
    let res = app
        .oneshot(json_request(
            "PUT",
            "/config/pricing",
            json!({
                "surge": {
                    "rush_hour_factor": 1.5,
                    "late_night_factor": 1.3,
                    "weekend_factor": 1.2,
                    "max_surge": 3.0,
                    "min_drivers_for_surge": 3,
                    "base_surge_no_supply": 1.5,
                    "min_demand_for_surge": 3,
                    "medium_ratio_threshold": 1.5,
                    "high_ratio_threshold": 3.0,
                    "low_demand_multiplier": 1.1,
                    "medium_demand_multiplier": 1.25,
                    "high_demand_multiplier": 1.5
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pricing_update_applies_and_affects_quotes() {
    let (app, _state) = setup();
    for _ in 0..5 {
        push_driver(&app, 5.604, -0.186).await;
    }

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/config/pricing",
            json!({
                "fare": {
                    "base_fare": 5.0,
                    "per_km": 1.5,
                    "per_minute": 0.3,
                    "minimum_fare": 50.0,
                    "avg_speed_kmh": 30.0,
                    "economy_multiplier": 1.0,
                    "comfort_multiplier": 1.3,
                    "premium_multiplier": 1.8,
                    "van_multiplier": 1.6,
                    "expected_per_km_min": 1.5,
                    "expected_per_km_max": 15.0
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .oneshot(json_request(
            "POST",
            "/estimates/ride",
            json!({
                "pickup": { "lat": 5.6037, "lng": -0.187 },
                "dropoff": { "lat": 5.6040, "lng": -0.1871 },
                "ride_type": "economy",
                "scheduled_at": "2026-08-18T14:00:00Z"
            }),
        ))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["total"], 50.0);
}

#[tokio::test]
async fn booking_is_created_pending_with_a_quote() {
    let (app, _state) = setup();
    push_driver(&app, 5.604, -0.186).await;

    let booking = create_ride_booking(&app).await;

    assert_eq!(booking["status"], "PENDING");
    assert!(booking["provider_id"].is_null());
    assert!(booking["quoted_fare"].as_f64().unwrap() >= 10.0);
}

#[tokio::test]
async fn accept_assigns_booking_and_second_accept_conflicts() {
    let (app, state) = setup();
    let first = push_driver(&app, 5.604, -0.186).await;
    let second = push_driver(&app, 5.605, -0.185).await;

    let booking = create_ride_booking(&app).await;
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/bookings/{booking_id}/accept"),
            json!({ "provider_id": first }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let outcome = body_json(res).await;
    assert_eq!(outcome["booking"]["status"], "ASSIGNED");
    assert_eq!(outcome["booking"]["provider_id"], first.to_string());
    assert!(outcome["eta_minutes"].as_f64().unwrap() >= 0.0);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/bookings/{booking_id}/accept"),
            json!({ "provider_id": second }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    assert!(!state.presence.get(first).unwrap().is_available);
    assert!(state.presence.get(second).unwrap().is_available);
}

#[tokio::test]
async fn simultaneous_accepts_produce_exactly_one_winner() {
    let (app, state) = setup();
    let providers: Vec<Uuid> = {
        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(push_driver(&app, 5.604 + i as f64 * 0.001, -0.186).await);
        }
        ids
    };

    let booking = create_ride_booking(&app).await;
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let mut handles = Vec::new();
    for provider in providers {
        let app = app.clone();
        let uri = format!("/bookings/{booking_id}/accept");
        handles.push(tokio::spawn(async move {
            let res = app
                .oneshot(json_request("POST", &uri, json!({ "provider_id": provider })))
                .await
                .unwrap();
            res.status() == StatusCode::OK
        }));
    }

    let mut wins = 0;
    for handle in handles {
        if handle.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);

    let stored = state
        .bookings
        .get(booking_id.parse().unwrap())
        .unwrap();
    assert_eq!(
        stored.status,
        surge_dispatch::models::booking::BookingStatus::Assigned
    );
    assert!(stored.provider_id.is_some());
}

#[tokio::test]
async fn reject_leaves_booking_pending() {
    let (app, _state) = setup();
    let rejecting = push_driver(&app, 5.604, -0.186).await;
    push_driver(&app, 5.606, -0.184).await;

    let booking = create_ride_booking(&app).await;
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/bookings/{booking_id}/reject"),
            json!({ "provider_id": rejecting, "reason": "too far" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    assert_eq!(body["status"], "PENDING");
}

#[tokio::test]
async fn cancel_frees_assigned_provider() {
    let (app, state) = setup();
    let provider = push_driver(&app, 5.604, -0.186).await;

    let booking = create_ride_booking(&app).await;
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/bookings/{booking_id}/accept"),
            json!({ "provider_id": provider }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/bookings/{booking_id}/cancel"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    assert_eq!(body["status"], "CANCELLED");
    assert!(state.presence.get(provider).unwrap().is_available);
}

#[tokio::test]
async fn full_trip_lifecycle_over_rest() {
    let (app, _state) = setup();
    let provider = push_driver(&app, 5.604, -0.186).await;

    let booking = create_ride_booking(&app).await;
    let booking_id = booking["id"].as_str().unwrap().to_string();

    for (step, expected) in [
        ("accept", "ASSIGNED"),
        ("arrive", "ARRIVED"),
        ("start", "IN_PROGRESS"),
        ("complete", "COMPLETED"),
    ] {
        let payload = if step == "accept" {
            json!({ "provider_id": provider })
        } else {
            json!({})
        };
        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/bookings/{booking_id}/{step}"),
                payload,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "step {step}");

        let body = body_json(res).await;
        let status = if step == "accept" {
            body["booking"]["status"].clone()
        } else {
            body["status"].clone()
        };
        assert_eq!(status, expected, "step {step}");
    }
}

#[tokio::test]
async fn get_unknown_booking_returns_404() {
    let (app, _state) = setup();
    let res = app
        .oneshot(get_request(&format!("/bookings/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
