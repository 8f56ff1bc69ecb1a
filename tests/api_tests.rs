use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use scooter_fleet::config::EnvironmentConfig;
use scooter_fleet::metrics::Metrics;
use scooter_fleet::models::{GeoPoint, User, Vehicle, Zone, ZoneKind};
use scooter_fleet::protocol::TelemetryConfig;
use scooter_fleet::repositories::Store;
use scooter_fleet::routes::create_app_router;
use scooter_fleet::state::AppState;
use scooter_fleet::utils::jwt::generate_token;

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    store: Store,
}

struct TestResponse {
    status: StatusCode,
    body: Value,
}

impl TestApp {
    async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        TestResponse { status, body }
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }
}

fn test_config() -> EnvironmentConfig {
    EnvironmentConfig {
        environment: "test".to_string(),
        port: 0,
        host: "127.0.0.1".to_string(),
        jwt_secret: SECRET.to_string(),
        database_url: None,
        cors_origins: Vec::new(),
        telemetry: TelemetryConfig::default(),
    }
}

async fn create_test_app() -> TestApp {
    let store = Store::in_memory();
    let state = AppState::new(test_config(), store.clone(), Metrics::new().unwrap());
    TestApp {
        router: create_app_router(state),
        store,
    }
}

fn token_for(user_id: Uuid, role: Option<&str>) -> String {
    generate_token(user_id, role, SECRET, 3600).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app().await;
    let response = app.get("/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus_text() {
    let app = create_test_app().await;
    let response = app.get("/metrics", None).await;

    assert_eq!(response.status, StatusCode::OK);
    let text = response.body.as_str().unwrap_or_default().to_string();
    assert!(text.contains("scooter_fleet_"), "metrics body: {}", text);
}

#[tokio::test]
async fn test_vehicle_lookup() {
    let app = create_test_app().await;
    let vehicle = app
        .store
        .vehicles
        .insert(&Vehicle::new("S-7", 40.0, -3.0))
        .await
        .unwrap();

    let list = app.get("/api/vehicles", None).await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.body.as_array().map(Vec::len), Some(1));

    let found = app.get(&format!("/api/vehicles/{}", vehicle.id), None).await;
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.body["name"], "S-7");
    assert_eq!(found.body["status"], "idle");

    let missing = app.get(&format!("/api/vehicles/{}", Uuid::new_v4()), None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_location_correction_and_history() {
    let app = create_test_app().await;
    let vehicle = app
        .store
        .vehicles
        .insert(&Vehicle::new("S-8", 40.0, -3.0))
        .await
        .unwrap();
    let admin = token_for(Uuid::new_v4(), Some("admin"));
    let uri = format!("/api/vehicles/{}/location", vehicle.id);

    let empty = app.get(&uri, None).await;
    assert_eq!(empty.status, StatusCode::OK);
    assert!(empty.body["current"].is_null());

    for (lat, lng) in [(40.1, -3.1), (40.2, -3.2)] {
        let response = app
            .request(
                Method::PUT,
                &uri,
                Some(&admin),
                Some(json!({"lat": lat, "lng": lng})),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
    }

    let current = app.get(&uri, None).await;
    assert_eq!(current.body["current"]["lat"], 40.2);
    assert_eq!(current.body["current"]["lng"], -3.2);

    let history = app.get(&format!("{}/history", uri), None).await;
    assert_eq!(history.status, StatusCode::OK);
    assert_eq!(history.body.as_array().map(Vec::len), Some(1));
    assert_eq!(history.body[0]["lat"], 40.1);
}

#[tokio::test]
async fn test_location_correction_rejects_bad_input() {
    let app = create_test_app().await;
    let vehicle = app
        .store
        .vehicles
        .insert(&Vehicle::new("S-9", 40.0, -3.0))
        .await
        .unwrap();
    let uri = format!("/api/vehicles/{}/location", vehicle.id);
    let admin = token_for(Uuid::new_v4(), Some("admin"));
    let rider = token_for(Uuid::new_v4(), None);

    let not_numeric = app
        .request(
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!({"lat": "north", "lng": 2})),
        )
        .await;
    assert_eq!(not_numeric.status, StatusCode::BAD_REQUEST);

    let out_of_range = app
        .request(
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!({"lat": 120, "lng": 2})),
        )
        .await;
    assert_eq!(out_of_range.status, StatusCode::BAD_REQUEST);
    assert_eq!(out_of_range.body["code"], "VALIDATION_ERROR");

    let not_admin = app
        .request(
            Method::PUT,
            &uri,
            Some(&rider),
            Some(json!({"lat": 40, "lng": 2})),
        )
        .await;
    assert_eq!(not_admin.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_rentals_require_token() {
    let app = create_test_app().await;
    let response = app
        .request(
            Method::POST,
            "/api/rentals",
            None,
            Some(json!({"scooterId": Uuid::new_v4()})),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let bad_token = app.get("/api/rentals", Some("not-a-jwt")).await;
    assert_eq!(bad_token.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_rental_rejects_bad_body_with_json_error() {
    let app = create_test_app().await;
    let owner = app.store.users.insert(&User::new("leo", 100)).await.unwrap();
    let token = token_for(owner.id, None);

    for body in [json!({}), json!({"scooter": "nope"})] {
        let response = app
            .request(Method::POST, "/api/rentals", Some(&token), Some(body))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["error"], "Bad Request");
        assert_eq!(response.body["code"], "BAD_REQUEST");
        assert!(response.body["message"].is_string());
    }

    let mine = app.get("/api/rentals", Some(&token)).await;
    assert_eq!(mine.body.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_command_rejects_unknown_action() {
    let app = create_test_app().await;
    let admin = token_for(Uuid::new_v4(), Some("admin"));
    let response = app
        .request(
            Method::POST,
            &format!("/api/vehicles/{}/command", Uuid::new_v4()),
            Some(&admin),
            Some(json!({"action": "FLY"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_rental_flow_with_offline_vehicle() {
    let app = create_test_app().await;
    let owner = app.store.users.insert(&User::new("eva", 100)).await.unwrap();
    let vehicle = app
        .store
        .vehicles
        .insert(&Vehicle::new("S-10", 40.0, -3.0))
        .await
        .unwrap();
    let token = token_for(owner.id, None);

    let created = app
        .request(
            Method::POST,
            "/api/rentals",
            Some(&token),
            Some(json!({"scooterId": vehicle.id})),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["vehicleReachable"], false);
    assert_eq!(created.body["scooter"], vehicle.id.to_string());
    assert_eq!(created.body["startHistoryIndex"], 0);
    let rental_id = created.body["id"].as_str().unwrap().to_string();

    let again = app
        .request(
            Method::POST,
            "/api/rentals",
            Some(&token),
            Some(json!({"scooterId": vehicle.id})),
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let quote = app
        .get(&format!("/api/rentals/{}/quote", rental_id), Some(&token))
        .await;
    assert_eq!(quote.status, StatusCode::OK);
    assert_eq!(quote.body["parking"]["reason"], "no_trip_history");

    let end = app
        .request(
            Method::PATCH,
            &format!("/api/rentals/{}/end", rental_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(end.status, StatusCode::CONFLICT);

    let stranger = token_for(Uuid::new_v4(), None);
    let forbidden = app
        .get(&format!("/api/rentals/{}", rental_id), Some(&stranger))
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let mine = app.get("/api/rentals", Some(&token)).await;
    assert_eq!(mine.status, StatusCode::OK);
    assert_eq!(mine.body.as_array().map(Vec::len), Some(1));
    assert!(mine.body[0]["endTime"].is_null());
}

#[tokio::test]
async fn test_manual_command_reports_delivery() {
    let app = create_test_app().await;
    let vehicle = app
        .store
        .vehicles
        .insert(&Vehicle::new("S-11", 40.0, -3.0))
        .await
        .unwrap();
    let admin = token_for(Uuid::new_v4(), Some("admin"));

    let response = app
        .request(
            Method::POST,
            &format!("/api/vehicles/{}/command", vehicle.id),
            Some(&admin),
            Some(json!({"action": "START"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["delivered"], false);

    let empty = app
        .request(
            Method::POST,
            &format!("/api/vehicles/{}/command", vehicle.id),
            Some(&admin),
            Some(json!({})),
        )
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_zones_lists_only_active() {
    let app = create_test_app().await;
    let active = Zone::circle("Sol", ZoneKind::Parking, GeoPoint::new(40.4168, -3.7038), 50.0);
    let mut retired = Zone::circle("Old", ZoneKind::Parking, GeoPoint::new(40.0, -3.0), 50.0);
    retired.active = false;
    app.store.zones.insert(&active).await.unwrap();
    app.store.zones.insert(&retired).await.unwrap();

    let response = app.get("/api/zones", None).await;
    assert_eq!(response.status, StatusCode::OK);
    let zones = response.body.as_array().cloned().unwrap_or_default();
    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0]["name"], "Sol");
    assert_eq!(zones[0]["type"], "circle");
}
