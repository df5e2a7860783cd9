//! Drives the router end to end against the in-memory store.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use voyage_api::{app, middleware::Claims, AppState, AuthConfig};
use voyage_booking::{
    BookingPolicy, CheckoutAggregator, InMemoryReservationStore, NotificationOutbox, PaymentOrchestrator,
    ReservationCoordinator,
};
use voyage_catalog::Package;
use voyage_core::MockPaymentAuthorizer;

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    store: Arc<InMemoryReservationStore>,
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(InMemoryReservationStore::new());
        // Receiver dropped: enqueued notifications are discarded.
        let (outbox, _notifications) = NotificationOutbox::channel();
        let policy = BookingPolicy::default();
        let coordinator = ReservationCoordinator::new(store.clone(), policy, outbox.clone());
        let payments = PaymentOrchestrator::new(store.clone(), Arc::new(MockPaymentAuthorizer), policy, outbox);
        let checkout = CheckoutAggregator::new(coordinator.clone(), payments.clone());

        let state = AppState {
            coordinator,
            payments,
            checkout,
            redis: None,
            auth: AuthConfig {
                secret: SECRET.to_string(),
                expiration: 3600,
            },
            rate_limit_per_minute: 100,
        };
        Self {
            router: app(state),
            store,
        }
    }

    async fn package(&self, rooms: u32, starts_in: Duration) -> Package {
        let package = Package::new("Kyoto Autumn Tour", 95_000, rooms, Utc::now() + starts_in);
        self.store.insert_package(package.clone()).await;
        package
    }

    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

fn bearer_for(user_id: Uuid, role: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        email: Some("traveler@example.com".to_string()),
        role: role.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn card(number: &str) -> Value {
    json!({
        "card_number": number,
        "cvv": "123",
        "expiry": "12/30",
        "holder_name": "Test Traveler"
    })
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let app = TestApp::new();
    let (status, body) = app.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_bookings_require_a_valid_token() {
    let app = TestApp::new();
    let (status, _) = app.call("GET", "/v1/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call("GET", "/v1/bookings", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_then_list_and_fetch_booking() {
    let app = TestApp::new();
    let package = app.package(5, Duration::days(20)).await;
    let user = Uuid::new_v4();
    let token = bearer_for(user, "CUSTOMER");

    let (status, booking) = app
        .call(
            "POST",
            "/v1/bookings",
            Some(&token),
            Some(json!({ "package_id": package.id, "number_of_rooms": 2, "number_of_guests": 3 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "PENDING");
    assert_eq!(booking["total_price_cents"], 190_000);

    let (status, list) = app.call("GET", "/v1/bookings", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().map(Vec::len), Some(1));

    let id = booking["id"].as_str().unwrap();
    let (status, fetched) = app.call("GET", &format!("/v1/bookings/{id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["booking_reference"], booking["booking_reference"]);

    // Someone else's booking looks like a missing one
    let stranger = bearer_for(Uuid::new_v4(), "CUSTOMER");
    let (status, body) = app.call("GET", &format!("/v1/bookings/{id}"), Some(&stranger), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_fully_booked_maps_to_conflict() {
    let app = TestApp::new();
    let package = app.package(1, Duration::days(20)).await;
    let request = json!({ "package_id": package.id, "number_of_rooms": 1, "number_of_guests": 1 });

    let (status, _) = app
        .call("POST", "/v1/bookings", Some(&bearer_for(Uuid::new_v4(), "CUSTOMER")), Some(request.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .call("POST", "/v1/bookings", Some(&bearer_for(Uuid::new_v4(), "CUSTOMER")), Some(request))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "FULLY_BOOKED");
}

#[tokio::test]
async fn test_cancel_inside_cutoff_is_unprocessable() {
    let app = TestApp::new();
    let package = app.package(4, Duration::days(2)).await;
    let token = bearer_for(Uuid::new_v4(), "CUSTOMER");

    let (_, booking) = app
        .call(
            "POST",
            "/v1/bookings",
            Some(&token),
            Some(json!({ "package_id": package.id, "number_of_rooms": 1, "number_of_guests": 1 })),
        )
        .await;
    let id = booking["id"].as_str().unwrap();

    let (status, body) = app
        .call("POST", &format!("/v1/bookings/{id}/cancel"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "CANCELLATION_WINDOW_EXPIRED");
}

#[tokio::test]
async fn test_admin_routes_reject_customers() {
    let app = TestApp::new();
    let package = app.package(3, Duration::days(20)).await;
    let user = Uuid::new_v4();
    let customer = bearer_for(user, "CUSTOMER");

    let (_, booking) = app
        .call(
            "POST",
            "/v1/bookings",
            Some(&customer),
            Some(json!({ "package_id": package.id, "number_of_rooms": 1, "number_of_guests": 2 })),
        )
        .await;
    let id = booking["id"].as_str().unwrap();

    let (status, _) = app
        .call("POST", &format!("/v1/bookings/{id}/confirm"), Some(&customer), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = bearer_for(Uuid::new_v4(), "ADMIN");
    let (status, confirmed) = app
        .call("POST", &format!("/v1/bookings/{id}/confirm"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["status"], "CONFIRMED");
}

#[tokio::test]
async fn test_waitlist_join_status_and_leave() {
    let app = TestApp::new();
    let package = app.package(1, Duration::days(20)).await;
    let first = bearer_for(Uuid::new_v4(), "CUSTOMER");
    let second = bearer_for(Uuid::new_v4(), "CUSTOMER");
    let uri = format!("/v1/packages/{}/waitlist", package.id);

    let (status, body) = app.call("POST", &uri, Some(&first), Some(json!({ "number_of_rooms": 1 }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["position"], 1);

    let (_, body) = app.call("POST", &uri, Some(&second), Some(json!({ "number_of_rooms": 1 }))).await;
    assert_eq!(body["position"], 2);

    let (status, body) = app.call("POST", &uri, Some(&first), Some(json!({ "number_of_rooms": 1 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_QUEUED");

    let (status, body) = app.call("DELETE", &uri, Some(&first), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], true);

    let (status, body) = app.call("GET", &format!("{uri}/me"), Some(&second), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["position"], 1);
    assert_eq!(body["is_user_next"], true);
}

#[tokio::test]
async fn test_checkout_reports_failed_lines_and_opens_one_payment() {
    let app = TestApp::new();
    let open = app.package(3, Duration::days(20)).await;
    let sold_out = app.package(0, Duration::days(20)).await;
    let token = bearer_for(Uuid::new_v4(), "CUSTOMER");

    let (status, body) = app
        .call(
            "POST",
            "/v1/checkout",
            Some(&token),
            Some(json!({
                "lines": [
                    { "package_id": open.id, "rooms": 1, "guests": 2 },
                    { "package_id": sold_out.id, "rooms": 1, "guests": 2 }
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["succeeded"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["failed"][0]["index"], 1);
    assert_eq!(body["failed"][0]["code"], "FULLY_BOOKED");
    assert_eq!(body["payment"]["status"], "PENDING");
    assert_eq!(body["payment"]["amount_cents"], 95_000);

    let (status, body) = app
        .call("POST", "/v1/checkout", Some(&token), Some(json!({ "lines": [] })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_payment_approval_confirms_and_decline_is_payment_required() {
    let app = TestApp::new();
    let package = app.package(4, Duration::days(20)).await;
    let token = bearer_for(Uuid::new_v4(), "CUSTOMER");

    let (_, checkout) = app
        .call(
            "POST",
            "/v1/checkout",
            Some(&token),
            Some(json!({ "lines": [{ "package_id": package.id, "rooms": 1, "guests": 1 }] })),
        )
        .await;
    let payment_id = checkout["payment"]["id"].as_str().unwrap().to_string();

    let (status, payment) = app
        .call(
            "POST",
            &format!("/v1/payments/{payment_id}/process"),
            Some(&token),
            Some(card("4242424242424242")),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["status"], "COMPLETED");

    let (_, bookings) = app.call("GET", "/v1/bookings", Some(&token), None).await;
    assert_eq!(bookings[0]["status"], "CONFIRMED");

    // A second traveler pays with a card that gets declined
    let other = bearer_for(Uuid::new_v4(), "CUSTOMER");
    let (_, booking) = app
        .call(
            "POST",
            "/v1/bookings",
            Some(&other),
            Some(json!({ "package_id": package.id, "number_of_rooms": 1, "number_of_guests": 1 })),
        )
        .await;
    let (status, payment) = app
        .call(
            "POST",
            "/v1/payments",
            Some(&other),
            Some(json!({ "booking_ids": [booking["id"]] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let payment_id = payment["id"].as_str().unwrap();

    let (status, body) = app
        .call(
            "POST",
            &format!("/v1/payments/{payment_id}/process"),
            Some(&other),
            Some(card("4000000000000002")),
        )
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "PAYMENT_DECLINED");

    let (_, bookings) = app.call("GET", "/v1/bookings", Some(&other), None).await;
    assert_eq!(bookings[0]["status"], "CANCELLED");
}

#[tokio::test]
async fn test_refund_is_admin_only_and_cancels_bookings() {
    let app = TestApp::new();
    let package = app.package(2, Duration::days(1) + Duration::hours(12)).await;
    let customer = bearer_for(Uuid::new_v4(), "CUSTOMER");

    let (_, checkout) = app
        .call(
            "POST",
            "/v1/checkout",
            Some(&customer),
            Some(json!({ "lines": [{ "package_id": package.id, "rooms": 2, "guests": 2 }] })),
        )
        .await;
    let payment_id = checkout["payment"]["id"].as_str().unwrap().to_string();
    let (status, _) = app
        .call(
            "POST",
            &format!("/v1/payments/{payment_id}/process"),
            Some(&customer),
            Some(card("4242424242424242")),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let refund_uri = format!("/v1/payments/{payment_id}/refund");
    let (status, _) = app.call("POST", &refund_uri, Some(&customer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = bearer_for(Uuid::new_v4(), "ADMIN");
    let (status, payment) = app
        .call("POST", &refund_uri, Some(&admin), Some(json!({ "reason": "operator refund" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["status"], "REFUNDED");

    let (_, bookings) = app.call("GET", "/v1/bookings", Some(&customer), None).await;
    assert_eq!(bookings[0]["status"], "CANCELLED");
    assert_eq!(bookings[0]["cancellation_reason"], "operator refund");
}
