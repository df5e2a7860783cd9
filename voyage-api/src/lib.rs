use axum::{http::Method, middleware::from_fn_with_state, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod bookings;
pub mod checkout;
pub mod error;
pub mod middleware;
pub mod payments;
pub mod state;
pub mod waitlist;
pub mod worker;

pub use state::{AppState, AuthConfig};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let customer = Router::new()
        .merge(bookings::routes())
        .merge(waitlist::routes())
        .merge(checkout::routes())
        .merge(payments::routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::customer_auth_middleware));

    let admin = Router::new()
        .merge(bookings::admin_routes())
        .merge(payments::admin_routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::admin_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(customer)
        .merge(admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit_middleware))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
