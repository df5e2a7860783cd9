use std::sync::Arc;
use voyage_booking::{CheckoutAggregator, PaymentOrchestrator, ReservationCoordinator};
use voyage_store::RedisClient;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: ReservationCoordinator,
    pub payments: PaymentOrchestrator,
    pub checkout: CheckoutAggregator,
    /// Rate limiting is skipped when no Redis is configured.
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub rate_limit_per_minute: i64,
}
