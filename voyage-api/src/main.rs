use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voyage_api::{app, worker, AppState, AuthConfig};
use voyage_booking::{
    CheckoutAggregator, InMemoryReservationStore, NotificationOutbox, PaymentOrchestrator, ReservationCoordinator,
    ReservationStore,
};
use voyage_core::{LoggingNotifier, MockPaymentAuthorizer, Notifier, StaticUserDirectory, UserDirectory};
use voyage_store::{Config, DbClient, PgReservationStore, PgUserDirectory, RedisClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voyage_api=debug,voyage_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Voyage API on port {}", config.server.port);

    // Store and directory: PostgreSQL when configured, in-memory otherwise
    let (store, directory, rules) = match &config.database {
        Some(db_config) => {
            let db = DbClient::new(&db_config.url, db_config.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.migrate().await.context("Failed to run migrations")?;
            let rules = db
                .fetch_business_rules(config.booking_rules.clone())
                .await
                .context("Failed to load business rules")?;
            (
                Arc::new(PgReservationStore::new(db.pool.clone())) as Arc<dyn ReservationStore>,
                Arc::new(PgUserDirectory::new(db.pool.clone())) as Arc<dyn UserDirectory>,
                rules,
            )
        }
        None => {
            tracing::warn!("No database configured, bookings live in memory only");
            (
                Arc::new(InMemoryReservationStore::new()) as Arc<dyn ReservationStore>,
                Arc::new(StaticUserDirectory::new()) as Arc<dyn UserDirectory>,
                config.booking_rules.clone(),
            )
        }
    };
    let policy = rules.policy();

    // Redis Connection
    let redis = match &config.redis {
        Some(redis_config) => Some(Arc::new(
            RedisClient::new(&redis_config.url)
                .await
                .context("Failed to connect to Redis")?,
        )),
        None => {
            tracing::warn!("No Redis configured, rate limiting disabled");
            None
        }
    };

    let notifier = build_notifier(&config)?;

    let (outbox, notifications) = NotificationOutbox::channel();
    let coordinator = ReservationCoordinator::new(store.clone(), policy, outbox.clone());
    let payments = PaymentOrchestrator::new(store, Arc::new(MockPaymentAuthorizer), policy, outbox);
    let checkout = CheckoutAggregator::new(coordinator.clone(), payments.clone());

    worker::start_notification_worker(notifier, directory, notifications);
    worker::start_hold_expiry_sweeper(coordinator.clone(), rules.sweep_interval_seconds);

    let app_state = AppState {
        coordinator,
        payments,
        checkout,
        redis,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        rate_limit_per_minute: config.server.rate_limit_per_minute,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    match &config.kafka {
        Some(kafka) => {
            let producer = voyage_store::EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?;
            Ok(Arc::new(voyage_store::KafkaNotifier::new(producer)))
        }
        None => Ok(Arc::new(LoggingNotifier)),
    }
}

#[cfg(not(feature = "kafka"))]
fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    if config.kafka.is_some() {
        tracing::warn!("Kafka configured but the binary was built without the `kafka` feature");
    }
    Ok(Arc::new(LoggingNotifier))
}
