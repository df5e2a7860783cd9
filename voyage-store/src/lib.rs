pub mod app_config;
pub mod database;
pub mod redis_repo;
pub mod reservation_repo;
pub mod user_directory;

#[cfg(feature = "kafka")]
pub mod events;
#[cfg(feature = "kafka")]
pub mod notifier;

pub use app_config::{BookingRules, Config};
pub use database::DbClient;
pub use redis_repo::RedisClient;
pub use reservation_repo::PgReservationStore;
pub use user_directory::PgUserDirectory;

#[cfg(feature = "kafka")]
pub use events::EventProducer;
#[cfg(feature = "kafka")]
pub use notifier::KafkaNotifier;
