use serde::Deserialize;
use std::env;
use voyage_booking::BookingPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// Without a database the API runs on the in-memory store.
    pub database: Option<DatabaseConfig>,
    /// Without Redis the rate limiter is not installed.
    pub redis: Option<RedisConfig>,
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub booking_rules: BookingRules,
}

/// Reservation rules. Every field has a default so partial files and env overrides work.
#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    #[serde(default = "default_max_active_bookings")]
    pub max_active_bookings: u32,
    #[serde(default = "default_booking_cutoff_hours")]
    pub booking_cutoff_hours: i64,
    #[serde(default = "default_cancellation_cutoff_days")]
    pub cancellation_cutoff_days: i64,
    #[serde(default = "default_waitlist_hold_hours")]
    pub waitlist_hold_hours: i64,
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

fn default_max_active_bookings() -> u32 { 3 }
fn default_booking_cutoff_hours() -> i64 { 24 }
fn default_cancellation_cutoff_days() -> i64 { 3 }
fn default_waitlist_hold_hours() -> i64 { 24 }
fn default_max_conflict_retries() -> u32 { 3 }
fn default_sweep_interval_seconds() -> u64 { 300 }

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            max_active_bookings: default_max_active_bookings(),
            booking_cutoff_hours: default_booking_cutoff_hours(),
            cancellation_cutoff_days: default_cancellation_cutoff_days(),
            waitlist_hold_hours: default_waitlist_hold_hours(),
            max_conflict_retries: default_max_conflict_retries(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

impl BookingRules {
    pub fn policy(&self) -> BookingPolicy {
        BookingPolicy {
            max_active_bookings: self.max_active_bookings,
            booking_cutoff_hours: self.booking_cutoff_hours,
            cancellation_cutoff_days: self.cancellation_cutoff_days,
            waitlist_hold_hours: self.waitlist_hold_hours,
            max_conflict_retries: self.max_conflict_retries,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: i64,
}

fn default_rate_limit_per_minute() -> i64 { 100 }

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local developer overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `VOYAGE__BOOKING_RULES__MAX_ACTIVE_BOOKINGS=5`
            .add_source(config::Environment::with_prefix("VOYAGE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
