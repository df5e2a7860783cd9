use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};

use crate::app_config::BookingRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    rule_key: String,
    rule_value: Value,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay operator overrides from `business_rules` on top of the configured rules.
    ///
    /// Rows look like `{"value": <number>}`; unknown keys and malformed values are skipped.
    pub async fn fetch_business_rules(&self, defaults: BookingRules) -> Result<BookingRules, sqlx::Error> {
        let rows: Vec<RuleRow> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for row in rows {
            let Some(value) = row.rule_value.get("value") else {
                warn!("Business rule {} has no value, skipping", row.rule_key);
                continue;
            };
            apply_rule(&mut rules, &row.rule_key, value);
        }
        Ok(rules)
    }
}

fn apply_rule(rules: &mut BookingRules, key: &str, value: &Value) {
    let as_u32 = || value.as_u64().and_then(|v| u32::try_from(v).ok());
    match key {
        "max_active_bookings" => {
            if let Some(v) = as_u32() {
                rules.max_active_bookings = v;
            }
        }
        "booking_cutoff_hours" => {
            if let Some(v) = value.as_i64() {
                rules.booking_cutoff_hours = v;
            }
        }
        "cancellation_cutoff_days" => {
            if let Some(v) = value.as_i64() {
                rules.cancellation_cutoff_days = v;
            }
        }
        "waitlist_hold_hours" => {
            if let Some(v) = value.as_i64() {
                rules.waitlist_hold_hours = v;
            }
        }
        "max_conflict_retries" => {
            if let Some(v) = as_u32() {
                rules.max_conflict_retries = v;
            }
        }
        "sweep_interval_seconds" => {
            if let Some(v) = value.as_u64() {
                rules.sweep_interval_seconds = v;
            }
        }
        other => warn!("Unknown business rule {}, skipping", other),
    }
}
