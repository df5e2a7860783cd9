use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fixed-date travel product with finite room capacity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Package {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub discounted_price_cents: Option<i64>,
    pub discount_starts_at: Option<DateTime<Utc>>,
    pub discount_ends_at: Option<DateTime<Utc>>,
    /// Ledger value. Only the reservation engine moves it.
    pub available_rooms: u32,
    pub total_rooms: u32,
    pub is_active: bool,
    pub start_date: DateTime<Utc>,
    pub currency: String,
}

impl Package {
    pub fn new(name: impl Into<String>, price_cents: i64, rooms: u32, start_date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            price_cents,
            discounted_price_cents: None,
            discount_starts_at: None,
            discount_ends_at: None,
            available_rooms: rooms,
            total_rooms: rooms,
            is_active: true,
            start_date,
            currency: "USD".to_string(),
        }
    }

    pub fn with_discount(
        mut self,
        discounted_price_cents: i64,
        starts_at: Option<DateTime<Utc>>,
        ends_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.discounted_price_cents = Some(discounted_price_cents);
        self.discount_starts_at = starts_at;
        self.discount_ends_at = ends_at;
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Time left before the trip starts (negative once it has started).
    pub fn time_until_start(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.start_date - now
    }
}
