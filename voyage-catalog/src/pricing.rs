use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::package::Package;

/// Price of a room request at a given instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceQuote {
    pub unit_price_cents: i64,
    pub rooms: u32,
    pub total_cents: i64,
    pub discounted: bool,
}

impl Package {
    /// Whether the discounted price applies at `now`.
    ///
    /// Open-ended bounds are treated as unbounded; the end bound is exclusive.
    pub fn discount_active(&self, now: DateTime<Utc>) -> bool {
        if self.discounted_price_cents.is_none() {
            return false;
        }
        let started = self.discount_starts_at.map_or(true, |start| start <= now);
        let not_ended = self.discount_ends_at.map_or(true, |end| now < end);
        started && not_ended
    }

    pub fn unit_price_at(&self, now: DateTime<Utc>) -> i64 {
        match self.discounted_price_cents {
            Some(discounted) if self.discount_active(now) => discounted,
            _ => self.price_cents,
        }
    }

    pub fn quote(&self, rooms: u32, now: DateTime<Utc>) -> PriceQuote {
        let unit_price_cents = self.unit_price_at(now);
        PriceQuote {
            unit_price_cents,
            rooms,
            total_cents: unit_price_cents * i64::from(rooms),
            discounted: self.discount_active(now),
        }
    }
}
