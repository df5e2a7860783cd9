use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Pending and Confirmed bookings hold rooms and count against the user's cap.
    pub fn is_live(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_live()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status {other}")),
        }
    }
}

/// One reservation of rooms on a package for one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub package_id: Uuid,
    pub number_of_rooms: u32,
    pub number_of_guests: u32,
    pub total_price_cents: i64,
    pub status: BookingStatus,
    pub booking_reference: String,
    pub booked_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

impl Booking {
    pub fn new(
        user_id: Uuid,
        package_id: Uuid,
        number_of_rooms: u32,
        number_of_guests: u32,
        total_price_cents: i64,
        booking_reference: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            package_id,
            number_of_rooms,
            number_of_guests,
            total_price_cents,
            status: BookingStatus::Pending,
            booking_reference,
            booked_at: now,
            confirmed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }
}

/// Payment status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    /// Claimed by one `process_payment` call while the authorizer runs.
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// A failed payment is superseded by the next attempt; the others are live.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Completed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PROCESSING" => Ok(PaymentStatus::Processing),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status {other}")),
        }
    }
}

/// A charge covering one booking, or every booking admitted by one checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub booking_ids: Vec<Uuid>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: String,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        booking_ids: Vec<Uuid>,
        amount_cents: i64,
        currency: String,
        method: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_ids,
            amount_cents,
            currency,
            status: PaymentStatus::Pending,
            method,
            transaction_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn covers(&self, booking_id: &Uuid) -> bool {
        self.booking_ids.contains(booking_id)
    }
}

/// A user's place in a package's waiting list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaitingListEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub package_id: Uuid,
    pub number_of_rooms: u32,
    /// 1-based, derived from (`date_added`, `id`) order.
    pub position: u32,
    pub date_added: DateTime<Utc>,
    pub is_notified: bool,
    pub date_notified: Option<DateTime<Utc>>,
}

impl WaitingListEntry {
    pub fn new(user_id: Uuid, package_id: Uuid, number_of_rooms: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            package_id,
            number_of_rooms,
            position: 0,
            date_added: now,
            is_notified: false,
            date_notified: None,
        }
    }

    /// End of the availability window opened by the last notification.
    pub fn hold_expires_at(&self, window: chrono::Duration) -> Option<DateTime<Utc>> {
        self.date_notified.map(|notified| notified + window)
    }

    /// Whether this entry currently holds rooms for itself.
    pub fn holds_rooms(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.is_notified && self.hold_expires_at(window).is_some_and(|expiry| now < expiry)
    }

    /// Notified, but the window closed. The entry is dead weight until the sweeper drops it.
    pub fn hold_lapsed(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.is_notified && !self.holds_rooms(now, window)
    }
}
