use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub user_id: Uuid,
    pub package_id: Uuid,
    pub number_of_rooms: u32,
    pub total_price_cents: i64,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub user_id: Uuid,
    pub package_id: Uuid,
    pub number_of_rooms: u32,
    pub reason: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}

/// Rooms reappeared for a waiting-list entry; the user may book until `expires_at`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WaitlistSlotAvailableEvent {
    pub entry_id: Uuid,
    pub user_id: Uuid,
    pub package_id: Uuid,
    pub number_of_rooms: u32,
    pub notified_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outbound message produced after a committed state transition.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    BookingConfirmed(BookingConfirmedEvent),
    BookingCancelled(BookingCancelledEvent),
    WaitlistSlotAvailable(WaitlistSlotAvailableEvent),
}

impl Notification {
    /// User the message is addressed to.
    pub fn recipient(&self) -> Uuid {
        match self {
            Notification::BookingConfirmed(e) => e.user_id,
            Notification::BookingCancelled(e) => e.user_id,
            Notification::WaitlistSlotAvailable(e) => e.user_id,
        }
    }

    /// Stable key used to de-duplicate retried sends downstream.
    pub fn dedup_key(&self) -> String {
        match self {
            Notification::BookingConfirmed(e) => format!("confirmed:{}", e.booking_id),
            Notification::BookingCancelled(e) => format!("cancelled:{}", e.booking_id),
            Notification::WaitlistSlotAvailable(e) => {
                format!("waitlist:{}:{}", e.entry_id, e.notified_at.timestamp())
            }
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            Notification::BookingConfirmed(_) => "notifications.booking_confirmed",
            Notification::BookingCancelled(_) => "notifications.booking_cancelled",
            Notification::WaitlistSlotAvailable(_) => "notifications.waitlist_available",
        }
    }
}
