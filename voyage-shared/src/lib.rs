pub mod models;
pub mod pii;

pub use models::events::{
    BookingCancelledEvent, BookingConfirmedEvent, Notification, WaitlistSlotAvailableEvent,
};
pub use pii::Masked;
