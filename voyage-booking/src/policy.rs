use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use voyage_catalog::Package;

use crate::error::ReservationError;

/// Business rules applied by the reservation engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingPolicy {
    #[serde(default = "default_max_active_bookings")]
    pub max_active_bookings: u32,
    /// Admission closes this many hours before the trip starts.
    #[serde(default = "default_booking_cutoff_hours")]
    pub booking_cutoff_hours: i64,
    /// User cancellations close this many days before the trip starts.
    #[serde(default = "default_cancellation_cutoff_days")]
    pub cancellation_cutoff_days: i64,
    /// How long a promoted waiting-list entry keeps its rooms.
    #[serde(default = "default_waitlist_hold_hours")]
    pub waitlist_hold_hours: i64,
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

fn default_max_active_bookings() -> u32 { 3 }
fn default_booking_cutoff_hours() -> i64 { 24 }
fn default_cancellation_cutoff_days() -> i64 { 3 }
fn default_waitlist_hold_hours() -> i64 { 24 }
fn default_max_conflict_retries() -> u32 { 3 }

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            max_active_bookings: default_max_active_bookings(),
            booking_cutoff_hours: default_booking_cutoff_hours(),
            cancellation_cutoff_days: default_cancellation_cutoff_days(),
            waitlist_hold_hours: default_waitlist_hold_hours(),
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

impl BookingPolicy {
    pub fn hold_window(&self) -> Duration {
        Duration::hours(self.waitlist_hold_hours)
    }

    /// Admission step 1: package must be active and far enough from departure.
    pub fn ensure_bookable(&self, package: &Package, now: DateTime<Utc>) -> Result<(), ReservationError> {
        if !package.is_active {
            return Err(ReservationError::PackageUnavailable(format!(
                "package {} is not active",
                package.id
            )));
        }
        if package.time_until_start(now) < Duration::hours(self.booking_cutoff_hours) {
            return Err(ReservationError::PackageUnavailable(format!(
                "package {} starts within {} hours",
                package.id, self.booking_cutoff_hours
            )));
        }
        Ok(())
    }

    /// Admission step 2: `active` is the user's current Pending+Confirmed count.
    pub fn ensure_below_cap(&self, active: u32, requested: u32) -> Result<(), ReservationError> {
        if active.saturating_add(requested) > self.max_active_bookings {
            return Err(ReservationError::BookingLimitExceeded {
                active,
                limit: self.max_active_bookings,
            });
        }
        Ok(())
    }

    /// User-initiated cancellation cutoff. Refunds and payment failures skip it.
    pub fn ensure_cancellable(&self, start_date: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), ReservationError> {
        let days_left = (start_date - now).num_days();
        if days_left < self.cancellation_cutoff_days {
            return Err(ReservationError::CancellationWindowExpired {
                days_left,
                cutoff_days: self.cancellation_cutoff_days,
            });
        }
        Ok(())
    }
}

/// `BK` + UTC timestamp + six random uppercase alphanumerics, e.g. `BK261019143005Q7ZK2M`.
///
/// Uniqueness is enforced by the store, not by this function.
pub fn generate_reference(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("BK{}{}", now.format("%y%m%d%H%M%S"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package_starting_in(duration: Duration) -> Package {
        Package::new("Test Package", 10_000, 5, Utc::now() + duration)
    }

    #[test]
    fn test_booking_cutoff() {
        let policy = BookingPolicy::default();
        let now = Utc::now();

        assert!(policy.ensure_bookable(&package_starting_in(Duration::hours(48)), now).is_ok());
        assert!(matches!(
            policy.ensure_bookable(&package_starting_in(Duration::hours(23)), now),
            Err(ReservationError::PackageUnavailable(_))
        ));
        assert!(matches!(
            policy.ensure_bookable(&package_starting_in(Duration::days(10)).deactivated(), now),
            Err(ReservationError::PackageUnavailable(_))
        ));
    }

    #[test]
    fn test_active_booking_cap() {
        let policy = BookingPolicy::default();
        assert!(policy.ensure_below_cap(2, 1).is_ok());
        assert_eq!(
            policy.ensure_below_cap(3, 1),
            Err(ReservationError::BookingLimitExceeded { active: 3, limit: 3 })
        );
        assert!(policy.ensure_below_cap(2, 2).is_err());
    }

    #[test]
    fn test_cancellation_cutoff() {
        let policy = BookingPolicy::default();
        let now = Utc::now();

        assert!(policy.ensure_cancellable(now + Duration::days(5), now).is_ok());
        assert_eq!(
            policy.ensure_cancellable(now + Duration::days(2), now),
            Err(ReservationError::CancellationWindowExpired { days_left: 2, cutoff_days: 3 })
        );
    }

    #[test]
    fn test_reference_format() {
        let now = Utc::now();
        let reference = generate_reference(now);

        assert_eq!(reference.len(), 2 + 12 + 6);
        assert!(reference.starts_with("BK"));
        assert!(reference[14..].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_ne!(generate_reference(now), generate_reference(now));
    }

    #[test]
    fn test_policy_defaults_from_partial_config() {
        let policy: BookingPolicy = serde_json::from_str(r#"{"max_active_bookings": 5}"#).unwrap();
        assert_eq!(policy.max_active_bookings, 5);
        assert_eq!(policy.cancellation_cutoff_days, 3);
        assert_eq!(policy.hold_window(), Duration::hours(24));
    }
}
