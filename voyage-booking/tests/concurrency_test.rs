//! Concurrency stress tests for the ledger and the per-user cap.
//!
//! Every test fires many admissions at once through spawned tasks and then checks the
//! ledger against the bookings that actually exist.

mod common;

use async_trait::async_trait;
use chrono::Duration;
use common::{card, Harness, APPROVED_CARD};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;
use voyage_booking::{BookingPolicy, BookingStatus, CartLine, PaymentStatus, ReservationError, ReservationStore};
use voyage_core::{
    AuthorizationDecision, AuthorizationRequest, CoreResult, MockPaymentAuthorizer, PaymentAuthorizer,
    PaymentInstrument,
};

/// Counts authorizer calls and stalls each one so concurrent callers overlap.
#[derive(Default)]
struct CountingAuthorizer {
    calls: AtomicUsize,
}

#[async_trait]
impl PaymentAuthorizer for CountingAuthorizer {
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
        instrument: &PaymentInstrument,
    ) -> CoreResult<AuthorizationDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        MockPaymentAuthorizer.authorize(request, instrument).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_room_race_has_one_winner() {
    let harness = Arc::new(Harness::new());
    let package = harness.package(1, Duration::days(10)).await;

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let harness = harness.clone();
            tokio::spawn(async move {
                harness
                    .coordinator
                    .create_booking(Uuid::new_v4(), package.id, 1, 1)
                    .await
            })
        })
        .collect();

    let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let fully_booked = results
        .iter()
        .filter(|r| matches!(r, Err(ReservationError::FullyBooked(_))))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(fully_booked, 49);
    assert_eq!(harness.available_rooms(package.id).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_oversell_under_mixed_create_and_cancel() {
    let harness = Arc::new(Harness::new());
    let capacity = 10;
    let package = harness.package(capacity, Duration::days(30)).await;

    let tasks: Vec<_> = (0..60)
        .map(|i| {
            let harness = harness.clone();
            tokio::spawn(async move {
                let rooms = (i % 3) + 1;
                let booking = harness
                    .coordinator
                    .create_booking(Uuid::new_v4(), package.id, rooms, rooms)
                    .await;
                if let Ok(booking) = booking {
                    if i % 2 == 0 {
                        harness.coordinator.cancel_booking(booking.id, None).await.unwrap();
                    }
                }
            })
        })
        .collect();
    for task in join_all(tasks).await {
        task.unwrap();
    }

    // Sum of live rooms plus what is left must equal capacity
    let mut live_rooms = 0;
    for user_bookings in collect_all_bookings(&harness).await {
        live_rooms += user_bookings;
    }
    let available = harness.available_rooms(package.id).await;
    assert!(live_rooms <= capacity);
    assert_eq!(live_rooms + available, capacity);
}

/// Rooms held by live bookings on every package in the harness.
async fn collect_all_bookings(harness: &Harness) -> Vec<u32> {
    let mut rooms = Vec::new();
    for booking in harness.store.all_bookings().await {
        if booking.is_live() {
            rooms.push(booking.number_of_rooms);
        }
    }
    rooms
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cap_holds_under_concurrent_checkouts() {
    let harness = Arc::new(Harness::new());
    let user = Uuid::new_v4();

    let mut carts = Vec::new();
    for _ in 0..4 {
        let mut cart = Vec::new();
        for _ in 0..2 {
            let package = harness.package(5, Duration::days(10)).await;
            cart.push(CartLine {
                package_id: package.id,
                rooms: 1,
                guests: 1,
            });
        }
        carts.push(cart);
    }

    let tasks: Vec<_> = carts
        .into_iter()
        .map(|cart| {
            let harness = harness.clone();
            tokio::spawn(async move { harness.checkout.checkout(user, &cart, "CARD").await })
        })
        .collect();
    for task in join_all(tasks).await {
        // Individual checkouts may be rejected outright; the cap is what matters.
        let _ = task.unwrap();
    }

    let active = harness.store.count_active_bookings(user).await.unwrap();
    assert!(active <= 3, "user holds {active} active bookings");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queue_stays_contiguous_under_concurrent_join_and_leave() {
    let harness = Arc::new(Harness::new());
    let package = harness.package(1, Duration::days(10)).await;
    let users: Vec<Uuid> = (0..40).map(|_| Uuid::new_v4()).collect();

    let joins: Vec<_> = users
        .iter()
        .copied()
        .map(|user| {
            let harness = harness.clone();
            tokio::spawn(async move { harness.coordinator.join_waiting_list(user, package.id, 1).await })
        })
        .collect();
    for task in join_all(joins).await {
        task.unwrap().unwrap();
    }

    let leaves: Vec<_> = users
        .iter()
        .copied()
        .step_by(3)
        .map(|user| {
            let harness = harness.clone();
            tokio::spawn(async move { harness.coordinator.leave_waiting_list(user, package.id).await })
        })
        .collect();
    for task in join_all(leaves).await {
        assert!(task.unwrap().unwrap());
    }

    let queue = harness.store.waiting_list(package.id).await.unwrap();
    let positions: Vec<u32> = queue.entries().iter().map(|e| e.position).collect();
    let expected: Vec<u32> = (1..=queue.len() as u32).collect();
    assert_eq!(positions, expected);
    assert_eq!(queue.len(), 40 - users.iter().step_by(3).count());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_processing_authorizes_once() {
    let authorizer = Arc::new(CountingAuthorizer::default());
    let harness = Harness::with_authorizer(BookingPolicy::default(), authorizer.clone());
    let user = Uuid::new_v4();
    let package = harness.package(2, Duration::days(10)).await;
    let booking = harness.coordinator.create_booking(user, package.id, 1, 1).await.unwrap();
    let payment = harness
        .payments
        .initiate_payment(user, vec![booking.id], "CARD")
        .await
        .unwrap();

    let instrument = card(APPROVED_CARD);
    let (first, second) = tokio::join!(
        harness.payments.process_payment(payment.id, &instrument),
        harness.payments.process_payment(payment.id, &instrument),
    );

    assert_eq!(authorizer.calls.load(Ordering::SeqCst), 1);
    let (won, lost) = if first.is_ok() { (first, second) } else { (second, first) };
    let completed = won.unwrap();
    assert_eq!(completed.status, PaymentStatus::Completed);
    assert!(matches!(lost, Err(ReservationError::InvalidStateTransition { .. })));

    let stored = harness.payments.get_payment(payment.id).await.unwrap();
    assert_eq!(stored.transaction_id, completed.transaction_id);
    assert_eq!(
        harness.coordinator.get_booking(booking.id).await.unwrap().status,
        BookingStatus::Confirmed
    );
}
