use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use diveops_booking::{
    BookingService, CancellationPolicy, CheckInError, SettlementError, SettlementService,
};
use diveops_domain::{
    BookingRepository, BookingStatus, Excursion, ExcursionRepository, RefundDecision,
    SettlementRepository, SettlementType,
};
use diveops_store::{MemoryEligibility, MemoryStore};

struct Harness {
    store: Arc<MemoryStore>,
    eligibility: Arc<MemoryEligibility>,
    bookings: Arc<BookingService>,
    settlements: Arc<SettlementService>,
    actor: Uuid,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let eligibility = Arc::new(MemoryEligibility::new());
    let bookings = Arc::new(BookingService::new(store.clone(), eligibility.clone()));
    let settlements = Arc::new(SettlementService::new(store.clone()));
    Harness {
        store,
        eligibility,
        bookings,
        settlements,
        actor: Uuid::new_v4(),
    }
}

async fn seed_excursion(store: &MemoryStore) -> Excursion {
    let excursion = Excursion::new(
        Uuid::new_v4(),
        "Morning 2-Tank",
        Utc::now() + Duration::days(1),
        12,
        Decimal::new(15000, 2),
        "USD",
    );
    store.insert_excursion(&excursion).await.unwrap();
    excursion
}

fn full_refund() -> RefundDecision {
    RefundDecision {
        refund_amount: Decimal::new(15000, 2),
        refund_percent: 100,
        original_amount: Decimal::new(15000, 2),
        currency: "USD".to_string(),
        reason: "Full refund - cancelled in time".to_string(),
    }
}

#[tokio::test]
async fn revenue_settlement_records_booking_price() {
    let h = harness();
    let excursion = seed_excursion(&h.store).await;
    let booking = h
        .bookings
        .book(excursion.id, Uuid::new_v4(), h.actor, true)
        .await
        .unwrap();

    let settlement = h
        .settlements
        .create_revenue_settlement(booking.id, h.actor)
        .await
        .unwrap();

    assert_eq!(settlement.booking_id, booking.id);
    assert_eq!(settlement.settlement_type, SettlementType::Revenue);
    assert_eq!(settlement.amount, Decimal::new(15000, 2));
    assert_eq!(settlement.currency, "USD");
    assert_eq!(settlement.processed_by, h.actor);
    assert_eq!(
        h.store.settlements_for_booking(booking.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn revenue_settlement_is_idempotent() {
    let h = harness();
    let excursion = seed_excursion(&h.store).await;
    let booking = h
        .bookings
        .book(excursion.id, Uuid::new_v4(), h.actor, true)
        .await
        .unwrap();

    let first = h
        .settlements
        .create_revenue_settlement(booking.id, h.actor)
        .await
        .unwrap();
    let second = h
        .settlements
        .create_revenue_settlement(booking.id, h.actor)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(
        h.store.settlements_for_booking(booking.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn revenue_settlement_rejects_cancelled_booking() {
    let h = harness();
    let excursion = seed_excursion(&h.store).await;
    let booking = h
        .bookings
        .book(excursion.id, Uuid::new_v4(), h.actor, true)
        .await
        .unwrap();
    h.bookings.cancel(booking.id, h.actor).await.unwrap();

    let err = h
        .settlements
        .create_revenue_settlement(booking.id, h.actor)
        .await
        .unwrap_err();

    assert!(matches!(err, SettlementError::BookingCancelled));
    assert!(err.to_string().contains("booking is cancelled"));
}

#[tokio::test]
async fn revenue_settlement_rejects_missing_price() {
    let h = harness();
    let excursion = seed_excursion(&h.store).await;
    let mut booking = diveops_domain::Booking::new(&excursion, Uuid::new_v4(), h.actor);
    booking.price_amount = None;
    let booking = h.store.insert_active_booking(booking).await.unwrap();

    let err = h
        .settlements
        .create_revenue_settlement(booking.id, h.actor)
        .await
        .unwrap_err();

    assert!(matches!(err, SettlementError::MissingPrice));
    assert!(err.to_string().contains("no price_amount"));
}

#[tokio::test]
async fn refund_settlement_records_decision_amount() {
    let h = harness();
    let excursion = seed_excursion(&h.store).await;
    let booking = h
        .bookings
        .book(excursion.id, Uuid::new_v4(), h.actor, true)
        .await
        .unwrap();
    h.bookings.cancel(booking.id, h.actor).await.unwrap();

    let settlement = h
        .settlements
        .create_refund_settlement(booking.id, &full_refund(), h.actor)
        .await
        .unwrap()
        .expect("non-zero refund should create a record");

    assert_eq!(settlement.settlement_type, SettlementType::Refund);
    assert_eq!(settlement.amount, Decimal::new(15000, 2));
}

#[tokio::test]
async fn refund_settlement_is_idempotent() {
    let h = harness();
    let excursion = seed_excursion(&h.store).await;
    let booking = h
        .bookings
        .book(excursion.id, Uuid::new_v4(), h.actor, true)
        .await
        .unwrap();
    h.bookings.cancel(booking.id, h.actor).await.unwrap();

    let decision = full_refund();
    let first = h
        .settlements
        .create_refund_settlement(booking.id, &decision, h.actor)
        .await
        .unwrap()
        .unwrap();
    let second = h
        .settlements
        .create_refund_settlement(booking.id, &decision, h.actor)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(
        h.store.settlements_for_booking(booking.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn zero_refund_creates_no_record() {
    let h = harness();
    let excursion = seed_excursion(&h.store).await;
    let booking = h
        .bookings
        .book(excursion.id, Uuid::new_v4(), h.actor, true)
        .await
        .unwrap();
    h.bookings.cancel(booking.id, h.actor).await.unwrap();

    let zero = RefundDecision {
        refund_amount: Decimal::ZERO,
        refund_percent: 0,
        original_amount: Decimal::new(15000, 2),
        currency: "USD".to_string(),
        reason: "No refund - cancelled too late".to_string(),
    };

    let result = h
        .settlements
        .create_refund_settlement(booking.id, &zero, h.actor)
        .await
        .unwrap();

    assert!(result.is_none());
    assert!(h
        .store
        .fetch_settlement(booking.id, SettlementType::Refund)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn refund_settlement_rejects_non_cancelled_booking() {
    let h = harness();
    let excursion = seed_excursion(&h.store).await;
    let booking = h
        .bookings
        .book(excursion.id, Uuid::new_v4(), h.actor, true)
        .await
        .unwrap();

    let err = h
        .settlements
        .create_refund_settlement(booking.id, &full_refund(), h.actor)
        .await
        .unwrap_err();

    assert!(matches!(err, SettlementError::NotCancelled));
    assert!(err.to_string().contains("not cancelled"));
}

#[tokio::test]
async fn policy_decision_feeds_refund_settlement() {
    let h = harness();
    let excursion = seed_excursion(&h.store).await;
    let booking = h
        .bookings
        .book(excursion.id, Uuid::new_v4(), h.actor, true)
        .await
        .unwrap();
    let cancelled = h.bookings.cancel(booking.id, h.actor).await.unwrap().booking;

    let policy = CancellationPolicy::default();
    let decision = policy.decide(
        &cancelled,
        &excursion,
        excursion.departure_at - Duration::hours(30),
    );
    assert_eq!(decision.refund_percent, 50);

    let settlement = h
        .settlements
        .create_refund_settlement(booking.id, &decision, h.actor)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settlement.amount, Decimal::new(7500, 2));
}

#[tokio::test]
async fn check_in_creates_roster_entry_and_updates_status() {
    let h = harness();
    let excursion = seed_excursion(&h.store).await;
    let diver = Uuid::new_v4();
    let booking = h.bookings.book(excursion.id, diver, h.actor, true).await.unwrap();

    let entry = h.bookings.check_in(booking.id, h.actor, false).await.unwrap();

    assert_eq!(entry.booking_id, booking.id);
    assert_eq!(entry.diver_id, diver);
    assert_eq!(entry.excursion_id, excursion.id);
    assert_eq!(entry.checked_in_by, h.actor);

    let stored = h.store.fetch_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::CheckedIn);
    assert_eq!(h.store.roster_for_excursion(excursion.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn check_in_rejects_cancelled_booking() {
    let h = harness();
    let excursion = seed_excursion(&h.store).await;
    let booking = h
        .bookings
        .book(excursion.id, Uuid::new_v4(), h.actor, true)
        .await
        .unwrap();
    h.bookings.cancel(booking.id, h.actor).await.unwrap();

    let err = h.bookings.check_in(booking.id, h.actor, false).await.unwrap_err();

    assert!(matches!(err, CheckInError::CancelledBooking));
    assert!(err.to_string().contains("cancelled booking"));
}

#[tokio::test]
async fn check_in_rejects_double_check_in() {
    let h = harness();
    let excursion = seed_excursion(&h.store).await;
    let booking = h
        .bookings
        .book(excursion.id, Uuid::new_v4(), h.actor, true)
        .await
        .unwrap();
    h.bookings.check_in(booking.id, h.actor, false).await.unwrap();

    let err = h.bookings.check_in(booking.id, h.actor, false).await.unwrap_err();

    assert!(matches!(err, CheckInError::AlreadyCheckedIn));
    assert!(err.to_string().contains("already checked in"));
}

#[tokio::test]
async fn check_in_requires_waiver_when_asked() {
    let h = harness();
    let excursion = seed_excursion(&h.store).await;
    let diver = Uuid::new_v4();
    let booking = h.bookings.book(excursion.id, diver, h.actor, true).await.unwrap();

    let err = h.bookings.check_in(booking.id, h.actor, true).await.unwrap_err();
    assert!(matches!(err, CheckInError::WaiverRequired(_)));
    assert!(err.to_string().contains("Waiver agreement"));

    h.eligibility.sign_waiver(diver, Utc::now() + Duration::days(365));
    h.bookings.check_in(booking.id, h.actor, true).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_settlements_create_only_one_record() {
    let h = harness();
    let excursion = seed_excursion(&h.store).await;
    let booking = h
        .bookings
        .book(excursion.id, Uuid::new_v4(), h.actor, true)
        .await
        .unwrap();

    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let mut handles = Vec::new();
    for _ in 0..2 {
        let settlements = h.settlements.clone();
        let barrier = barrier.clone();
        let booking_id = booking.id;
        let actor = h.actor;
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            settlements.create_revenue_settlement(booking_id, actor).await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }

    // Both callers succeed and observe the same record.
    assert_eq!(ids[0], ids[1]);
    assert_eq!(
        h.store.settlements_for_booking(booking.id).await.unwrap().len(),
        1
    );
}
