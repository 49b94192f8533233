mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use mongodb::bson::{oid::ObjectId, DateTime};
use tokio_test::{assert_err, assert_ok};

use common::{outstation_request, start_of_test, TestApp};
use tourdesk_api::db::memory::{MemoryBookingStore, MemoryDirectory};
use tourdesk_api::db::store::{BookingFilter, BookingStore, ResourceDirectory};
use tourdesk_api::errors::BookingError;
use tourdesk_api::models::booking::{
    AdvanceStatusRequest, AssignRequest, Booking, BookingRef, BookingStatus, BookingType,
    CancelRequest,
};
use tourdesk_api::models::directory::{Driver, KycStatus, Reservation, Vehicle};
use tourdesk_api::services::booking_service::BookingService;
use tourdesk_api::services::clock::Clock;
use tourdesk_api::services::events::LogPublisher;

fn reference(code: &str) -> BookingRef {
    BookingRef::Code(code.to_string())
}

fn assignment(driver: ObjectId, vehicle: ObjectId) -> AssignRequest {
    AssignRequest {
        driver_id: driver.to_hex(),
        vehicle_id: vehicle.to_hex(),
    }
}

#[actix_rt::test]
async fn test_missing_or_inactive_customer_is_rejected() {
    let ctx = TestApp::new();
    let service = ctx.service();

    let unknown = ObjectId::new();
    let err = assert_err!(service.create(outstation_request(unknown), None).await);
    assert!(matches!(err, BookingError::NotFound(_)));

    let inactive = ctx.seed_customer(false).await;
    let err = assert_err!(service.create(outstation_request(inactive), None).await);
    match err {
        BookingError::Validation(errors) => {
            assert!(errors.field_errors().contains_key("customer_id"))
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[actix_rt::test]
async fn test_package_tour_requires_active_package() {
    let ctx = TestApp::new();
    let customer = ctx.seed_customer(true).await;
    let retired = ctx.seed_package(false).await;

    let mut request = outstation_request(customer);
    request.booking_type = BookingType::PackageTour;
    request.package_id = Some(retired.to_hex());
    let err = assert_err!(ctx.service().create(request.clone(), None).await);
    assert!(matches!(err, BookingError::Validation(_)));

    let offered = ctx.seed_package(true).await;
    request.package_id = Some(offered.to_hex());
    let booking = assert_ok!(ctx.service().create(request, None).await);
    assert_eq!(booking.package_id, Some(offered));
    assert_eq!(booking.pricing.bracket.as_deref(), Some("100-300km"));
}

#[actix_rt::test]
async fn test_pricing_rejects_more_passengers_than_seats() {
    let ctx = TestApp::new();
    let customer = ctx.seed_customer(true).await;
    let mut request = outstation_request(customer);
    request.passengers.adults = 4;
    request.passengers.children = 1;
    request.passengers.total_count = None;

    let err = assert_err!(ctx.service().create(request, None).await);
    assert!(matches!(err, BookingError::InvalidInput(_)));
}

#[actix_rt::test]
async fn test_assign_checks_driver_and_vehicle_eligibility() {
    let ctx = TestApp::new();
    let customer = ctx.seed_customer(true).await;
    let booking = ctx
        .service()
        .create(outstation_request(customer), None)
        .await
        .unwrap();
    let code = reference(&booking.booking_code);

    let unverified = ctx.seed_driver("Suresh Pai", KycStatus::Pending).await;
    let verified = ctx.seed_driver("Ravi Kumar", KycStatus::Verified).await;
    let sedan = ctx.seed_vehicle("Sedan", 4).await;
    let suv = ctx.seed_vehicle("SUV", 7).await;
    let cramped = ctx.seed_vehicle("Sedan", 2).await;

    for (driver, vehicle) in [(unverified, sedan), (verified, suv), (verified, cramped)] {
        let err = assert_err!(
            ctx.service()
                .assign(&code, assignment(driver, vehicle), None)
                .await
        );
        assert!(
            matches!(err, BookingError::ResourceUnavailable(_)),
            "unexpected {:?}",
            err
        );
    }

    // Nothing was left reserved by the rejected attempts.
    let driver: Driver = ctx.directory.get(verified).await.unwrap().unwrap();
    assert!(driver.reservations.is_empty());

    let err = assert_err!(
        ctx.service()
            .assign(
                &code,
                AssignRequest {
                    driver_id: "driver".to_string(),
                    vehicle_id: "car".to_string(),
                },
                None,
            )
            .await
    );
    match err {
        BookingError::Validation(errors) => assert_eq!(errors.field_errors().len(), 2),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[actix_rt::test]
async fn test_overlapping_assignment_is_all_or_nothing() {
    let mut ctx = TestApp::new();
    let customer = ctx.seed_customer(true).await;
    let first = ctx
        .service()
        .create(outstation_request(customer), None)
        .await
        .unwrap();
    let second = ctx
        .service()
        .create(outstation_request(customer), None)
        .await
        .unwrap();
    let ravi = ctx.seed_driver("Ravi Kumar", KycStatus::Verified).await;
    let imran = ctx.seed_driver("Imran Sheikh", KycStatus::Verified).await;
    let sedan = ctx.seed_vehicle("Sedan", 4).await;

    assert_ok!(
        ctx.service()
            .assign(&reference(&first.booking_code), assignment(ravi, sedan), None)
            .await
    );

    // Same driver, same window.
    let err = assert_err!(
        ctx.service()
            .assign(&reference(&second.booking_code), assignment(ravi, sedan), None)
            .await
    );
    assert!(matches!(err, BookingError::ResourceUnavailable(_)));

    // Free driver but busy vehicle: the driver hold is rolled back.
    let err = assert_err!(
        ctx.service()
            .assign(&reference(&second.booking_code), assignment(imran, sedan), None)
            .await
    );
    assert!(matches!(err, BookingError::ResourceUnavailable(_)));
    let driver: Driver = ctx.directory.get(imran).await.unwrap().unwrap();
    assert!(driver.reservations.is_empty());
    let still_pending = ctx
        .service()
        .get(&reference(&second.booking_code))
        .await
        .unwrap();
    assert_eq!(still_pending.status, BookingStatus::Pending);

    // Completing the first trip frees both resources.
    assert_ok!(
        ctx.service()
            .advance_status(
                &reference(&first.booking_code),
                AdvanceStatusRequest::to(BookingStatus::Completed),
                None,
            )
            .await
    );
    let vehicle: Vehicle = ctx.directory.get(sedan).await.unwrap().unwrap();
    assert!(vehicle.reservations.is_empty());
    assert_ok!(
        ctx.service()
            .assign(&reference(&second.booking_code), assignment(ravi, sedan), None)
            .await
    );

    let transitions: Vec<(Option<BookingStatus>, BookingStatus)> =
        std::iter::from_fn(|| ctx.events.try_recv().ok())
            .map(|e| (e.from_status, e.to_status))
            .collect();
    assert_eq!(
        transitions,
        vec![
            (None, BookingStatus::Pending),
            (None, BookingStatus::Pending),
            (Some(BookingStatus::Pending), BookingStatus::Assigned),
            (Some(BookingStatus::Assigned), BookingStatus::Completed),
            (Some(BookingStatus::Pending), BookingStatus::Assigned),
        ]
    );
}

#[actix_rt::test]
async fn test_state_machine_rejects_illegal_moves() {
    let ctx = TestApp::new();
    let customer = ctx.seed_customer(true).await;
    let booking = ctx
        .service()
        .create(outstation_request(customer), None)
        .await
        .unwrap();
    let code = reference(&booking.booking_code);
    let service = ctx.service();

    for target in [
        BookingStatus::Assigned,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::Pending,
    ] {
        let err = assert_err!(
            service
                .advance_status(&code, AdvanceStatusRequest::to(target), None)
                .await
        );
        assert!(matches!(
            err,
            BookingError::InvalidTransition { from: BookingStatus::Pending, .. }
        ));
    }

    let confirmed = assert_ok!(
        service
            .advance_status(&code, AdvanceStatusRequest::to(BookingStatus::Confirmed), None)
            .await
    );
    let again = assert_ok!(
        service
            .advance_status(&code, AdvanceStatusRequest::to(BookingStatus::Confirmed), None)
            .await
    );
    assert_eq!(again.version, confirmed.version);

    // Cancelling through the status route goes through the fee schedule.
    let mut request = AdvanceStatusRequest::to(BookingStatus::Cancelled);
    request.note = Some("duplicate booking".to_string());
    let cancelled = assert_ok!(service.advance_status(&code, request, None).await);
    let cancellation = cancelled.cancellation.unwrap();
    assert_eq!(cancellation.reason, "duplicate booking");
    assert_eq!(cancellation.fee, 100.0);

    for target in BookingStatus::ALL {
        assert!(service
            .advance_status(&code, AdvanceStatusRequest::to(target), None)
            .await
            .is_err());
    }
    let err = assert_err!(
        service
            .cancel(
                &code,
                CancelRequest {
                    reason: "again".to_string(),
                    refund_amount: None,
                },
                None,
            )
            .await
    );
    assert!(matches!(err, BookingError::InvalidTransition { .. }));
}

#[actix_rt::test]
async fn test_trip_in_progress_cannot_be_cancelled() {
    let ctx = TestApp::new();
    let customer = ctx.seed_customer(true).await;
    let driver = ctx.seed_driver("Ravi Kumar", KycStatus::Verified).await;
    let vehicle = ctx.seed_vehicle("Sedan", 4).await;
    let booking = ctx
        .service()
        .create(outstation_request(customer), None)
        .await
        .unwrap();
    let code = reference(&booking.booking_code);
    let service = ctx.service();

    assert_ok!(service.assign(&code, assignment(driver, vehicle), None).await);
    ctx.clock.advance_minutes(26 * 60);
    let started = assert_ok!(
        service
            .advance_status(&code, AdvanceStatusRequest::to(BookingStatus::InProgress), None)
            .await
    );
    assert_eq!(started.started_at, Some(ctx.clock.now()));

    let err = assert_err!(
        service
            .cancel(
                &code,
                CancelRequest {
                    reason: "no show".to_string(),
                    refund_amount: None,
                },
                None,
            )
            .await
    );
    assert!(matches!(
        err,
        BookingError::InvalidTransition { from: BookingStatus::InProgress, to: BookingStatus::Cancelled }
    ));

    let explicit = Utc.with_ymd_and_hms(2026, 11, 2, 13, 0, 0).unwrap();
    let mut request = AdvanceStatusRequest::to(BookingStatus::Completed);
    request.completed_at = Some(explicit);
    let completed = assert_ok!(service.advance_status(&code, request, None).await);
    assert_eq!(completed.completed_at, Some(DateTime::from_chrono(explicit)));
    assert_eq!(completed.end_time, Some(DateTime::from_chrono(explicit)));
    assert_eq!(completed.status_history.len(), 4);
}

#[actix_rt::test]
async fn test_cancellation_fee_grows_toward_pickup() {
    let ctx = TestApp::new();
    let customer = ctx.seed_customer(true).await;
    let service = ctx.service();
    let pickup = start_of_test().timestamp_millis() + 26 * 60 * 60_000;

    let mut fees = Vec::new();
    // 2 hours, 45 minutes and 10 minutes before pickup, then after it.
    for minutes_before in [120, 45, 10, -15] {
        let booking = service
            .create(outstation_request(customer), None)
            .await
            .unwrap();
        ctx.clock
            .set(DateTime::from_millis(pickup - minutes_before * 60_000));
        let cancelled = service
            .cancel(
                &reference(&booking.booking_code),
                CancelRequest {
                    reason: "plans changed".to_string(),
                    refund_amount: None,
                },
                None,
            )
            .await
            .unwrap();
        let cancellation = cancelled.cancellation.unwrap();
        assert_eq!(cancellation.refund_amount, 2700.0 - cancellation.fee);
        fees.push(cancellation.fee);
        ctx.clock.set(start_of_test());
    }
    assert_eq!(fees, vec![100.0, 200.0, 300.0, 300.0]);
}

#[actix_rt::test]
async fn test_stale_copies_cannot_overwrite() {
    let ctx = TestApp::new();
    let customer = ctx.seed_customer(true).await;
    let booking = ctx
        .service()
        .create(outstation_request(customer), None)
        .await
        .unwrap();
    let stale = ctx
        .store
        .find_by_code(&booking.booking_code)
        .await
        .unwrap()
        .unwrap();

    assert_ok!(
        ctx.service()
            .advance_status(
                &reference(&booking.booking_code),
                AdvanceStatusRequest::to(BookingStatus::Confirmed),
                None,
            )
            .await
    );

    let mut overwrite = stale.clone();
    overwrite.special_requests = Some("child seat".to_string());
    overwrite.version += 1;
    assert!(!ctx.store.replace_if_unchanged(&stale, &overwrite).await.unwrap());
    let current = ctx.store.find_by_code(&booking.booking_code).await.unwrap().unwrap();
    assert_eq!(current.status, BookingStatus::Confirmed);
    assert_eq!(current.special_requests, None);
}

#[actix_rt::test]
async fn test_repair_fills_gaps_without_overwriting() {
    let ctx = TestApp::new();
    let customer = ctx.seed_customer(true).await;
    let template = ctx
        .service()
        .create(outstation_request(customer), None)
        .await
        .unwrap();
    let modified = DateTime::from_chrono(Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap());
    let finished = DateTime::from_chrono(Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap());

    let mut by_update = template.clone();
    by_update.id = None;
    by_update.booking_code = "TB-20250304-UPDAT".to_string();
    by_update.status = BookingStatus::Completed;
    by_update.updated_at = Some(modified);
    ctx.store.seed(by_update);

    let mut end_only = template.clone();
    end_only.id = None;
    end_only.booking_code = "TB-20250304-ENDTM".to_string();
    end_only.status = BookingStatus::Completed;
    end_only.end_time = Some(finished);
    end_only.updated_at = Some(modified);
    ctx.store.seed(end_only);

    let mut untouched = template.clone();
    untouched.id = None;
    untouched.booking_code = "TB-20250304-DONE1".to_string();
    untouched.status = BookingStatus::Completed;
    untouched.completed_at = Some(finished);
    untouched.end_time = Some(finished);
    ctx.store.seed(untouched);

    let mut no_dates = template;
    no_dates.id = None;
    no_dates.booking_code = "TB-20250304-NOW00".to_string();
    no_dates.status = BookingStatus::Completed;
    no_dates.updated_at = None;
    ctx.store.seed(no_dates);

    let report = ctx.service().repair_completion().await.unwrap();
    assert_eq!(report.scanned, 4);
    assert_eq!(report.repaired.len(), 3);
    assert!(report.skipped.is_empty());

    let fetch = |code: &'static str| {
        let store = ctx.store.clone();
        async move { store.find_by_code(code).await.unwrap().unwrap() }
    };
    let repaired = fetch("TB-20250304-UPDAT").await;
    assert_eq!(repaired.completed_at, Some(modified));
    assert_eq!(repaired.end_time, Some(modified));

    let repaired = fetch("TB-20250304-ENDTM").await;
    assert_eq!(repaired.completed_at, Some(finished));
    assert_eq!(repaired.end_time, Some(finished));

    let repaired = fetch("TB-20250304-NOW00").await;
    assert_eq!(repaired.completed_at, Some(start_of_test()));

    let untouched = fetch("TB-20250304-DONE1").await;
    assert_eq!(untouched.version, 0);

    // A second pass has nothing left to do.
    let report = ctx.service().repair_completion().await.unwrap();
    assert!(report.repaired.is_empty());
}

/// Lets a rival assignment of the same booking commit just before the
/// wrapped call's compare-and-swap.
#[derive(Clone)]
struct RivalAssignStore {
    inner: MemoryBookingStore,
    directory: MemoryDirectory,
    driver: ObjectId,
    vehicle: ObjectId,
    fired: Arc<AtomicBool>,
}

impl BookingStore for RivalAssignStore {
    async fn insert(&self, booking: &Booking) -> Result<ObjectId, BookingError> {
        self.inner.insert(booking).await
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<Booking>, BookingError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Booking>, BookingError> {
        self.inner.find_by_code(code).await
    }

    async fn replace_if_unchanged(
        &self,
        expected: &Booking,
        updated: &Booking,
    ) -> Result<bool, BookingError> {
        if updated.status == BookingStatus::Assigned && !self.fired.swap(true, Ordering::SeqCst) {
            let id = expected.id.unwrap();
            let mut rival = expected.clone();
            rival.driver_id = Some(self.driver);
            rival.vehicle_id = Some(self.vehicle);
            rival.transition(BookingStatus::Assigned, start_of_test(), Some("rival".into()), None);
            let hold = Reservation::for_booking(&rival, id);
            assert!(self.directory.reserve::<Driver>(self.driver, &hold).await?);
            assert!(self.directory.reserve::<Vehicle>(self.vehicle, &hold).await?);
            assert!(self.inner.replace_if_unchanged(expected, &rival).await?);
        }
        self.inner.replace_if_unchanged(expected, updated).await
    }

    async fn query(&self, filter: &BookingFilter) -> Result<Vec<Booking>, BookingError> {
        self.inner.query(filter).await
    }

    async fn ping(&self) -> Result<(), BookingError> {
        self.inner.ping().await
    }
}

#[actix_rt::test]
async fn test_losing_assignment_keeps_the_winners_holds() {
    let ctx = TestApp::new();
    let customer = ctx.seed_customer(true).await;
    let driver = ctx.seed_driver("Ravi Kumar", KycStatus::Verified).await;
    let vehicle = ctx.seed_vehicle("Sedan", 4).await;
    let booking = ctx
        .service()
        .create(outstation_request(customer), None)
        .await
        .unwrap();

    let clock: Arc<dyn Clock> = ctx.clock.clone();
    let racing = BookingService::new(
        RivalAssignStore {
            inner: ctx.store.clone(),
            directory: ctx.directory.clone(),
            driver,
            vehicle,
            fired: Arc::new(AtomicBool::new(false)),
        },
        ctx.directory.clone(),
        ctx.service().catalog().clone(),
        Arc::new(LogPublisher),
        clock,
    );

    let err = assert_err!(
        racing
            .assign(&reference(&booking.booking_code), assignment(driver, vehicle), None)
            .await
    );
    assert!(matches!(err, BookingError::ResourceUnavailable(_)));

    let stored = ctx.store.find_by_code(&booking.booking_code).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Assigned);
    assert_eq!(stored.driver_id, Some(driver));

    let held_driver: Driver = ctx.directory.get(driver).await.unwrap().unwrap();
    let held_vehicle: Vehicle = ctx.directory.get(vehicle).await.unwrap().unwrap();
    assert_eq!(held_driver.reservations.len(), 1);
    assert_eq!(held_vehicle.reservations.len(), 1);
    assert_eq!(held_driver.reservations[0].booking_id, stored.id.unwrap());

    // The surviving holds still block an overlapping trip.
    let other = ctx
        .service()
        .create(outstation_request(customer), None)
        .await
        .unwrap();
    let err = assert_err!(
        ctx.service()
            .assign(&reference(&other.booking_code), assignment(driver, vehicle), None)
            .await
    );
    assert!(matches!(err, BookingError::ResourceUnavailable(_)));
}
