use std::sync::Arc;

use chrono::Duration;
use log::{debug, error, info, warn};
use mongodb::bson::{oid::ObjectId, DateTime};
use rand::{distributions::Alphanumeric, Rng};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::db::store::{BookingFilter, BookingStore, ResourceDirectory};
use crate::errors::BookingError;
use crate::models::booking::{
    violation, AdvanceStatusRequest, AssignRequest, Booking, BookingEvent, BookingRef,
    BookingRequest, BookingStatus, CancelRequest, Cancellation, FareBreakdown, Passengers,
    QuoteRequest, RepairReport, StatusChange, ValidatedBooking,
};
use crate::models::directory::{Customer, Driver, KycStatus, Package, Reservation, Vehicle};
use crate::models::fleet::PricingCatalog;
use crate::services::clock::Clock;
use crate::services::events::EventPublisher;
use crate::services::pricing_service::{PricingInput, PricingService};

const CODE_ATTEMPTS: usize = 5;

pub fn generate_booking_code(now: DateTime, utc_offset_minutes: i32) -> String {
    let local = now.to_chrono() + Duration::minutes(utc_offset_minutes as i64);
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(char::from)
        .collect();
    format!("TB-{}-{}", local.format("%Y%m%d"), suffix.to_uppercase())
}

fn parse_reference(errors: &mut ValidationErrors, field: &'static str, raw: &str) -> Option<ObjectId> {
    let parsed = ObjectId::parse_str(raw.trim()).ok();
    if parsed.is_none() {
        errors.add(field, violation("object_id", "not a valid id"));
    }
    parsed
}

/// Owns the booking state machine: creation, resource assignment, status
/// changes, cancellation and completion repair.
pub struct BookingService<S, D> {
    store: S,
    directory: D,
    catalog: Arc<PricingCatalog>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl<S: BookingStore, D: ResourceDirectory> BookingService<S, D> {
    pub fn new(
        store: S,
        directory: D,
        catalog: Arc<PricingCatalog>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            catalog,
            events,
            clock,
        }
    }

    pub fn catalog(&self) -> &Arc<PricingCatalog> {
        &self.catalog
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn quote(&self, request: &QuoteRequest) -> Result<FareBreakdown, BookingError> {
        request.validate()?;
        let (night, peak) = match request.pickup_time {
            Some(pickup) => PricingService::time_flags(&self.catalog, DateTime::from_chrono(pickup)),
            None => (false, false),
        };
        let passengers = &request.passengers;
        let input = PricingInput {
            distance_km: request.distance_km,
            duration_hours: request.duration_hours,
            booking_type: request.booking_type,
            trip_type: request.trip_type,
            is_night_trip: request.is_night_trip.unwrap_or(night),
            is_peak_hour: request.is_peak_hour.unwrap_or(peak),
            passengers: Passengers::new(
                passengers.adults.max(1),
                passengers.children,
                passengers.infants,
            ),
        };
        PricingService::quote(&self.catalog, &request.vehicle_category, &input)
    }

    pub async fn get(&self, reference: &BookingRef) -> Result<Booking, BookingError> {
        let found = match reference {
            BookingRef::Id(id) => self.store.find_by_id(*id).await?,
            BookingRef::Code(code) => self.store.find_by_code(code).await?,
        };
        found.ok_or_else(|| BookingError::NotFound(format!("booking {}", reference)))
    }

    pub async fn list(&self, filter: &BookingFilter) -> Result<Vec<Booking>, BookingError> {
        self.store.query(filter).await
    }

    pub async fn create(
        &self,
        request: BookingRequest,
        actor: Option<String>,
    ) -> Result<Booking, BookingError> {
        let ValidatedBooking {
            customer_id,
            package_id,
            schedule,
            passengers,
            duration_hours,
            request,
        } = request.into_validated()?;

        let customer: Customer = self
            .directory
            .get(customer_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("customer {}", customer_id)))?;
        let mut errors = ValidationErrors::new();
        if !customer.is_active {
            errors.add("customer_id", violation("inactive", "customer account is inactive"));
        }
        if let Some(package_id) = package_id {
            let package: Package = self
                .directory
                .get(package_id)
                .await?
                .ok_or_else(|| BookingError::NotFound(format!("package {}", package_id)))?;
            if !package.is_active {
                errors.add("package_id", violation("inactive", "package is no longer offered"));
            }
        }
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let (night, peak) = PricingService::time_flags(&self.catalog, schedule.start_time);
        let input = PricingInput {
            distance_km: request.distance_km,
            duration_hours,
            booking_type: request.booking_type,
            trip_type: request.trip_type,
            is_night_trip: request.is_night_trip.unwrap_or(night),
            is_peak_hour: request.is_peak_hour.unwrap_or(peak),
            passengers,
        };
        let pricing = PricingService::quote(&self.catalog, &request.vehicle_category, &input)?;

        let now = self.clock.now();
        let mut booking = Booking {
            id: None,
            booking_code: String::new(),
            customer_id,
            booking_type: request.booking_type,
            trip_type: request.trip_type,
            pickup_address: request.pickup_address.trim().to_string(),
            dropoff_address: request
                .dropoff_address
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            stops: request
                .stops
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            schedule,
            passengers,
            distance_km: request.distance_km,
            duration_hours,
            pricing,
            special_requests: request.special_requests.filter(|s| !s.trim().is_empty()),
            package_id,
            driver_id: None,
            vehicle_id: None,
            status: BookingStatus::Pending,
            status_history: vec![StatusChange {
                from: None,
                to: BookingStatus::Pending,
                at: now,
                changed_by: actor,
                note: None,
            }],
            cancellation: None,
            started_at: None,
            completed_at: None,
            end_time: None,
            version: 0,
            created_at: now,
            updated_at: Some(now),
        };

        let mut attempts = 0;
        let id = loop {
            booking.booking_code = generate_booking_code(now, self.catalog.utc_offset_minutes);
            match self.store.insert(&booking).await {
                Ok(id) => break id,
                Err(BookingError::Conflict(_)) if attempts + 1 < CODE_ATTEMPTS => {
                    attempts += 1;
                    warn!("Booking code {} collided, retrying", booking.booking_code);
                }
                Err(err) => return Err(err),
            }
        };
        booking.id = Some(id);

        info!(
            "Created booking {} for customer {} ({} {})",
            booking.booking_code, customer_id, booking.pricing.vehicle_category, booking.pricing.total
        );
        self.publish(&booking, None, now);
        Ok(booking)
    }

    /// Puts a driver and vehicle on a Pending or Confirmed booking.
    ///
    /// Both resources are reserved with conditional updates before the
    /// booking itself is swapped; any later failure releases them again.
    pub async fn assign(
        &self,
        reference: &BookingRef,
        request: AssignRequest,
        actor: Option<String>,
    ) -> Result<Booking, BookingError> {
        let mut errors = ValidationErrors::new();
        let driver_id = parse_reference(&mut errors, "driver_id", &request.driver_id);
        let vehicle_id = parse_reference(&mut errors, "vehicle_id", &request.vehicle_id);
        let (Some(driver_id), Some(vehicle_id)) = (driver_id, vehicle_id) else {
            return Err(errors.into());
        };

        let booking = self.get(reference).await?;
        let booking_id = stored_id(&booking)?;
        if !matches!(booking.status, BookingStatus::Pending | BookingStatus::Confirmed) {
            warn!(
                "Rejected assignment of {} in status {}",
                booking.booking_code, booking.status
            );
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Assigned,
            });
        }

        let driver: Driver = self
            .directory
            .get(driver_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("driver {}", driver_id)))?;
        if !driver.is_active {
            return Err(BookingError::ResourceUnavailable(format!(
                "driver {} is inactive",
                driver.name
            )));
        }
        if driver.kyc_status != KycStatus::Verified {
            return Err(BookingError::ResourceUnavailable(format!(
                "driver {} has not passed KYC verification",
                driver.name
            )));
        }

        let vehicle: Vehicle = self
            .directory
            .get(vehicle_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("vehicle {}", vehicle_id)))?;
        if !vehicle.is_active {
            return Err(BookingError::ResourceUnavailable(format!(
                "vehicle {} is inactive",
                vehicle.registration_number
            )));
        }
        if !vehicle
            .category
            .eq_ignore_ascii_case(&booking.pricing.vehicle_category)
        {
            return Err(BookingError::ResourceUnavailable(format!(
                "vehicle {} is a {}, booking was priced for a {}",
                vehicle.registration_number, vehicle.category, booking.pricing.vehicle_category
            )));
        }
        if vehicle.seating_capacity < booking.passengers.seated() {
            return Err(BookingError::ResourceUnavailable(format!(
                "vehicle {} seats {}, booking has {} passengers",
                vehicle.registration_number,
                vehicle.seating_capacity,
                booking.passengers.seated()
            )));
        }

        let reservation = Reservation::for_booking(&booking, booking_id);
        if !self
            .directory
            .reserve::<Driver>(driver_id, &reservation)
            .await?
        {
            return Err(BookingError::ResourceUnavailable(format!(
                "driver {} is already assigned to an overlapping trip",
                driver.name
            )));
        }
        let vehicle_reserved = match self
            .directory
            .reserve::<Vehicle>(vehicle_id, &reservation)
            .await
        {
            Ok(reserved) => reserved,
            Err(err) => {
                self.release_holds(&reservation, Some(driver_id), None).await;
                return Err(err);
            }
        };
        if !vehicle_reserved {
            self.release_holds(&reservation, Some(driver_id), None).await;
            return Err(BookingError::ResourceUnavailable(format!(
                "vehicle {} is already assigned to an overlapping trip",
                vehicle.registration_number
            )));
        }

        let now = self.clock.now();
        let mut updated = booking.clone();
        updated.driver_id = Some(driver_id);
        updated.vehicle_id = Some(vehicle_id);
        updated.transition(BookingStatus::Assigned, now, actor, None);

        match self.store.replace_if_unchanged(&booking, &updated).await {
            Ok(true) => {}
            Ok(false) => {
                self.release_holds(&reservation, Some(driver_id), Some(vehicle_id))
                    .await;
                warn!(
                    "Booking {} changed while assigning, assignment dropped",
                    booking.booking_code
                );
                return Err(BookingError::ResourceUnavailable(
                    "booking was modified concurrently; reload and retry".to_string(),
                ));
            }
            Err(err) => {
                self.release_holds(&reservation, Some(driver_id), Some(vehicle_id))
                    .await;
                return Err(err);
            }
        }

        info!(
            "Assigned driver {} and vehicle {} to booking {}",
            driver.name, vehicle.registration_number, updated.booking_code
        );
        self.publish(&updated, Some(booking.status), now);
        Ok(updated)
    }

    /// Moves a booking along the state machine.
    ///
    /// `Assigned` is only reachable through [`Self::assign`] and `Cancelled`
    /// is handed to [`Self::cancel`]. Repeating the current status of a
    /// Confirmed, InProgress or Completed booking is a no-op.
    pub async fn advance_status(
        &self,
        reference: &BookingRef,
        request: AdvanceStatusRequest,
        actor: Option<String>,
    ) -> Result<Booking, BookingError> {
        let target = request.status;
        if target == BookingStatus::Cancelled {
            let cancel = CancelRequest {
                reason: request
                    .note
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| "cancelled by operator".to_string()),
                refund_amount: None,
            };
            return self.cancel(reference, cancel, actor).await;
        }

        let booking = self.get(reference).await?;
        if booking.status == target
            && matches!(
                target,
                BookingStatus::Confirmed | BookingStatus::InProgress | BookingStatus::Completed
            )
        {
            debug!("Booking {} already {}", booking.booking_code, target);
            return Ok(booking);
        }
        if target == BookingStatus::Assigned || !booking.status.can_transition_to(target) {
            warn!(
                "Rejected transition of {} from {} to {}",
                booking.booking_code, booking.status, target
            );
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to: target,
            });
        }

        let now = self.clock.now();
        let mut updated = booking.clone();
        match target {
            BookingStatus::InProgress => {
                updated.started_at = Some(booking.started_at.unwrap_or(now));
            }
            BookingStatus::Completed => {
                let completed_at = request
                    .completed_at
                    .map(DateTime::from_chrono)
                    .or(booking.completed_at)
                    .unwrap_or(now);
                let end_time = request
                    .end_time
                    .map(DateTime::from_chrono)
                    .or(booking.end_time)
                    .unwrap_or(completed_at);
                updated.completed_at = Some(completed_at);
                updated.end_time = Some(end_time);
            }
            _ => {}
        }
        updated.transition(target, now, actor, request.note);

        if !self.store.replace_if_unchanged(&booking, &updated).await? {
            return Err(BookingError::Conflict(format!(
                "booking {} was modified concurrently; reload and retry",
                booking.booking_code
            )));
        }

        if target == BookingStatus::Completed {
            if let Some(id) = updated.id {
                self.release_resources(id, updated.driver_id, updated.vehicle_id)
                    .await;
            }
        }

        info!(
            "Booking {} moved from {} to {}",
            updated.booking_code, booking.status, target
        );
        self.publish(&updated, Some(booking.status), now);
        Ok(updated)
    }

    /// Cancels a booking that has not started yet.
    ///
    /// Without an explicit refund the category's cancellation schedule sets
    /// the fee and the rest of the fare is refunded.
    pub async fn cancel(
        &self,
        reference: &BookingRef,
        request: CancelRequest,
        actor: Option<String>,
    ) -> Result<Booking, BookingError> {
        let mut errors = ValidationErrors::new();
        if request.reason.trim().is_empty() {
            errors.add("reason", violation("required", "a cancellation reason is required"));
        }
        if let Some(refund) = request.refund_amount {
            if !refund.is_finite() || refund < 0.0 {
                errors.add("refund_amount", violation("range", "refund must not be negative"));
            }
        }
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let booking = self.get(reference).await?;
        if !matches!(
            booking.status,
            BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::Assigned
        ) {
            warn!(
                "Rejected cancellation of {} in status {}",
                booking.booking_code, booking.status
            );
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Cancelled,
            });
        }

        let total = booking.pricing.total;
        let now = self.clock.now();
        let (tier, fee, refund_amount) = match request.refund_amount {
            Some(refund) if refund > total => {
                let mut errors = ValidationErrors::new();
                errors.add(
                    "refund_amount",
                    violation("range", "refund cannot exceed the booking total"),
                );
                return Err(errors.into());
            }
            Some(refund) => (None, total - refund, refund),
            None => {
                let category = self
                    .catalog
                    .category(&booking.pricing.vehicle_category)
                    .ok_or_else(|| {
                        BookingError::InvalidCategory(booking.pricing.vehicle_category.clone())
                    })?;
                let charge =
                    PricingService::cancellation_fee(category, booking.minutes_before_pickup(now));
                let fee = charge.fee.min(total);
                (Some(charge.label), fee, total - fee)
            }
        };

        let mut updated = booking.clone();
        updated.cancellation = Some(Cancellation {
            reason: request.reason.trim().to_string(),
            tier,
            fee,
            refund_amount,
            cancelled_at: now,
            cancelled_by: actor.clone(),
        });
        updated.transition(BookingStatus::Cancelled, now, actor, None);

        if !self.store.replace_if_unchanged(&booking, &updated).await? {
            return Err(BookingError::Conflict(format!(
                "booking {} was modified concurrently; reload and retry",
                booking.booking_code
            )));
        }
        if let Some(id) = updated.id {
            self.release_resources(id, updated.driver_id, updated.vehicle_id)
                .await;
        }

        info!(
            "Cancelled booking {} (fee {}, refund {})",
            updated.booking_code, fee, refund_amount
        );
        self.publish(&updated, Some(booking.status), now);
        Ok(updated)
    }

    /// Fills `completed_at`/`end_time` on Completed bookings that predate
    /// completion stamping. Existing values are never replaced.
    pub async fn repair_completion(&self) -> Result<RepairReport, BookingError> {
        let completed = self
            .store
            .query(&BookingFilter::with_status(BookingStatus::Completed))
            .await?;
        let now = self.clock.now();
        let mut report = RepairReport {
            scanned: completed.len(),
            ..Default::default()
        };

        for booking in completed
            .into_iter()
            .filter(|b| b.completed_at.is_none() || b.end_time.is_none())
        {
            // Explicit completion time, else last modification, else now.
            let completed_at = booking
                .completed_at
                .or(booking.end_time)
                .or(booking.updated_at)
                .unwrap_or(now);
            let mut updated = booking.clone();
            updated.completed_at = Some(completed_at);
            updated.end_time = Some(booking.end_time.unwrap_or(completed_at));
            updated.version += 1;
            updated.updated_at = Some(now);

            if self.store.replace_if_unchanged(&booking, &updated).await? {
                report.repaired.push(booking.booking_code);
            } else {
                report.skipped.push(booking.booking_code);
            }
        }

        info!(
            "Completion repair scanned {} bookings, repaired {}, skipped {}",
            report.scanned,
            report.repaired.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    async fn release_resources(
        &self,
        booking_id: ObjectId,
        driver_id: Option<ObjectId>,
        vehicle_id: Option<ObjectId>,
    ) {
        if let Some(id) = driver_id {
            if let Err(err) = self.directory.release::<Driver>(id, booking_id).await {
                error!("Failed to release driver {} from {}: {}", id, booking_id, err);
            }
        }
        if let Some(id) = vehicle_id {
            if let Err(err) = self.directory.release::<Vehicle>(id, booking_id).await {
                error!("Failed to release vehicle {} from {}: {}", id, booking_id, err);
            }
        }
    }

    /// Rolls back one assignment attempt without touching holds that a
    /// concurrent attempt on the same booking may have committed.
    async fn release_holds(
        &self,
        reservation: &Reservation,
        driver_id: Option<ObjectId>,
        vehicle_id: Option<ObjectId>,
    ) {
        let hold = reservation.hold_id.as_str();
        if let Some(id) = driver_id {
            if let Err(err) = self.directory.release_hold::<Driver>(id, hold).await {
                error!("Failed to roll back driver hold {} on {}: {}", hold, id, err);
            }
        }
        if let Some(id) = vehicle_id {
            if let Err(err) = self.directory.release_hold::<Vehicle>(id, hold).await {
                error!("Failed to roll back vehicle hold {} on {}: {}", hold, id, err);
            }
        }
    }

    fn publish(&self, booking: &Booking, from: Option<BookingStatus>, at: DateTime) {
        let Some(booking_id) = booking.id else {
            return;
        };
        self.events.publish(&BookingEvent {
            event_id: Uuid::new_v4(),
            booking_id,
            booking_code: booking.booking_code.clone(),
            from_status: from,
            to_status: booking.status,
            timestamp: at,
        });
    }
}

fn stored_id(booking: &Booking) -> Result<ObjectId, BookingError> {
    booking
        .id
        .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking.booking_code)))
}
