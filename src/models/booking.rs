use std::borrow::Cow;
use std::fmt;

use chrono::Utc;
use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

/// Longest trip a booking or reservation may span.
pub const MAX_TRIP_HOURS: f64 = 720.0;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 6] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Assigned,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Assigned => "assigned",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn can_transition_to(&self, target: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, target),
            (Pending, Confirmed)
                | (Pending, Assigned)
                | (Pending, Cancelled)
                | (Confirmed, Assigned)
                | (Confirmed, Cancelled)
                | (Assigned, InProgress)
                | (Assigned, Completed)
                | (Assigned, Cancelled)
                | (InProgress, Completed)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BookingType {
    CityRide,
    Outstation,
    PackageTour,
    AirportTransfer,
}

impl BookingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingType::CityRide => "city_ride",
            BookingType::Outstation => "outstation",
            BookingType::PackageTour => "package_tour",
            BookingType::AirportTransfer => "airport_transfer",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TripType {
    #[default]
    OneWay,
    RoundTrip,
    MultiCity,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct Passengers {
    pub adults: u32,
    pub children: u32,
    pub infants: u32,
    pub total_count: u32,
}

impl Passengers {
    pub fn new(adults: u32, children: u32, infants: u32) -> Self {
        Self {
            adults,
            children,
            infants,
            total_count: adults.saturating_add(children).saturating_add(infants),
        }
    }

    /// Passengers that need a seat; infants travel on a lap.
    pub fn seated(&self) -> u32 {
        self.adults.saturating_add(self.children)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub start_time: DateTime,
    pub end_time: DateTime,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MultiplierKind {
    Night,
    PeakHour,
    MultiCity,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppliedMultiplier {
    pub kind: MultiplierKind,
    pub factor: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FareBreakdown {
    pub vehicle_category: String,
    pub bracket: Option<String>,
    pub base_price: f64,
    pub distance_charge: f64,
    pub time_charge: f64,
    pub driver_allowance: f64,
    /// Amount added to reach the bracket's minimum fare.
    pub minimum_fare_adjustment: f64,
    pub subtotal: f64,
    pub multipliers: Vec<AppliedMultiplier>,
    pub multiplier_adjustments: f64,
    pub discount: f64,
    pub total: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Cancellation {
    pub reason: String,
    pub tier: Option<String>,
    pub fee: f64,
    pub refund_amount: f64,
    pub cancelled_at: DateTime,
    pub cancelled_by: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StatusChange {
    pub from: Option<BookingStatus>,
    pub to: BookingStatus,
    pub at: DateTime,
    pub changed_by: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Booking {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub booking_code: String,
    pub customer_id: ObjectId,
    pub booking_type: BookingType,
    pub trip_type: TripType,
    pub pickup_address: String,
    pub dropoff_address: Option<String>,
    #[serde(default)]
    pub stops: Vec<String>,
    pub schedule: Schedule,
    pub passengers: Passengers,
    pub distance_km: f64,
    pub duration_hours: f64,
    pub pricing: FareBreakdown,
    pub special_requests: Option<String>,
    pub package_id: Option<ObjectId>,
    pub driver_id: Option<ObjectId>,
    pub vehicle_id: Option<ObjectId>,
    pub status: BookingStatus,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    pub cancellation: Option<Cancellation>,
    pub started_at: Option<DateTime>,
    pub completed_at: Option<DateTime>,
    pub end_time: Option<DateTime>,
    /// Bumped on every write; conditional updates match on it.
    #[serde(default)]
    pub version: i64,
    pub created_at: DateTime,
    pub updated_at: Option<DateTime>,
}

impl Booking {
    /// Applies a status change in memory. The caller persists it with a
    /// conditional update against the previous version.
    pub fn transition(
        &mut self,
        to: BookingStatus,
        at: DateTime,
        changed_by: Option<String>,
        note: Option<String>,
    ) {
        self.status_history.push(StatusChange {
            from: Some(self.status),
            to,
            at,
            changed_by,
            note,
        });
        self.status = to;
        self.version += 1;
        self.updated_at = Some(at);
    }

    pub fn minutes_before_pickup(&self, now: DateTime) -> i64 {
        (self.schedule.start_time.timestamp_millis() - now.timestamp_millis()).div_euclid(60_000)
    }
}

/// Either the internal record id or the human-readable booking code.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingRef {
    Id(ObjectId),
    Code(String),
}

impl BookingRef {
    pub fn parse(raw: &str) -> Self {
        match ObjectId::parse_str(raw) {
            Ok(id) => BookingRef::Id(id),
            Err(_) => BookingRef::Code(raw.trim().to_uppercase()),
        }
    }
}

impl fmt::Display for BookingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingRef::Id(id) => write!(f, "{}", id),
            BookingRef::Code(code) => f.write_str(code),
        }
    }
}

/// Lifecycle transition published to the dashboard and notification sinks.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BookingEvent {
    pub event_id: Uuid,
    pub booking_id: ObjectId,
    pub booking_code: String,
    pub from_status: Option<BookingStatus>,
    pub to_status: BookingStatus,
    pub timestamp: DateTime,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, Validate)]
pub struct PassengerInput {
    #[serde(default)]
    #[validate(range(max = 100, message = "too many adult passengers"))]
    pub adults: u32,
    #[serde(default)]
    #[validate(range(max = 100, message = "too many child passengers"))]
    pub children: u32,
    #[serde(default)]
    #[validate(range(max = 100, message = "too many infant passengers"))]
    pub infants: u32,
    pub total_count: Option<u32>,
}

fn passenger_field(field: &str) -> &'static str {
    match field {
        "adults" => "passengers.adults",
        "children" => "passengers.children",
        "infants" => "passengers.infants",
        _ => "passengers",
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct BookingRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "customer reference is required"))]
    pub customer_id: String,
    pub booking_type: BookingType,
    #[serde(default)]
    pub trip_type: TripType,
    #[serde(default)]
    #[validate(length(min = 1, max = 500, message = "pickup address is required"))]
    pub pickup_address: String,
    #[validate(length(max = 500))]
    pub dropoff_address: Option<String>,
    #[serde(default)]
    pub stops: Vec<String>,
    pub start_date: Option<chrono::DateTime<Utc>>,
    pub end_date: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    pub passengers: PassengerInput,
    #[serde(default)]
    #[validate(length(min = 1, message = "vehicle category is required"))]
    pub vehicle_category: String,
    #[validate(range(min = 0.0, max = 10000.0, message = "distance must be between 0 and 10000 km"))]
    pub distance_km: f64,
    #[validate(range(min = 0.0, max = 720.0, message = "duration must be between 0 and 720 hours"))]
    pub duration_hours: Option<f64>,
    pub package_id: Option<String>,
    #[validate(length(max = 1000))]
    pub special_requests: Option<String>,
    pub is_night_trip: Option<bool>,
    pub is_peak_hour: Option<bool>,
}

/// A booking request that passed boundary validation.
#[derive(Debug, Clone)]
pub struct ValidatedBooking {
    pub customer_id: ObjectId,
    pub package_id: Option<ObjectId>,
    pub schedule: Schedule,
    pub passengers: Passengers,
    pub duration_hours: f64,
    pub request: BookingRequest,
}

pub(crate) fn violation(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

impl BookingRequest {
    /// Runs field rules and cross-field rules together so every violated
    /// constraint is reported at once.
    pub fn into_validated(self) -> Result<ValidatedBooking, ValidationErrors> {
        let mut errors = match self.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };

        let customer_id = if self.customer_id.trim().is_empty() {
            None
        } else {
            let parsed = ObjectId::parse_str(self.customer_id.trim()).ok();
            if parsed.is_none() {
                errors.add("customer_id", violation("object_id", "customer reference is not a valid id"));
            }
            parsed
        };

        match (self.start_date, self.end_date) {
            (None, _) => errors.add("start_date", violation("required", "start date is required")),
            (_, None) => {}
            (Some(start), Some(end)) if end < start => {
                errors.add("end_date", violation("date_order", "end date must not be before start date"))
            }
            _ => {}
        }
        if self.end_date.is_none() {
            errors.add("end_date", violation("required", "end date is required"));
        }

        let input = &self.passengers;
        if let Err(bounds) = input.validate() {
            for (field, violations) in bounds.field_errors() {
                for violation in violations {
                    errors.add(passenger_field(field), violation.clone());
                }
            }
        }
        if input.adults < 1 {
            errors.add("passengers.adults", violation("range", "at least one adult passenger is required"));
        }
        let passengers = Passengers::new(input.adults, input.children, input.infants);
        if let Some(total) = input.total_count {
            if total != passengers.total_count {
                errors.add(
                    "passengers.total_count",
                    violation("mismatch", "total count must equal adults + children + infants"),
                );
            }
        }

        if self.booking_type == BookingType::Outstation
            && self.dropoff_address.as_deref().map_or(true, |a| a.trim().is_empty())
        {
            errors.add("dropoff_address", violation("required", "outstation trips need a drop-off address"));
        }
        if self.trip_type == TripType::MultiCity && self.stops.iter().all(|s| s.trim().is_empty()) {
            errors.add("stops", violation("required", "multi-city trips need at least one stop"));
        }

        let package_id = match self.package_id.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                let parsed = ObjectId::parse_str(raw).ok();
                if parsed.is_none() {
                    errors.add("package_id", violation("object_id", "package reference is not a valid id"));
                }
                parsed
            }
            _ => {
                if self.booking_type == BookingType::PackageTour {
                    errors.add("package_id", violation("required", "package tours need a package"));
                }
                None
            }
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        // Presence was checked above.
        let (Some(customer_id), Some(start), Some(end)) = (customer_id, self.start_date, self.end_date)
        else {
            return Err(errors);
        };
        let duration_hours = match self.duration_hours {
            Some(hours) => hours,
            None => {
                let hours = (end - start).num_minutes() as f64 / 60.0;
                if hours > MAX_TRIP_HOURS {
                    errors.add("end_date", violation("range", "trips may not exceed 720 hours"));
                    return Err(errors);
                }
                hours
            }
        };

        Ok(ValidatedBooking {
            customer_id,
            package_id,
            schedule: Schedule {
                start_time: DateTime::from_chrono(start),
                end_time: DateTime::from_chrono(end),
            },
            passengers,
            duration_hours,
            request: self,
        })
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct QuoteRequest {
    pub vehicle_category: String,
    pub booking_type: BookingType,
    #[serde(default)]
    pub trip_type: TripType,
    #[validate(range(min = 0.0, max = 10000.0, message = "distance must be between 0 and 10000 km"))]
    pub distance_km: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 720.0, message = "duration must be between 0 and 720 hours"))]
    pub duration_hours: f64,
    pub pickup_time: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    #[validate]
    pub passengers: PassengerInput,
    pub is_night_trip: Option<bool>,
    pub is_peak_hour: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AssignRequest {
    pub driver_id: String,
    pub vehicle_id: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AdvanceStatusRequest {
    pub status: BookingStatus,
    pub completed_at: Option<chrono::DateTime<Utc>>,
    pub end_time: Option<chrono::DateTime<Utc>>,
    pub note: Option<String>,
}

impl AdvanceStatusRequest {
    pub fn to(status: BookingStatus) -> Self {
        Self {
            status,
            completed_at: None,
            end_time: None,
            note: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: String,
    pub refund_amount: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RepairReport {
    pub scanned: usize,
    pub repaired: Vec<String>,
    pub skipped: Vec<String>,
}
