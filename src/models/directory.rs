use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::errors::BookingError;
use crate::models::booking::{Booking, MAX_TRIP_HOURS};
use crate::models::fleet::PricingCatalog;

fn default_true() -> bool {
    true
}

/// A booking's hold on a driver or vehicle for its scheduled window.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Reservation {
    pub booking_id: ObjectId,
    /// Identifies the assignment attempt that pushed this hold, so a failed
    /// attempt only rolls back its own entries.
    #[serde(default)]
    pub hold_id: String,
    pub start: DateTime,
    pub end: DateTime,
}

impl Reservation {
    pub fn for_booking(booking: &Booking, booking_id: ObjectId) -> Self {
        Self::new(
            booking_id,
            booking.schedule.start_time,
            booking.schedule.end_time,
            booking.duration_hours,
        )
    }

    pub fn new(booking_id: ObjectId, start: DateTime, end: DateTime, duration_hours: f64) -> Self {
        let mut end = end;
        if end <= start {
            // Same-instant schedules still occupy the resource for the trip.
            let hours = duration_hours.clamp(1.0, MAX_TRIP_HOURS);
            let span = (hours * 3_600_000.0) as i64;
            end = DateTime::from_millis(start.timestamp_millis().saturating_add(span));
        }
        Self {
            booking_id,
            hold_id: Uuid::new_v4().to_string(),
            start,
            end,
        }
    }

    pub fn overlaps(&self, other: &Reservation) -> bool {
        self.booking_id != other.booking_id && self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct Driver {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: String,
    #[validate(length(min = 5, max = 30))]
    pub license_number: String,
    #[serde(default)]
    pub kyc_status: KycStatus,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub reservations: Vec<Reservation>,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct Vehicle {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[validate(length(min = 4, max = 20))]
    pub registration_number: String,
    #[validate(length(min = 2, max = 100))]
    pub model: String,
    /// Name of the pricing category the vehicle is rented under.
    #[validate(length(min = 1))]
    pub category: String,
    #[validate(range(min = 1, max = 60))]
    pub seating_capacity: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub reservations: Vec<Reservation>,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct Customer {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: String,
    #[validate(email)]
    pub email: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct Package {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[validate(length(min = 2, max = 150))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 60))]
    pub duration_days: u32,
    #[validate(range(min = 0.0))]
    pub price_per_person: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

/// A record kept in one of the resource directories.
pub trait DirectoryEntity:
    Serialize + DeserializeOwned + Validate + Clone + Send + Sync + Unpin + 'static
{
    const COLLECTION: &'static str;
    /// Field matched by `?search=` prefix queries.
    const SEARCH_FIELD: &'static str;
    const LABEL: &'static str;

    fn id(&self) -> Option<ObjectId>;
    fn is_active(&self) -> bool;
    fn search_key(&self) -> &str;
    fn touch(&mut self, now: DateTime);

    /// Checks that need configuration beyond the record itself.
    fn check(&self, _catalog: &PricingCatalog) -> Result<(), BookingError> {
        Ok(())
    }
}

/// Entities that bookings can hold for a time window.
pub trait Reservable: DirectoryEntity {
    fn reservations(&self) -> &[Reservation];
    fn reservations_mut(&mut self) -> &mut Vec<Reservation>;

    fn is_free_for(&self, reservation: &Reservation) -> bool {
        !self.reservations().iter().any(|r| r.overlaps(reservation))
    }
}

macro_rules! touch_timestamps {
    () => {
        fn touch(&mut self, now: DateTime) {
            if self.created_at.is_none() {
                self.created_at = Some(now);
            }
            self.updated_at = Some(now);
        }
    };
}

impl DirectoryEntity for Driver {
    const COLLECTION: &'static str = "Drivers";
    const SEARCH_FIELD: &'static str = "name";
    const LABEL: &'static str = "driver";

    fn id(&self) -> Option<ObjectId> {
        self.id
    }
    fn is_active(&self) -> bool {
        self.is_active
    }
    fn search_key(&self) -> &str {
        &self.name
    }
    touch_timestamps!();
}

impl Reservable for Driver {
    fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }
    fn reservations_mut(&mut self) -> &mut Vec<Reservation> {
        &mut self.reservations
    }
}

impl DirectoryEntity for Vehicle {
    const COLLECTION: &'static str = "Vehicles";
    const SEARCH_FIELD: &'static str = "registration_number";
    const LABEL: &'static str = "vehicle";

    fn id(&self) -> Option<ObjectId> {
        self.id
    }
    fn is_active(&self) -> bool {
        self.is_active
    }
    fn search_key(&self) -> &str {
        &self.registration_number
    }
    touch_timestamps!();

    fn check(&self, catalog: &PricingCatalog) -> Result<(), BookingError> {
        if catalog.category(&self.category).is_none() {
            return Err(BookingError::InvalidCategory(self.category.clone()));
        }
        Ok(())
    }
}

impl Reservable for Vehicle {
    fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }
    fn reservations_mut(&mut self) -> &mut Vec<Reservation> {
        &mut self.reservations
    }
}

impl DirectoryEntity for Customer {
    const COLLECTION: &'static str = "Customers";
    const SEARCH_FIELD: &'static str = "name";
    const LABEL: &'static str = "customer";

    fn id(&self) -> Option<ObjectId> {
        self.id
    }
    fn is_active(&self) -> bool {
        self.is_active
    }
    fn search_key(&self) -> &str {
        &self.name
    }
    touch_timestamps!();
}

impl DirectoryEntity for Package {
    const COLLECTION: &'static str = "Packages";
    const SEARCH_FIELD: &'static str = "name";
    const LABEL: &'static str = "package";

    fn id(&self) -> Option<ObjectId> {
        self.id
    }
    fn is_active(&self) -> bool {
        self.is_active
    }
    fn search_key(&self) -> &str {
        &self.name
    }
    touch_timestamps!();
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DirectoryQuery {
    pub search: Option<String>,
    #[serde(default)]
    pub active_only: bool,
    pub limit: Option<u16>,
}
