use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};

use crate::errors::BookingError;
use crate::models::booking::{Booking, BookingStatus, BookingType};
use crate::models::directory::{DirectoryEntity, DirectoryQuery, Reservable, Reservation};

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub statuses: Vec<BookingStatus>,
    pub booking_type: Option<BookingType>,
    pub customer_id: Option<ObjectId>,
    pub driver_id: Option<ObjectId>,
    pub vehicle_id: Option<ObjectId>,
    pub created_from: Option<DateTime>,
    pub created_to: Option<DateTime>,
}

impl BookingFilter {
    pub fn created_between(from: DateTime, to: DateTime) -> Self {
        Self {
            created_from: Some(from),
            created_to: Some(to),
            ..Default::default()
        }
    }

    pub fn with_status(status: BookingStatus) -> Self {
        Self {
            statuses: vec![status],
            ..Default::default()
        }
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&booking.status))
            && self.booking_type.map_or(true, |t| booking.booking_type == t)
            && self.customer_id.map_or(true, |id| booking.customer_id == id)
            && self.driver_id.map_or(true, |id| booking.driver_id == Some(id))
            && self.vehicle_id.map_or(true, |id| booking.vehicle_id == Some(id))
            && self.created_from.map_or(true, |from| booking.created_at >= from)
            && self.created_to.map_or(true, |to| booking.created_at < to)
    }

    pub fn to_document(&self) -> Document {
        let mut filter = doc! {};
        if !self.statuses.is_empty() {
            let statuses: Vec<&str> = self.statuses.iter().map(|s| s.as_str()).collect();
            filter.insert("status", doc! { "$in": statuses });
        }
        if let Some(booking_type) = self.booking_type {
            filter.insert("booking_type", booking_type.as_str());
        }
        if let Some(id) = self.customer_id {
            filter.insert("customer_id", id);
        }
        if let Some(id) = self.driver_id {
            filter.insert("driver_id", id);
        }
        if let Some(id) = self.vehicle_id {
            filter.insert("vehicle_id", id);
        }
        let mut created = doc! {};
        if let Some(from) = self.created_from {
            created.insert("$gte", from);
        }
        if let Some(to) = self.created_to {
            created.insert("$lt", to);
        }
        if !created.is_empty() {
            filter.insert("created_at", created);
        }
        filter
    }
}

/// Persistence for booking documents.
///
/// Writes after creation go through [`BookingStore::replace_if_unchanged`],
/// which only succeeds while the stored status and version still match the
/// copy the caller read. That is the only concurrency control the lifecycle
/// relies on, so it holds across process instances.
pub trait BookingStore {
    async fn insert(&self, booking: &Booking) -> Result<ObjectId, BookingError>;

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<Booking>, BookingError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<Booking>, BookingError>;

    async fn replace_if_unchanged(
        &self,
        expected: &Booking,
        updated: &Booking,
    ) -> Result<bool, BookingError>;

    /// Newest first.
    async fn query(&self, filter: &BookingFilter) -> Result<Vec<Booking>, BookingError>;

    async fn ping(&self) -> Result<(), BookingError>;
}

/// Driver, vehicle, customer and package records.
pub trait ResourceDirectory {
    async fn get<E: DirectoryEntity>(&self, id: ObjectId) -> Result<Option<E>, BookingError>;

    async fn list<E: DirectoryEntity>(
        &self,
        query: &DirectoryQuery,
    ) -> Result<Vec<E>, BookingError>;

    async fn insert<E: DirectoryEntity>(&self, entity: &E) -> Result<ObjectId, BookingError>;

    /// Overwrites editable fields. Identity, creation time, the active flag
    /// and reservations are kept. Returns false when the record does not exist.
    async fn update<E: DirectoryEntity>(
        &self,
        id: ObjectId,
        entity: &E,
    ) -> Result<bool, BookingError>;

    async fn set_active<E: DirectoryEntity>(
        &self,
        id: ObjectId,
        active: bool,
        now: DateTime,
    ) -> Result<bool, BookingError>;

    /// Atomically adds the reservation unless the record is inactive or
    /// already holds an overlapping one. Returns whether it was added.
    async fn reserve<E: Reservable>(
        &self,
        id: ObjectId,
        reservation: &Reservation,
    ) -> Result<bool, BookingError>;

    /// Drops every hold the booking has on the record.
    async fn release<E: Reservable>(
        &self,
        id: ObjectId,
        booking_id: ObjectId,
    ) -> Result<(), BookingError>;

    /// Drops the single hold pushed by one `reserve` call.
    async fn release_hold<E: Reservable>(
        &self,
        id: ObjectId,
        hold_id: &str,
    ) -> Result<(), BookingError>;
}

/// Keys that a directory update never overwrites.
pub(crate) const PROTECTED_FIELDS: [&str; 4] = ["_id", "created_at", "is_active", "reservations"];

pub(crate) fn editable_fields<E: DirectoryEntity>(entity: &E) -> Result<Document, BookingError> {
    let mut fields = bson::to_document(entity)?;
    for key in PROTECTED_FIELDS {
        fields.remove(key);
    }
    Ok(fields)
}
