//! In-process store and directory with the same conditional-update semantics
//! as the MongoDB implementations. Used by the test suite and for running the
//! API without a database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use mongodb::bson::{oid::ObjectId, DateTime, Document};
use regex::RegexBuilder;

use crate::db::store::{editable_fields, BookingFilter, BookingStore, ResourceDirectory};
use crate::errors::BookingError;
use crate::models::booking::Booking;
use crate::models::directory::{DirectoryEntity, DirectoryQuery, Reservable, Reservation};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Default)]
pub struct MemoryBookingStore {
    bookings: Arc<Mutex<Vec<Booking>>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record as-is, bypassing the lifecycle. For seeding legacy data.
    pub fn seed(&self, booking: Booking) -> ObjectId {
        let id = booking.id.unwrap_or_else(ObjectId::new);
        let mut booking = booking;
        booking.id = Some(id);
        lock(&self.bookings).push(booking);
        id
    }
}

impl BookingStore for MemoryBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<ObjectId, BookingError> {
        let mut bookings = lock(&self.bookings);
        if bookings.iter().any(|b| b.booking_code == booking.booking_code) {
            return Err(BookingError::Conflict(format!(
                "booking code {} already exists",
                booking.booking_code
            )));
        }
        let id = ObjectId::new();
        let mut stored = booking.clone();
        stored.id = Some(id);
        bookings.push(stored);
        Ok(id)
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<Booking>, BookingError> {
        Ok(lock(&self.bookings)
            .iter()
            .find(|b| b.id == Some(id))
            .cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Booking>, BookingError> {
        Ok(lock(&self.bookings)
            .iter()
            .find(|b| b.booking_code == code)
            .cloned())
    }

    async fn replace_if_unchanged(
        &self,
        expected: &Booking,
        updated: &Booking,
    ) -> Result<bool, BookingError> {
        let mut bookings = lock(&self.bookings);
        let current = bookings.iter_mut().find(|b| {
            b.id.is_some()
                && b.id == expected.id
                && b.status == expected.status
                && b.version == expected.version
        });
        match current {
            Some(current) => {
                *current = updated.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn query(&self, filter: &BookingFilter) -> Result<Vec<Booking>, BookingError> {
        let mut matching: Vec<Booking> = lock(&self.bookings)
            .iter()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn ping(&self) -> Result<(), BookingError> {
        Ok(())
    }
}

/// Directory records kept as BSON documents per collection, so updates
/// behave like `$set` on the stored document.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    collections: Arc<Mutex<HashMap<&'static str, Vec<Document>>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

fn find_mut(documents: &mut [Document], id: ObjectId) -> Option<&mut Document> {
    documents
        .iter_mut()
        .find(|d| d.get_object_id("_id").ok() == Some(id))
}

impl ResourceDirectory for MemoryDirectory {
    async fn get<E: DirectoryEntity>(&self, id: ObjectId) -> Result<Option<E>, BookingError> {
        let collections = lock(&self.collections);
        let Some(documents) = collections.get(E::COLLECTION) else {
            return Ok(None);
        };
        match documents
            .iter()
            .find(|d| d.get_object_id("_id").ok() == Some(id))
        {
            Some(document) => Ok(Some(bson::from_document(document.clone())?)),
            None => Ok(None),
        }
    }

    async fn list<E: DirectoryEntity>(
        &self,
        query: &DirectoryQuery,
    ) -> Result<Vec<E>, BookingError> {
        let pattern = match query.search.as_deref().map(str::trim) {
            Some(search) if !search.is_empty() => Some(
                RegexBuilder::new(&format!("^{}", regex::escape(search)))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| BookingError::InvalidInput(e.to_string()))?,
            ),
            _ => None,
        };

        let documents = lock(&self.collections)
            .get(E::COLLECTION)
            .cloned()
            .unwrap_or_default();
        let mut entities = Vec::new();
        for document in documents {
            let entity: E = bson::from_document(document)?;
            if query.active_only && !entity.is_active() {
                continue;
            }
            if let Some(pattern) = &pattern {
                if !pattern.is_match(entity.search_key()) {
                    continue;
                }
            }
            entities.push(entity);
        }
        entities.sort_by(|a, b| a.search_key().cmp(b.search_key()));
        if let Some(limit) = query.limit {
            entities.truncate(limit as usize);
        }
        Ok(entities)
    }

    async fn insert<E: DirectoryEntity>(&self, entity: &E) -> Result<ObjectId, BookingError> {
        let mut document = bson::to_document(entity)?;
        // New records never start out holding bookings.
        document.remove("reservations");
        let id = ObjectId::new();
        document.insert("_id", id);
        lock(&self.collections)
            .entry(E::COLLECTION)
            .or_default()
            .push(document);
        Ok(id)
    }

    async fn update<E: DirectoryEntity>(
        &self,
        id: ObjectId,
        entity: &E,
    ) -> Result<bool, BookingError> {
        let fields = editable_fields(entity)?;
        let mut collections = lock(&self.collections);
        let Some(document) = collections
            .get_mut(E::COLLECTION)
            .and_then(|docs| find_mut(docs, id))
        else {
            return Ok(false);
        };
        for (key, value) in fields {
            document.insert(key, value);
        }
        Ok(true)
    }

    async fn set_active<E: DirectoryEntity>(
        &self,
        id: ObjectId,
        active: bool,
        now: DateTime,
    ) -> Result<bool, BookingError> {
        let mut collections = lock(&self.collections);
        let Some(document) = collections
            .get_mut(E::COLLECTION)
            .and_then(|docs| find_mut(docs, id))
        else {
            return Ok(false);
        };
        document.insert("is_active", active);
        document.insert("updated_at", now);
        Ok(true)
    }

    async fn reserve<E: Reservable>(
        &self,
        id: ObjectId,
        reservation: &Reservation,
    ) -> Result<bool, BookingError> {
        let mut collections = lock(&self.collections);
        let Some(document) = collections
            .get_mut(E::COLLECTION)
            .and_then(|docs| find_mut(docs, id))
        else {
            return Ok(false);
        };
        let mut entity: E = bson::from_document(document.clone())?;
        if !entity.is_active() || !entity.is_free_for(reservation) {
            return Ok(false);
        }
        entity.reservations_mut().push(reservation.clone());
        document.insert("reservations", bson::to_bson(entity.reservations())?);
        Ok(true)
    }

    async fn release<E: Reservable>(
        &self,
        id: ObjectId,
        booking_id: ObjectId,
    ) -> Result<(), BookingError> {
        let mut collections = lock(&self.collections);
        let Some(document) = collections
            .get_mut(E::COLLECTION)
            .and_then(|docs| find_mut(docs, id))
        else {
            return Ok(());
        };
        let mut entity: E = bson::from_document(document.clone())?;
        entity
            .reservations_mut()
            .retain(|r| r.booking_id != booking_id);
        document.insert("reservations", bson::to_bson(entity.reservations())?);
        Ok(())
    }

    async fn release_hold<E: Reservable>(
        &self,
        id: ObjectId,
        hold_id: &str,
    ) -> Result<(), BookingError> {
        let mut collections = lock(&self.collections);
        let Some(document) = collections
            .get_mut(E::COLLECTION)
            .and_then(|docs| find_mut(docs, id))
        else {
            return Ok(());
        };
        let mut entity: E = bson::from_document(document.clone())?;
        entity.reservations_mut().retain(|r| r.hold_id != hold_id);
        document.insert("reservations", bson::to_bson(entity.reservations())?);
        Ok(())
    }
}
