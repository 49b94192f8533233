use futures::TryStreamExt;
use log::{info, warn};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime, Document},
    options::{ClientOptions, FindOptions, IndexOptions, ServerApi, ServerApiVersion},
    Client, Collection, Database, IndexModel,
};
use std::time::Duration;

use crate::db::store::{editable_fields, BookingFilter, BookingStore, ResourceDirectory};
use crate::errors::BookingError;
use crate::models::booking::Booking;
use crate::models::directory::{DirectoryEntity, DirectoryQuery, Reservable, Reservation};
use crate::models::fleet::VehicleCategory;

pub const BOOKINGS_COLLECTION: &str = "Bookings";
pub const PRICING_COLLECTION: &str = "PricingProfiles";

pub async fn create_mongo_client(uri: &str) -> Result<Client, BookingError> {
    info!("Connecting to MongoDB");

    let mut client_options = ClientOptions::parse(uri).await?;

    client_options.connect_timeout = Some(Duration::from_secs(10));
    client_options.server_selection_timeout = Some(Duration::from_secs(10));
    client_options.max_pool_size = Some(10);
    client_options.min_pool_size = Some(1);

    let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
    client_options.server_api = Some(server_api);

    let client = Client::with_options(client_options)?;

    match client.database("admin").run_command(doc! {"ping": 1}).await {
        Ok(_) => info!("Connected to MongoDB and verified with ping"),
        Err(e) => {
            warn!("Connected to MongoDB but ping failed: {}", e);
            warn!("The API may still work, but some functionality might be impaired");
        }
    }

    Ok(client)
}

/// Vehicle categories stored by admins, if any.
pub async fn load_vehicle_categories(
    database: &Database,
) -> Result<Vec<VehicleCategory>, BookingError> {
    let collection: Collection<VehicleCategory> = database.collection(PRICING_COLLECTION);
    let cursor = collection.find(doc! {}).await?;
    Ok(cursor.try_collect().await?)
}

#[derive(Clone)]
pub struct MongoBookingStore {
    database: Database,
    collection: Collection<Booking>,
}

impl MongoBookingStore {
    pub fn new(database: &Database) -> Self {
        Self {
            database: database.clone(),
            collection: database.collection(BOOKINGS_COLLECTION),
        }
    }

    pub async fn ensure_indexes(&self) -> Result<(), BookingError> {
        let unique_code = IndexModel::builder()
            .keys(doc! { "booking_code": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        let by_status = IndexModel::builder()
            .keys(doc! { "status": 1, "created_at": -1 })
            .build();
        self.collection.create_index(unique_code).await?;
        self.collection.create_index(by_status).await?;
        Ok(())
    }
}

impl BookingStore for MongoBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<ObjectId, BookingError> {
        let result = self.collection.insert_one(booking).await.map_err(|err| {
            if is_duplicate_key(&err) {
                BookingError::Conflict(format!("booking code {} already exists", booking.booking_code))
            } else {
                BookingError::Database(err)
            }
        })?;
        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| BookingError::Serialization("inserted id is not an ObjectId".to_string()))
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<Booking>, BookingError> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Booking>, BookingError> {
        Ok(self
            .collection
            .find_one(doc! { "booking_code": code })
            .await?)
    }

    async fn replace_if_unchanged(
        &self,
        expected: &Booking,
        updated: &Booking,
    ) -> Result<bool, BookingError> {
        let Some(id) = expected.id else {
            return Ok(false);
        };
        let filter = doc! {
            "_id": id,
            "status": expected.status.as_str(),
            "version": expected.version,
        };
        let result = self.collection.replace_one(filter, updated).await?;
        Ok(result.matched_count == 1)
    }

    async fn query(&self, filter: &BookingFilter) -> Result<Vec<Booking>, BookingError> {
        let cursor = self
            .collection
            .find(filter.to_document())
            .sort(doc! { "created_at": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn ping(&self) -> Result<(), BookingError> {
        self.database.run_command(doc! {"ping": 1}).await?;
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(e)) if e.code == 11000
    )
}

#[derive(Clone)]
pub struct MongoDirectory {
    database: Database,
}

impl MongoDirectory {
    pub fn new(database: &Database) -> Self {
        Self {
            database: database.clone(),
        }
    }

    fn typed<E: DirectoryEntity>(&self) -> Collection<E> {
        self.database.collection(E::COLLECTION)
    }

    fn raw<E: DirectoryEntity>(&self) -> Collection<Document> {
        self.database.collection(E::COLLECTION)
    }
}

impl ResourceDirectory for MongoDirectory {
    async fn get<E: DirectoryEntity>(&self, id: ObjectId) -> Result<Option<E>, BookingError> {
        Ok(self.typed::<E>().find_one(doc! { "_id": id }).await?)
    }

    async fn list<E: DirectoryEntity>(
        &self,
        query: &DirectoryQuery,
    ) -> Result<Vec<E>, BookingError> {
        let mut filter = doc! {};
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            filter.insert(
                E::SEARCH_FIELD,
                doc! {
                    "$regex": format!("^{}", regex::escape(search.trim())),
                    "$options": "i"
                },
            );
        }
        if query.active_only {
            filter.insert("is_active", true);
        }

        let mut sort = Document::new();
        sort.insert(E::SEARCH_FIELD, 1);
        let mut options = FindOptions::default();
        options.sort = Some(sort);
        if let Some(limit) = query.limit {
            options.limit = Some(limit.into());
        }

        let cursor = self.typed::<E>().find(filter).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert<E: DirectoryEntity>(&self, entity: &E) -> Result<ObjectId, BookingError> {
        let mut document = bson::to_document(entity)?;
        // New records never start out holding bookings.
        document.remove("reservations");
        let id = ObjectId::new();
        document.insert("_id", id);
        self.raw::<E>().insert_one(document).await?;
        Ok(id)
    }

    async fn update<E: DirectoryEntity>(
        &self,
        id: ObjectId,
        entity: &E,
    ) -> Result<bool, BookingError> {
        let fields = editable_fields(entity)?;
        let result = self
            .raw::<E>()
            .update_one(doc! { "_id": id }, doc! { "$set": fields })
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn set_active<E: DirectoryEntity>(
        &self,
        id: ObjectId,
        active: bool,
        now: DateTime,
    ) -> Result<bool, BookingError> {
        let result = self
            .raw::<E>()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "is_active": active, "updated_at": now } },
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn reserve<E: Reservable>(
        &self,
        id: ObjectId,
        reservation: &Reservation,
    ) -> Result<bool, BookingError> {
        // Matches only while no other booking holds an overlapping window.
        let filter = doc! {
            "_id": id,
            "is_active": true,
            "reservations": {
                "$not": {
                    "$elemMatch": {
                        "booking_id": { "$ne": reservation.booking_id },
                        "start": { "$lt": reservation.end },
                        "end": { "$gt": reservation.start },
                    }
                }
            },
        };
        let update = doc! { "$push": { "reservations": bson::to_bson(reservation)? } };
        let result = self.raw::<E>().update_one(filter, update).await?;
        Ok(result.matched_count == 1)
    }

    async fn release<E: Reservable>(
        &self,
        id: ObjectId,
        booking_id: ObjectId,
    ) -> Result<(), BookingError> {
        self.raw::<E>()
            .update_one(
                doc! { "_id": id },
                doc! { "$pull": { "reservations": { "booking_id": booking_id } } },
            )
            .await?;
        Ok(())
    }

    async fn release_hold<E: Reservable>(
        &self,
        id: ObjectId,
        hold_id: &str,
    ) -> Result<(), BookingError> {
        self.raw::<E>()
            .update_one(
                doc! { "_id": id },
                doc! { "$pull": { "reservations": { "hold_id": hold_id } } },
            )
            .await?;
        Ok(())
    }
}
