//! Generic CRUD over the resource directories. Records are deactivated,
//! never deleted, so bookings keep resolving their references.

use actix_web::{web, HttpResponse, Scope};
use log::info;
use mongodb::bson::oid::ObjectId;
use serde_json::json;
use validator::Validate;

use crate::db::store::{BookingStore, ResourceDirectory};
use crate::errors::BookingError;
use crate::models::directory::{Customer, DirectoryEntity, DirectoryQuery, Driver, Package, Vehicle};
use crate::services::booking_service::BookingService;

type Service<S, D> = web::Data<BookingService<S, D>>;

fn parse_id<E: DirectoryEntity>(raw: &str) -> Result<ObjectId, BookingError> {
    ObjectId::parse_str(raw.trim())
        .map_err(|_| BookingError::InvalidInput(format!("invalid {} id: {}", E::LABEL, raw)))
}

pub async fn list<S, D, E>(
    service: Service<S, D>,
    query: web::Query<DirectoryQuery>,
) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
    E: DirectoryEntity,
{
    let records: Vec<E> = service.directory().list(&query).await?;
    Ok(HttpResponse::Ok().json(records))
}

pub async fn get<S, D, E>(
    service: Service<S, D>,
    path: web::Path<String>,
) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
    E: DirectoryEntity,
{
    let id = parse_id::<E>(&path)?;
    let record: E = service
        .directory()
        .get(id)
        .await?
        .ok_or_else(|| BookingError::NotFound(format!("{} {}", E::LABEL, id)))?;
    Ok(HttpResponse::Ok().json(record))
}

pub async fn create<S, D, E>(
    service: Service<S, D>,
    input: web::Json<E>,
) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
    E: DirectoryEntity,
{
    let mut record = input.into_inner();
    record.validate()?;
    record.check(service.catalog())?;
    record.touch(service.clock().now());

    let id = service.directory().insert(&record).await?;
    info!("Created {} {}", E::LABEL, id);
    Ok(HttpResponse::Created().json(json!({ "id": id.to_hex() })))
}

pub async fn update<S, D, E>(
    service: Service<S, D>,
    path: web::Path<String>,
    input: web::Json<E>,
) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
    E: DirectoryEntity,
{
    let id = parse_id::<E>(&path)?;
    let mut record = input.into_inner();
    record.validate()?;
    record.check(service.catalog())?;

    let directory = service.directory();
    record.touch(service.clock().now());
    if !directory.update(id, &record).await? {
        return Err(BookingError::NotFound(format!("{} {}", E::LABEL, id)));
    }

    let updated: E = directory
        .get(id)
        .await?
        .ok_or_else(|| BookingError::NotFound(format!("{} {}", E::LABEL, id)))?;
    Ok(HttpResponse::Ok().json(updated))
}

async fn set_active<S, D, E>(
    service: Service<S, D>,
    path: web::Path<String>,
    active: bool,
) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
    E: DirectoryEntity,
{
    let id = parse_id::<E>(&path)?;
    let now = service.clock().now();
    if !service.directory().set_active::<E>(id, active, now).await? {
        return Err(BookingError::NotFound(format!("{} {}", E::LABEL, id)));
    }
    info!(
        "{} {} {}",
        E::LABEL,
        id,
        if active { "activated" } else { "deactivated" }
    );
    Ok(HttpResponse::Ok().json(json!({ "id": id.to_hex(), "is_active": active })))
}

pub async fn activate<S, D, E>(
    service: Service<S, D>,
    path: web::Path<String>,
) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
    E: DirectoryEntity,
{
    set_active::<S, D, E>(service, path, true).await
}

pub async fn deactivate<S, D, E>(
    service: Service<S, D>,
    path: web::Path<String>,
) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
    E: DirectoryEntity,
{
    set_active::<S, D, E>(service, path, false).await
}

fn read_scope<S, D, E>() -> Scope
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
    E: DirectoryEntity,
{
    web::scope(&format!("/directory/{}", E::COLLECTION.to_lowercase()))
        .route("", web::get().to(list::<S, D, E>))
        .route("/{id}", web::get().to(get::<S, D, E>))
}

fn write_scope<S, D, E>() -> Scope
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
    E: DirectoryEntity,
{
    web::scope(&format!("/directory/{}", E::COLLECTION.to_lowercase()))
        .route("", web::post().to(create::<S, D, E>))
        .route("/{id}", web::put().to(update::<S, D, E>))
        .route("/{id}/activate", web::post().to(activate::<S, D, E>))
        .route("/{id}/deactivate", web::post().to(deactivate::<S, D, E>))
}

/// `/directory/{drivers,vehicles,customers,packages}` reads.
pub fn routes<S, D>(cfg: &mut web::ServiceConfig)
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
{
    cfg.service(read_scope::<S, D, Driver>())
        .service(read_scope::<S, D, Vehicle>())
        .service(read_scope::<S, D, Customer>())
        .service(read_scope::<S, D, Package>());
}

/// Writes, mounted under the admin scope.
pub fn admin_routes<S, D>(cfg: &mut web::ServiceConfig)
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
{
    cfg.service(write_scope::<S, D, Driver>())
        .service(write_scope::<S, D, Vehicle>())
        .service(write_scope::<S, D, Customer>())
        .service(write_scope::<S, D, Package>());
}
