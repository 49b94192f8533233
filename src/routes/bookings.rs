use actix_web::{web, HttpResponse};
use chrono::Utc;
use mongodb::bson::{oid::ObjectId, DateTime};
use serde::Deserialize;

use crate::db::store::{BookingFilter, BookingStore, ResourceDirectory};
use crate::errors::BookingError;
use crate::middleware::auth_context::AuthenticatedUser;
use crate::models::booking::{
    AdvanceStatusRequest, AssignRequest, BookingRef, BookingRequest, BookingStatus, BookingType,
    CancelRequest, QuoteRequest,
};
use crate::services::booking_service::BookingService;

type Service<S, D> = web::Data<BookingService<S, D>>;

#[derive(Debug, Deserialize, Default)]
pub struct BookingListQuery {
    /// Comma separated, e.g. `pending,confirmed`.
    pub status: Option<String>,
    pub booking_type: Option<BookingType>,
    pub customer_id: Option<String>,
    pub driver_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub from: Option<chrono::DateTime<Utc>>,
    pub to: Option<chrono::DateTime<Utc>>,
}

fn parse_id(field: &str, raw: &str) -> Result<ObjectId, BookingError> {
    ObjectId::parse_str(raw.trim())
        .map_err(|_| BookingError::InvalidInput(format!("{} is not a valid id: {}", field, raw)))
}

impl BookingListQuery {
    pub fn into_filter(self) -> Result<BookingFilter, BookingError> {
        let mut statuses = Vec::new();
        for raw in self.status.iter().flat_map(|s| s.split(',')) {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let status = BookingStatus::ALL
                .into_iter()
                .find(|s| s.as_str().eq_ignore_ascii_case(raw))
                .ok_or_else(|| BookingError::InvalidInput(format!("unknown status: {}", raw)))?;
            statuses.push(status);
        }

        Ok(BookingFilter {
            statuses,
            booking_type: self.booking_type,
            customer_id: self
                .customer_id
                .as_deref()
                .map(|id| parse_id("customer_id", id))
                .transpose()?,
            driver_id: self
                .driver_id
                .as_deref()
                .map(|id| parse_id("driver_id", id))
                .transpose()?,
            vehicle_id: self
                .vehicle_id
                .as_deref()
                .map(|id| parse_id("vehicle_id", id))
                .transpose()?,
            created_from: self.from.map(DateTime::from_chrono),
            created_to: self.to.map(DateTime::from_chrono),
        })
    }
}

pub async fn quote<S, D>(
    service: Service<S, D>,
    input: web::Json<QuoteRequest>,
) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
{
    let fare = service.quote(&input)?;
    Ok(HttpResponse::Ok().json(fare))
}

pub async fn create<S, D>(
    service: Service<S, D>,
    user: AuthenticatedUser,
    input: web::Json<BookingRequest>,
) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
{
    let booking = service.create(input.into_inner(), user.actor()).await?;
    Ok(HttpResponse::Created().json(booking))
}

pub async fn list<S, D>(
    service: Service<S, D>,
    query: web::Query<BookingListQuery>,
) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
{
    let filter = query.into_inner().into_filter()?;
    let bookings = service.list(&filter).await?;
    Ok(HttpResponse::Ok().json(bookings))
}

pub async fn get<S, D>(
    service: Service<S, D>,
    path: web::Path<String>,
) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
{
    let booking = service.get(&BookingRef::parse(&path)).await?;
    Ok(HttpResponse::Ok().json(booking))
}

pub async fn cancel<S, D>(
    service: Service<S, D>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    input: web::Json<CancelRequest>,
) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
{
    let booking = service
        .cancel(&BookingRef::parse(&path), input.into_inner(), user.actor())
        .await?;
    Ok(HttpResponse::Ok().json(booking))
}

pub async fn assign<S, D>(
    service: Service<S, D>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    input: web::Json<AssignRequest>,
) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
{
    let booking = service
        .assign(&BookingRef::parse(&path), input.into_inner(), user.actor())
        .await?;
    Ok(HttpResponse::Ok().json(booking))
}

pub async fn advance_status<S, D>(
    service: Service<S, D>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    input: web::Json<AdvanceStatusRequest>,
) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
{
    let booking = service
        .advance_status(&BookingRef::parse(&path), input.into_inner(), user.actor())
        .await?;
    Ok(HttpResponse::Ok().json(booking))
}

pub async fn repair_completion<S, D>(service: Service<S, D>) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
{
    let report = service.repair_completion().await?;
    Ok(HttpResponse::Ok().json(report))
}
