use actix_web::{web, HttpResponse};
use chrono::Utc;
use mongodb::bson::DateTime;
use serde::Deserialize;

use crate::db::store::BookingStore;
use crate::errors::BookingError;
use crate::models::dashboard::DateRange;
use crate::services::dashboard_service::DashboardService;

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub from: Option<chrono::DateTime<Utc>>,
    pub to: Option<chrono::DateTime<Utc>>,
}

impl DashboardQuery {
    fn range(&self) -> Result<Option<DateRange>, BookingError> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Ok(Some(DateRange {
                from: DateTime::from_chrono(from),
                to: DateTime::from_chrono(to),
            })),
            (None, None) => Ok(None),
            _ => Err(BookingError::InvalidInput(
                "from and to must be given together".to_string(),
            )),
        }
    }
}

pub async fn summary<S>(
    service: web::Data<DashboardService<S>>,
    query: web::Query<DashboardQuery>,
) -> Result<HttpResponse, BookingError>
where
    S: BookingStore + 'static,
{
    let summary = service.summarize(query.range()?).await?;
    Ok(HttpResponse::Ok().json(summary))
}
