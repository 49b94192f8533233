use actix_web::{web, HttpResponse};
use log::error;
use serde::Serialize;
use std::collections::HashMap;
use std::env;

use crate::db::store::{BookingStore, ResourceDirectory};
use crate::services::booking_service::BookingService;

#[derive(Serialize)]
struct HealthStatus {
    status: String,
    services: HashMap<String, ServiceStatus>,
    environment: String,
    version: String,
}

#[derive(Serialize, Clone)]
struct ServiceStatus {
    status: String,
    details: Option<String>,
}

pub async fn health_check<S, D>(service: web::Data<BookingService<S, D>>) -> HttpResponse
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
{
    let mut health = HealthStatus {
        status: "ok".to_string(),
        services: HashMap::new(),
        environment: env::var("RUST_ENV").unwrap_or("development".to_string()),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let store = match service.store().ping().await {
        Ok(()) => ServiceStatus {
            status: "ok".to_string(),
            details: Some("Booking store reachable".to_string()),
        },
        Err(e) => {
            error!("Booking store health check failed: {}", e);
            ServiceStatus {
                status: "error".to_string(),
                details: Some(format!("Failed to reach booking store: {}", e)),
            }
        }
    };
    let catalog = ServiceStatus {
        status: "ok".to_string(),
        details: Some(format!(
            "{} vehicle categories loaded",
            service.catalog().categories.len()
        )),
    };

    if store.status != "ok" {
        health.status = "degraded".to_string();
    }
    health.services.insert("store".to_string(), store);
    health.services.insert("pricing".to_string(), catalog);

    HttpResponse::Ok().json(health)
}
