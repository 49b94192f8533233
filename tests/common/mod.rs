#![allow(dead_code)]

use std::sync::Arc;

use actix_web::{
    body::{to_bytes, MessageBody},
    dev::{Service, ServiceResponse},
    http::StatusCode,
    App,
};
use chrono::{TimeZone, Utc};
use mongodb::bson::{oid::ObjectId, DateTime};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

use tourdesk_api::db::memory::{MemoryBookingStore, MemoryDirectory};
use tourdesk_api::db::store::ResourceDirectory;
use tourdesk_api::middleware::auth::{issue_token, AuthConfig};
use tourdesk_api::models::account::UserRole;
use tourdesk_api::models::booking::{
    BookingEvent, BookingRequest, BookingType, PassengerInput, TripType,
};
use tourdesk_api::models::directory::{Customer, Driver, KycStatus, Package, Vehicle};
use tourdesk_api::models::fleet::PricingCatalog;
use tourdesk_api::routes::AppServices;
use tourdesk_api::services::booking_service::BookingService;
use tourdesk_api::services::clock::{Clock, ManualClock};
use tourdesk_api::services::dashboard_service::DashboardService;
use tourdesk_api::services::events::ChannelPublisher;

pub const ADMIN_ID: &str = "admin-1";
pub const AGENT_ID: &str = "agent-7";

/// 2026-11-01 10:00 at +05:30.
pub fn start_of_test() -> DateTime {
    DateTime::from_chrono(Utc.with_ymd_and_hms(2026, 11, 1, 4, 30, 0).unwrap())
}

pub struct TestApp {
    pub services: AppServices<MemoryBookingStore, MemoryDirectory>,
    pub store: MemoryBookingStore,
    pub directory: MemoryDirectory,
    pub clock: Arc<ManualClock>,
    pub events: UnboundedReceiver<BookingEvent>,
    pub auth: AuthConfig,
}

impl TestApp {
    pub fn new() -> Self {
        let catalog = Arc::new(PricingCatalog::embedded_default().unwrap());
        let clock = Arc::new(ManualClock::new(start_of_test()));
        let (publisher, events) = ChannelPublisher::new();
        let store = MemoryBookingStore::new();
        let directory = MemoryDirectory::new();
        let auth = AuthConfig {
            secret: "integration-secret".to_string(),
            ttl_hours: 1,
        };

        let shared_clock: Arc<dyn Clock> = clock.clone();
        let bookings = BookingService::new(
            store.clone(),
            directory.clone(),
            catalog.clone(),
            Arc::new(publisher),
            shared_clock.clone(),
        );
        let dashboard = DashboardService::new(store.clone(), catalog, shared_clock);

        Self {
            services: AppServices::new(bookings, dashboard, auth.clone()),
            store,
            directory,
            clock,
            events,
            auth,
        }
    }

    pub fn create_app(
        &self,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        let services = self.services.clone();
        App::new().configure(move |cfg| services.configure(cfg))
    }

    pub fn service(&self) -> &BookingService<MemoryBookingStore, MemoryDirectory> {
        &self.services.bookings
    }

    pub fn admin_token(&self) -> String {
        issue_token(&self.auth, ADMIN_ID, "admin@example.com", UserRole::Admin).unwrap()
    }

    pub fn agent_token(&self) -> String {
        issue_token(&self.auth, AGENT_ID, "agent@example.com", UserRole::User).unwrap()
    }

    pub async fn seed_customer(&self, active: bool) -> ObjectId {
        self.directory
            .insert(&Customer {
                id: None,
                name: "Asha Rao".to_string(),
                phone: "+919800000001".to_string(),
                email: Some("asha@example.com".to_string()),
                is_active: active,
                created_at: None,
                updated_at: None,
            })
            .await
            .unwrap()
    }

    pub async fn seed_package(&self, active: bool) -> ObjectId {
        self.directory
            .insert(&Package {
                id: None,
                name: "Coorg Weekend".to_string(),
                description: Some("Two days in the hills".to_string()),
                duration_days: 2,
                price_per_person: 4500.0,
                is_active: active,
                created_at: None,
                updated_at: None,
            })
            .await
            .unwrap()
    }

    pub async fn seed_driver(&self, name: &str, kyc_status: KycStatus) -> ObjectId {
        self.directory
            .insert(&Driver {
                id: None,
                name: name.to_string(),
                phone: "+919800000002".to_string(),
                license_number: format!("KA01-{}", name.len()),
                kyc_status,
                is_active: true,
                reservations: vec![],
                created_at: None,
                updated_at: None,
            })
            .await
            .unwrap()
    }

    pub async fn seed_vehicle(&self, category: &str, seating_capacity: u32) -> ObjectId {
        self.directory
            .insert(&Vehicle {
                id: None,
                registration_number: "KA05MN4421".to_string(),
                model: "Toyota Etios".to_string(),
                category: category.to_string(),
                seating_capacity,
                is_active: true,
                reservations: vec![],
                created_at: None,
                updated_at: None,
            })
            .await
            .unwrap()
    }
}

/// Outstation round trip of 150 km in a Sedan, picked up at 12:00 local
/// the day after [`start_of_test`].
pub fn outstation_request(customer_id: ObjectId) -> BookingRequest {
    BookingRequest {
        customer_id: customer_id.to_hex(),
        booking_type: BookingType::Outstation,
        trip_type: TripType::RoundTrip,
        pickup_address: "MG Road, Bengaluru".to_string(),
        dropoff_address: Some("Mysuru Palace".to_string()),
        stops: vec![],
        start_date: Some(Utc.with_ymd_and_hms(2026, 11, 2, 6, 30, 0).unwrap()),
        end_date: Some(Utc.with_ymd_and_hms(2026, 11, 2, 14, 30, 0).unwrap()),
        passengers: PassengerInput {
            adults: 2,
            children: 1,
            infants: 0,
            total_count: Some(3),
        },
        vehicle_category: "Sedan".to_string(),
        distance_km: 150.0,
        duration_hours: None,
        package_id: None,
        special_requests: None,
        is_night_trip: None,
        is_peak_hour: None,
    }
}

pub fn outstation_json(customer_id: ObjectId) -> Value {
    json!({
        "customer_id": customer_id.to_hex(),
        "booking_type": "outstation",
        "trip_type": "round_trip",
        "pickup_address": "MG Road, Bengaluru",
        "dropoff_address": "Mysuru Palace",
        "start_date": "2026-11-02T06:30:00Z",
        "end_date": "2026-11-02T14:30:00Z",
        "passengers": { "adults": 2, "children": 1, "infants": 0, "total_count": 3 },
        "vehicle_category": "Sedan",
        "distance_km": 150.0
    })
}

/// Calls the app and returns status and JSON body, turning middleware
/// errors into the response the server would send.
pub async fn send<S, R, B>(app: &S, req: R) -> (StatusCode, Value)
where
    S: Service<R, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    match app.call(req).await {
        Ok(resp) => {
            let status = resp.status();
            let body = actix_web::test::read_body(resp).await;
            (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
        }
        Err(err) => {
            let resp = err.error_response();
            let status = resp.status();
            let body = to_bytes(resp.into_body()).await.unwrap_or_default();
            (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
        }
    }
}

pub fn oid(value: &Value) -> String {
    value["$oid"].as_str().unwrap_or_default().to_string()
}
