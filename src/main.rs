use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, App, HttpServer};
use env_logger::Env;
use log::{error, info, warn};

use tourdesk_api::config::{load_catalog, AppConfig};
use tourdesk_api::db::memory::{MemoryBookingStore, MemoryDirectory};
use tourdesk_api::db::mongo::{create_mongo_client, MongoBookingStore, MongoDirectory};
use tourdesk_api::db::store::{BookingStore, ResourceDirectory};
use tourdesk_api::errors::BookingError;
use tourdesk_api::middleware::auth::AuthConfig;
use tourdesk_api::routes::AppServices;
use tourdesk_api::services::booking_service::BookingService;
use tourdesk_api::services::clock::{Clock, SystemClock};
use tourdesk_api::services::dashboard_service::DashboardService;
use tourdesk_api::services::events::{
    EventPublisher, FanoutPublisher, LogPublisher, MongoEventPublisher,
};

fn startup_error(err: BookingError) -> io::Error {
    error!("Startup failed: {}", err);
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    if cfg!(debug_assertions) {
        dotenv::dotenv().ok();
    }
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(startup_error)?;
    let auth = AuthConfig {
        secret: config.jwt_secret.clone(),
        ttl_hours: config.token_ttl_hours,
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match config.mongodb_uri.as_deref() {
        Some(uri) => {
            let client = create_mongo_client(uri).await.map_err(startup_error)?;
            let database = client.database(&config.mongodb_database);
            let catalog = Arc::new(
                load_catalog(&config, Some(&database))
                    .await
                    .map_err(startup_error)?,
            );

            let store = MongoBookingStore::new(&database);
            if let Err(e) = store.ensure_indexes().await {
                warn!("Could not create booking indexes: {}", e);
            }
            let events: Arc<dyn EventPublisher> = Arc::new(FanoutPublisher::new(vec![
                Arc::new(LogPublisher),
                Arc::new(MongoEventPublisher::new(&database)),
            ]));

            let bookings = BookingService::new(
                store.clone(),
                MongoDirectory::new(&database),
                catalog.clone(),
                events,
                clock.clone(),
            );
            let dashboard = DashboardService::new(store, catalog, clock);
            serve(&config, AppServices::new(bookings, dashboard, auth)).await
        }
        None => {
            warn!("MONGODB_URI is not set; bookings are kept in memory and lost on restart");
            let catalog = Arc::new(load_catalog(&config, None).await.map_err(startup_error)?);
            let store = MemoryBookingStore::new();
            let bookings = BookingService::new(
                store.clone(),
                MemoryDirectory::new(),
                catalog.clone(),
                Arc::new(LogPublisher),
                clock.clone(),
            );
            let dashboard = DashboardService::new(store, catalog, clock);
            serve(&config, AppServices::new(bookings, dashboard, auth)).await
        }
    }
}

async fn serve<S, D>(config: &AppConfig, services: AppServices<S, D>) -> io::Result<()>
where
    S: BookingStore + Send + Sync + 'static,
    D: ResourceDirectory + Send + Sync + 'static,
{
    let allowed_origin = config.allowed_origin.clone();
    info!("Starting HTTP server on {}:{}", config.host, config.port);

    HttpServer::new(move || {
        let cors = match &allowed_origin {
            Some(origin) => Cors::default().allowed_origin(origin),
            None => Cors::default().allow_any_origin(),
        }
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);
        let services = services.clone();

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .configure(move |cfg| services.configure(cfg))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
