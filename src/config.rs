use std::env;
use std::path::PathBuf;

use log::{info, warn};
use mongodb::Database;

use crate::db::mongo::load_vehicle_categories;
use crate::errors::BookingError;
use crate::models::fleet::PricingCatalog;

const HOST: &str = "0.0.0.0";
const PORT: u16 = 8080;
const DATABASE: &str = "TourDesk";
const TOKEN_TTL_HOURS: i64 = 12;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Without a URI the API runs on the in-memory store.
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub pricing_catalog_path: Option<PathBuf>,
    pub allowed_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, BookingError> {
        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| BookingError::Configuration(format!("PORT is not a port: {}", raw)))?,
            Err(_) => PORT,
        };
        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| BookingError::Configuration("JWT_SECRET must be set".to_string()))?;

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| HOST.to_string()),
            port,
            mongodb_uri: env::var("MONGODB_URI").ok().filter(|s| !s.trim().is_empty()),
            mongodb_database: env::var("MONGODB_DATABASE").unwrap_or_else(|_| DATABASE.to_string()),
            jwt_secret,
            token_ttl_hours: env::var("TOKEN_TTL_HOURS")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(TOKEN_TTL_HOURS),
            pricing_catalog_path: env::var("PRICING_CATALOG_PATH").ok().map(PathBuf::from),
            allowed_origin: env::var("ALLOWED_ORIGIN").ok(),
        })
    }
}

/// Loads the pricing catalog once: an explicit file wins, then categories
/// stored in the database, then the catalog compiled into the binary.
pub async fn load_catalog(
    config: &AppConfig,
    database: Option<&Database>,
) -> Result<PricingCatalog, BookingError> {
    if let Some(path) = &config.pricing_catalog_path {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BookingError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let catalog = PricingCatalog::from_json(&raw)?;
        info!(
            "Loaded {} vehicle categories from {}",
            catalog.categories.len(),
            path.display()
        );
        return Ok(catalog);
    }

    let catalog = PricingCatalog::embedded_default()?;
    if let Some(database) = database {
        match load_vehicle_categories(database).await {
            Ok(categories) if !categories.is_empty() => {
                info!("Loaded {} vehicle categories from MongoDB", categories.len());
                return catalog.with_categories(categories);
            }
            Ok(_) => info!("No stored pricing profiles, using the built-in catalog"),
            Err(e) => warn!("Could not read pricing profiles, using the built-in catalog: {}", e),
        }
    }
    Ok(catalog)
}
