pub mod bookings;
pub mod dashboard;
pub mod directory;
pub mod health;

use actix_web::web;

use crate::db::store::{BookingStore, ResourceDirectory};
use crate::errors::BookingError;
use crate::middleware::auth::{AuthConfig, AuthMiddleware};
use crate::middleware::role_auth::RequireRole;
use crate::models::account::UserRole;
use crate::services::booking_service::BookingService;
use crate::services::dashboard_service::DashboardService;

/// Everything the HTTP layer needs, shared across workers.
pub struct AppServices<S, D> {
    pub bookings: web::Data<BookingService<S, D>>,
    pub dashboard: web::Data<DashboardService<S>>,
    pub auth: web::Data<AuthConfig>,
}

impl<S, D> Clone for AppServices<S, D> {
    fn clone(&self) -> Self {
        Self {
            bookings: self.bookings.clone(),
            dashboard: self.dashboard.clone(),
            auth: self.auth.clone(),
        }
    }
}

impl<S, D> AppServices<S, D>
where
    S: BookingStore + 'static,
    D: ResourceDirectory + 'static,
{
    pub fn new(
        bookings: BookingService<S, D>,
        dashboard: DashboardService<S>,
        auth: AuthConfig,
    ) -> Self {
        Self {
            bookings: web::Data::new(bookings),
            dashboard: web::Data::new(dashboard),
            auth: web::Data::new(auth),
        }
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.bookings.clone())
            .app_data(self.dashboard.clone())
            .app_data(self.auth.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                BookingError::InvalidInput(err.to_string()).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                BookingError::InvalidInput(err.to_string()).into()
            }))
            .app_data(web::PathConfig::default().error_handler(|err, _req| {
                BookingError::InvalidInput(err.to_string()).into()
            }))
            .route("/health", web::get().to(health::health_check::<S, D>))
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware)
                    .service(
                        web::scope("/admin")
                            .wrap(RequireRole::new(UserRole::Admin))
                            .route("/dashboard", web::get().to(dashboard::summary::<S>))
                            .route(
                                "/bookings/repair-completion",
                                web::post().to(bookings::repair_completion::<S, D>),
                            )
                            .route(
                                "/bookings/{reference}/assign",
                                web::post().to(bookings::assign::<S, D>),
                            )
                            .route(
                                "/bookings/{reference}/status",
                                web::post().to(bookings::advance_status::<S, D>),
                            )
                            .configure(directory::admin_routes::<S, D>),
                    )
                    .service(
                        web::scope("/bookings")
                            .route("/quote", web::post().to(bookings::quote::<S, D>))
                            .route("", web::post().to(bookings::create::<S, D>))
                            .route("", web::get().to(bookings::list::<S, D>))
                            .route("/{reference}", web::get().to(bookings::get::<S, D>))
                            .route(
                                "/{reference}/cancel",
                                web::post().to(bookings::cancel::<S, D>),
                            ),
                    )
                    .configure(directory::routes::<S, D>),
            );
    }
}
