pub mod booking_service;
pub mod clock;
pub mod dashboard_service;
pub mod events;
pub mod pricing_service;
