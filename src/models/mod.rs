pub mod account;
pub mod booking;
pub mod dashboard;
pub mod directory;
pub mod fleet;
