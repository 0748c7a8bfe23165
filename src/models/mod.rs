pub mod driver;
pub mod event;
pub mod location;
pub mod order;
pub mod route;
pub mod sale;
pub mod tracking;
