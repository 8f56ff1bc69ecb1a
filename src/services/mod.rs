//! Services module
//!
//! Lógica de negocio: geocercas, tarificación y ciclo de alquiler.

pub mod geofence;
pub mod pricing_service;
pub mod rental_service;

pub use pricing_service::{ParkingCheck, ParkingFailure, PriceQuote};
pub use rental_service::{RentalError, RentalService, RentalStarted};
