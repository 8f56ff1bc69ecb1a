//! Modelos del sistema
//!
//! Este módulo contiene los modelos de datos que mapean al schema PostgreSQL
//! (ver `migrations/`).

pub mod location;
pub mod rental;
pub mod user;
pub mod vehicle;
pub mod zone;

pub use location::{GeoPoint, Location, Position};
pub use rental::Rental;
pub use user::{Membership, MembershipStatus, MembershipTier, User};
pub use vehicle::{Vehicle, VehicleStatus, VehicleUpdate};
pub use zone::{Zone, ZoneGeometry, ZoneKind, ZoneShape};
