//! Middleware de la API

pub mod auth;
pub mod cors;

pub use auth::AuthenticatedUser;
