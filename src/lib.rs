//! Scooter fleet
//!
//! Relay de telemetría para una flota de patinetes, cliente de dispositivo y
//! ciclo de alquiler con tarificación por geocercas.

pub mod config;
pub mod controllers;
pub mod device;
pub mod dto;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod protocol;
pub mod relay;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
