//! Shared application state
//!
//! Este módulo define el estado compartido de la aplicación que se pasa
//! a través del router de Axum.

use std::sync::Arc;

use crate::config::environment::EnvironmentConfig;
use crate::metrics::Metrics;
use crate::relay::Relay;
use crate::repositories::Store;
use crate::services::rental_service::RentalService;

#[derive(Clone)]
pub struct AppState {
    pub config: EnvironmentConfig,
    pub store: Store,
    pub relay: Relay,
    pub rentals: Arc<RentalService>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: EnvironmentConfig, store: Store, metrics: Metrics) -> Self {
        let relay = Relay::new(store.clone(), config.telemetry, metrics.clone());
        let rentals = Arc::new(RentalService::new(
            store.clone(),
            relay.clone(),
            metrics.clone(),
        ));

        Self {
            config,
            store,
            relay,
            rentals,
            metrics,
        }
    }
}
