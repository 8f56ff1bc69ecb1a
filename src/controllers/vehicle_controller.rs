use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::dto::vehicle_dto::{
    CommandResponse, LocationResponse, SendCommandRequest, UpdateLocationRequest,
};
use crate::models::{Position, Vehicle, VehicleUpdate};
use crate::protocol::Command;
use crate::relay::Relay;
use crate::repositories::Store;
use crate::utils::errors::{bad_request_error, not_found_error, AppError};

pub struct VehicleController {
    store: Store,
    relay: Relay,
}

impl VehicleController {
    pub fn new(store: Store, relay: Relay) -> Self {
        Self { store, relay }
    }

    pub async fn list(&self) -> Result<Vec<Vehicle>, AppError> {
        Ok(self.store.vehicles.list().await?)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Vehicle, AppError> {
        self.store
            .vehicles
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found_error("Vehicle", &id.to_string()))
    }

    pub async fn location(&self, id: Uuid) -> Result<LocationResponse, AppError> {
        self.get_by_id(id).await?;
        let location = self.store.locations.find(id).await?;

        Ok(LocationResponse {
            current: location.and_then(|l| l.current).map(|p| p.point()),
        })
    }

    pub async fn location_history(&self, id: Uuid) -> Result<Vec<Position>, AppError> {
        self.get_by_id(id).await?;
        Ok(self.store.locations.history_since(id, 0).await?)
    }

    /// Corrección manual de la posición: se registra como una posición reportada
    pub async fn correct_location(
        &self,
        id: Uuid,
        request: UpdateLocationRequest,
    ) -> Result<LocationResponse, AppError> {
        let location = request
            .numeric()
            .ok_or_else(|| bad_request_error("lat and lng must be numeric"))?;
        location.validate()?;

        let now = Utc::now();
        let update = VehicleUpdate {
            lat: Some(location.lat),
            lon: Some(location.lng),
            ..Default::default()
        };
        self.store
            .vehicles
            .apply_update(id, &update)
            .await?
            .ok_or_else(|| not_found_error("Vehicle", &id.to_string()))?;

        let recorded = self
            .store
            .locations
            .record_position(id, &Position::new(location.lat, location.lng, now))
            .await?;
        info!("📍 Posición del scooter {} corregida a ({}, {})", id, location.lat, location.lng);

        Ok(LocationResponse {
            current: recorded.current.map(|p| p.point()),
        })
    }

    pub async fn send_command(
        &self,
        id: Uuid,
        request: SendCommandRequest,
    ) -> Result<CommandResponse, AppError> {
        self.get_by_id(id).await?;
        let command: Command = request.into();
        if command.action.is_none() && command.telemetry.is_none() {
            return Err(bad_request_error("command needs an action or telemetry"));
        }

        let delivered = self.relay.send_command(id, command).await;
        Ok(CommandResponse { delivered })
    }
}
