use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Rental;

// Request para alquilar un vehículo
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRentalRequest {
    #[serde(alias = "scooter")]
    pub scooter_id: Uuid,
}

// Response al crear un alquiler
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalCreatedResponse {
    #[serde(flatten)]
    pub rental: Rental,
    pub vehicle_reachable: bool,
}
