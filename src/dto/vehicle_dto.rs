use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::models::GeoPoint;
use crate::protocol::{coerce_f64, Command, CommandAction, TelemetryUpdate};

// Response de la ubicación actual
#[derive(Debug, Serialize, Deserialize)]
pub struct LocationResponse {
    pub current: Option<GeoPoint>,
}

// Request para corregir la posición de un vehículo.
// Los valores llegan sin tipar para poder rechazar lo no numérico con 400.
#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    #[serde(default)]
    pub lat: Value,
    #[serde(default)]
    pub lng: Value,
}

#[derive(Debug, Clone, Copy, Validate)]
pub struct ValidatedLocation {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
}

impl UpdateLocationRequest {
    /// `None` si alguno de los dos valores no es numérico
    pub fn numeric(&self) -> Option<ValidatedLocation> {
        Some(ValidatedLocation {
            lat: coerce_f64(&self.lat)?,
            lng: coerce_f64(&self.lng)?,
        })
    }
}

// Request para enviar un comando manual
#[derive(Debug, Deserialize)]
pub struct SendCommandRequest {
    pub action: Option<CommandAction>,
    pub telemetry: Option<TelemetryUpdate>,
}

impl From<SendCommandRequest> for Command {
    fn from(request: SendCommandRequest) -> Self {
        Command {
            action: request.action,
            telemetry: request.telemetry,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub delivered: bool,
}
