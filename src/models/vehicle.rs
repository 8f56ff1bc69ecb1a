//! Modelo de Vehicle (scooter)
//!
//! Este módulo contiene el struct Vehicle, su estado y la actualización parcial
//! que aplica el relay. Mapea a la tabla `vehicles`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Estado del vehículo - mapea al ENUM vehicle_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "vehicle_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    #[default]
    #[serde(alias = "available")]
    Idle,
    Driving,
    Offline,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Idle => "idle",
            VehicleStatus::Driving => "driving",
            VehicleStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" | "available" => Ok(VehicleStatus::Idle),
            "driving" => Ok(VehicleStatus::Driving),
            "offline" => Ok(VehicleStatus::Offline),
            other => Err(format!("unknown vehicle status '{}'", other)),
        }
    }
}

/// Vehicle principal - mapea exactamente a la tabla vehicles
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: Uuid,
    pub name: String,
    pub battery: f64,
    pub lat: f64,
    pub lon: f64,
    pub speed_kmh: f64,
    pub status: VehicleStatus,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Vehicle {
    /// Crear un vehículo nuevo en reposo
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            battery: 100.0,
            lat,
            lon,
            speed_kmh: 0.0,
            status: VehicleStatus::Idle,
            last_seen_at: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == VehicleStatus::Idle
    }

    /// Aplicar una actualización parcial manteniendo el invariante de estado:
    /// si el estado resultante no es `driving`, la velocidad queda en 0.
    pub fn apply(&mut self, update: &VehicleUpdate) {
        if let Some(battery) = update.battery {
            self.battery = battery.clamp(0.0, 100.0);
        }
        if let Some(lat) = update.lat {
            self.lat = lat;
        }
        if let Some(lon) = update.lon {
            self.lon = lon;
        }
        if let Some(speed) = update.speed_kmh {
            self.speed_kmh = speed.max(0.0);
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(seen) = update.last_seen_at {
            self.last_seen_at = Some(seen);
        }
        if self.status != VehicleStatus::Driving {
            self.speed_kmh = 0.0;
        }
    }
}

/// Actualización parcial de un vehículo (campos omitidos no cambian)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleUpdate {
    pub battery: Option<f64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub status: Option<VehicleStatus>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl VehicleUpdate {
    /// Marcar el vehículo como desconectado
    pub fn offline(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(VehicleStatus::Offline),
            last_seen_at: Some(at),
            ..Default::default()
        }
    }

    /// Posición reportada, si vienen ambas coordenadas
    pub fn position(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_driving_status_forces_zero_speed() {
        let mut vehicle = Vehicle::new("S-1", 40.0, -3.0);
        vehicle.apply(&VehicleUpdate {
            status: Some(VehicleStatus::Driving),
            speed_kmh: Some(18.0),
            ..Default::default()
        });
        assert_eq!(vehicle.speed_kmh, 18.0);

        vehicle.apply(&VehicleUpdate {
            status: Some(VehicleStatus::Idle),
            ..Default::default()
        });
        assert_eq!(vehicle.speed_kmh, 0.0);
    }

    #[test]
    fn test_speed_update_without_status_is_zeroed_when_idle() {
        let mut vehicle = Vehicle::new("S-2", 40.0, -3.0);
        vehicle.apply(&VehicleUpdate {
            speed_kmh: Some(12.0),
            battery: Some(55.0),
            ..Default::default()
        });
        assert_eq!(vehicle.speed_kmh, 0.0);
        assert_eq!(vehicle.battery, 55.0);
    }

    #[test]
    fn test_battery_is_clamped() {
        let mut vehicle = Vehicle::new("S-3", 0.0, 0.0);
        vehicle.apply(&VehicleUpdate {
            battery: Some(140.0),
            ..Default::default()
        });
        assert_eq!(vehicle.battery, 100.0);
        vehicle.apply(&VehicleUpdate {
            battery: Some(-3.0),
            ..Default::default()
        });
        assert_eq!(vehicle.battery, 0.0);
    }

    #[test]
    fn test_status_parsing_accepts_available() {
        assert_eq!("available".parse::<VehicleStatus>(), Ok(VehicleStatus::Idle));
        assert_eq!("DRIVING".parse::<VehicleStatus>(), Ok(VehicleStatus::Driving));
        assert!("parked".parse::<VehicleStatus>().is_err());
    }
}
