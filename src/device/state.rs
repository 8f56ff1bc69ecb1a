//! Estado local del dispositivo
//!
//! Compartido entre el cliente y los sensores (`SharedState`); los sensores
//! que reciben overrides escriben aquí al instante.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::VehicleStatus;
use crate::protocol::{Mode, StatePatch, VehicleState};

pub type SharedState = Arc<RwLock<DeviceState>>;

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub battery: f64,
    pub lat: f64,
    pub lon: f64,
    pub speed_kmh: f64,
    pub status: VehicleStatus,
    pub mode: Mode,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            battery: 100.0,
            lat: 0.0,
            lon: 0.0,
            speed_kmh: 0.0,
            status: VehicleStatus::Idle,
            mode: Mode::Idle,
            last_seen_at: None,
        }
    }
}

impl DeviceState {
    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    /// Copiar el estado que el servidor envía en INIT
    pub fn apply_server_state(&mut self, state: &VehicleState) {
        self.battery = state.battery;
        self.lat = state.lat;
        self.lon = state.lon;
        self.speed_kmh = state.speed_kmh;
        self.status = state.status;
    }

    pub fn apply_snapshot(&mut self, snapshot: &SensorSnapshot) {
        if let Some(battery) = snapshot.battery {
            self.battery = battery;
        }
        if let Some(lat) = snapshot.lat {
            self.lat = lat;
        }
        if let Some(lon) = snapshot.lon {
            self.lon = lon;
        }
        if let Some(speed) = snapshot.speed_kmh {
            self.speed_kmh = speed;
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        match mode {
            Mode::Active => self.status = VehicleStatus::Driving,
            Mode::Idle => {
                self.status = VehicleStatus::Idle;
                self.speed_kmh = 0.0;
            }
        }
    }

    pub fn to_patch(&self) -> StatePatch {
        StatePatch {
            battery: Some(self.battery),
            lat: Some(self.lat),
            lon: Some(self.lon),
            speed_kmh: Some(self.speed_kmh),
            status: Some(self.status),
            last_seen_at: self.last_seen_at,
        }
    }
}

/// Lectura parcial de uno o varios sensores
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSnapshot {
    pub battery: Option<f64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub speed_kmh: Option<f64>,
}

impl SensorSnapshot {
    /// Combinar por clave; las claves presentes en `other` sobrescriben
    pub fn merge(&mut self, other: SensorSnapshot) {
        self.battery = other.battery.or(self.battery);
        self.lat = other.lat.or(self.lat);
        self.lon = other.lon.or(self.lon);
        self.speed_kmh = other.speed_kmh.or(self.speed_kmh);
    }
}
