//! Cliente de dispositivo
//!
//! Corre dentro del patinete (o del simulador): mantiene la conexión con el
//! relay, reporta telemetría según el modo y obedece los comandos START/STOP.

pub mod client;
pub mod config;
pub mod sensors;
pub mod state;

pub use client::{ClientPhase, ClientStatus, DeviceClient, DeviceHandle};
pub use config::DeviceConfig;
pub use sensors::{BatteryModel, BatterySensor, LocationSensor, SensorAdapter, SpeedSensor};
pub use state::{DeviceState, SensorSnapshot, SharedState};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Sensor '{name}' failed: {message}")]
    Sensor { name: &'static str, message: String },
}
