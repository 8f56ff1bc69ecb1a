//! Configuración del cliente de dispositivo

use std::env;
use std::time::Duration;

use crate::config::environment::parse_or;
use crate::config::ConfigError;

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub relay_url: String,
    pub scooter_id: String,
    /// Espera fija entre reconexiones
    pub reconnect_delay: Duration,
    pub battery_tick: Duration,
    pub initial_position: Option<(f64, f64)>,
}

impl DeviceConfig {
    pub fn new(relay_url: impl Into<String>, scooter_id: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            scooter_id: scooter_id.into(),
            reconnect_delay: Duration::from_millis(2_000),
            battery_tick: Duration::from_millis(1_000),
            initial_position: None,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let relay_url =
            env::var("RELAY_URL").unwrap_or_else(|_| "ws://localhost:3000/ws".to_string());
        let scooter_id = env::var("SCOOTER_ID").map_err(|_| ConfigError::Missing("SCOOTER_ID"))?;

        let initial_position = match (env::var("SIM_LAT"), env::var("SIM_LON")) {
            (Ok(_), Ok(_)) => Some((parse_or("SIM_LAT", 0.0)?, parse_or("SIM_LON", 0.0)?)),
            _ => None,
        };

        Ok(Self {
            relay_url,
            scooter_id,
            reconnect_delay: Duration::from_millis(parse_or("RECONNECT_DELAY_MS", 2_000)?),
            battery_tick: Duration::from_millis(parse_or("BATTERY_TICK_MS", 1_000)?),
            initial_position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::new("ws://localhost:3000/ws", "abc");
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.battery_tick, Duration::from_secs(1));
        assert!(config.initial_position.is_none());
    }
}
