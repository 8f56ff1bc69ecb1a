//! Métricas Prometheus
//!
//! Registro propio (no el global) para que cada instancia del servidor y cada
//! test tenga contadores independientes.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub connections_open: IntGauge,
    pub state_updates: IntCounter,
    pub commands_delivered: IntCounter,
    pub commands_undelivered: IntCounter,
    pub protocol_violations: IntCounter,
    pub rentals_opened: IntCounter,
    pub rentals_closed: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("scooter_fleet".to_string()), None)?;

        let metrics = Self {
            connections_open: IntGauge::new("relay_connections_open", "Conexiones WebSocket abiertas")?,
            state_updates: IntCounter::new("relay_state_updates_total", "STATE aceptados y persistidos")?,
            commands_delivered: IntCounter::new(
                "relay_commands_delivered_total",
                "Comandos entregados a un grupo existente",
            )?,
            commands_undelivered: IntCounter::new(
                "relay_commands_undelivered_total",
                "Comandos para vehículos sin conexión",
            )?,
            protocol_violations: IntCounter::new(
                "relay_protocol_violations_total",
                "Conexiones cerradas por violación de protocolo",
            )?,
            rentals_opened: IntCounter::new("rentals_opened_total", "Alquileres iniciados")?,
            rentals_closed: IntCounter::new("rentals_closed_total", "Alquileres finalizados")?,
            registry,
        };

        metrics.registry.register(Box::new(metrics.connections_open.clone()))?;
        metrics.registry.register(Box::new(metrics.state_updates.clone()))?;
        metrics.registry.register(Box::new(metrics.commands_delivered.clone()))?;
        metrics.registry.register(Box::new(metrics.commands_undelivered.clone()))?;
        metrics.registry.register(Box::new(metrics.protocol_violations.clone()))?;
        metrics.registry.register(Box::new(metrics.rentals_opened.clone()))?;
        metrics.registry.register(Box::new(metrics.rentals_closed.clone()))?;

        Ok(metrics)
    }

    /// Exportar en formato texto de Prometheus
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
