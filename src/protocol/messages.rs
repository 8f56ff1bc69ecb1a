//! Mensajes del protocolo relay ↔ dispositivo/dashboard
//!
//! Todos los frames son objetos JSON con un campo `type`:
//!
//! ```text
//! → HELLO {scooterId, role?}
//! ← INIT  {serverTime, telemetry{activeIntervalMs, idleIntervalMs}, state{..., mode}}
//! → STATE {battery?, lat?, lon?, speedKmh?, status?}
//! ← STATE {scooterId, state, serverTime}
//! ← CMD   {action: START|STOP, telemetry?}
//! ```
//!
//! Un `type` desconocido no deserializa: el receptor decide si es una
//! violación de protocolo o un frame que se descarta.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::vehicle::{Vehicle, VehicleStatus, VehicleUpdate};

/// Intervalos de telemetría del dispositivo
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryConfig {
    pub active_interval_ms: u64,
    pub idle_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            active_interval_ms: 2_000,
            idle_interval_ms: 10_000,
        }
    }
}

impl TelemetryConfig {
    /// Aplicar una actualización parcial; los intervalos a cero se ignoran
    pub fn apply(&mut self, update: &TelemetryUpdate) {
        if let Some(active) = update.active_interval_ms.filter(|ms| *ms > 0) {
            self.active_interval_ms = active;
        }
        if let Some(idle) = update.idle_interval_ms.filter(|ms| *ms > 0) {
            self.idle_interval_ms = idle;
        }
    }

    pub fn interval_ms(&self, mode: Mode) -> u64 {
        match mode {
            Mode::Active => self.active_interval_ms,
            Mode::Idle => self.idle_interval_ms,
        }
    }
}

/// Telemetría enviada dentro de un CMD
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_interval_ms: Option<u64>,
}

/// Modo local del dispositivo
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Idle,
    Active,
}

impl Mode {
    pub fn for_status(status: VehicleStatus) -> Self {
        if status == VehicleStatus::Driving {
            Mode::Active
        } else {
            Mode::Idle
        }
    }
}

/// Rol de una conexión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Conexión autoritativa del vehículo físico
    Device,
    /// Dashboard de sólo lectura
    Viewer,
}

impl Role {
    /// `admin`/`viewer` son observadores; cualquier otro valor es `device`
    pub fn parse(role: Option<&str>) -> Self {
        match role.map(|r| r.trim().to_ascii_lowercase()) {
            Some(r) if r == "admin" || r == "viewer" => Role::Viewer,
            _ => Role::Device,
        }
    }
}

/// Acción de un comando
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandAction {
    Start,
    Stop,
}

/// Comando del servidor hacia el dispositivo
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Command {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<CommandAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<TelemetryUpdate>,
}

impl Command {
    pub fn start() -> Self {
        Self {
            action: Some(CommandAction::Start),
            telemetry: None,
        }
    }

    pub fn stop() -> Self {
        Self {
            action: Some(CommandAction::Stop),
            telemetry: None,
        }
    }
}

/// STATE enviado por el dispositivo; los campos omitidos no cambian.
///
/// Los números llegan a veces como strings; se coercionan y lo que no se
/// puede interpretar se trata como omitido.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatePatch {
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub battery: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
    #[serde(default, deserialize_with = "lenient_status", skip_serializing_if = "Option::is_none")]
    pub status: Option<VehicleStatus>,
    #[serde(default, deserialize_with = "lenient_datetime", skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl StatePatch {
    /// Normalizar a una actualización persistible sellada con `now`
    pub fn normalize(&self, now: DateTime<Utc>) -> VehicleUpdate {
        VehicleUpdate {
            battery: self.battery.map(|b| b.clamp(0.0, 100.0)),
            lat: self.lat.filter(|lat| (-90.0..=90.0).contains(lat)),
            lon: self.lon.filter(|lon| (-180.0..=180.0).contains(lon)),
            speed_kmh: self.speed_kmh.map(|s| s.max(0.0)),
            status: self.status,
            last_seen_at: Some(now),
        }
    }
}

/// Mensajes que envían dispositivos y dashboards al relay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ClientMessage {
    Hello {
        #[serde(rename = "scooterId")]
        scooter_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
    State(StatePatch),
}

/// Estado público de un vehículo dentro de INIT/STATE
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehicleState {
    pub battery: f64,
    pub lat: f64,
    pub lon: f64,
    pub speed_kmh: f64,
    pub status: VehicleStatus,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            battery: 100.0,
            lat: 0.0,
            lon: 0.0,
            speed_kmh: 0.0,
            status: VehicleStatus::Idle,
            last_seen_at: None,
        }
    }
}

impl From<&Vehicle> for VehicleState {
    fn from(vehicle: &Vehicle) -> Self {
        Self {
            battery: vehicle.battery,
            lat: vehicle.lat,
            lon: vehicle.lon,
            speed_kmh: vehicle.speed_kmh,
            status: vehicle.status,
            last_seen_at: vehicle.last_seen_at,
        }
    }
}

/// Estado inicial entregado en INIT
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitState {
    #[serde(flatten)]
    pub state: VehicleState,
    pub mode: Mode,
}

impl From<VehicleState> for InitState {
    fn from(state: VehicleState) -> Self {
        Self {
            mode: Mode::for_status(state.status),
            state,
        }
    }
}

/// Mensajes que emite el relay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ServerMessage {
    Init {
        #[serde(rename = "serverTime")]
        server_time: DateTime<Utc>,
        telemetry: TelemetryConfig,
        state: InitState,
    },
    State {
        #[serde(rename = "scooterId")]
        scooter_id: Uuid,
        state: VehicleState,
        #[serde(rename = "serverTime")]
        server_time: DateTime<Utc>,
    },
    Cmd(Command),
}

impl ServerMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Interpretar un número que puede venir como string
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_f64))
}

fn lenient_status<'de, D>(deserializer: D) -> Result<Option<VehicleStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok()))
}

fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hello_role_is_optional() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "HELLO", "scooterId": "abc"})).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Hello {
                scooter_id: "abc".to_string(),
                role: None
            }
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_value::<ClientMessage>(json!({"type": "PING"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_state_coerces_numeric_strings() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "STATE",
            "battery": "87.5",
            "lat": 40.4,
            "speedKmh": "fast",
            "status": "driving"
        }))
        .unwrap();
        let ClientMessage::State(patch) = msg else {
            panic!("expected STATE");
        };
        assert_eq!(patch.battery, Some(87.5));
        assert_eq!(patch.lat, Some(40.4));
        assert_eq!(patch.speed_kmh, None);
        assert_eq!(patch.status, Some(VehicleStatus::Driving));
    }

    #[test]
    fn test_normalize_clamps_battery_and_stamps_time() {
        let patch = StatePatch {
            battery: Some(250.0),
            speed_kmh: Some(-4.0),
            ..Default::default()
        };
        let now = Utc::now();
        let update = patch.normalize(now);
        assert_eq!(update.battery, Some(100.0));
        assert_eq!(update.speed_kmh, Some(0.0));
        assert_eq!(update.last_seen_at, Some(now));
    }

    #[test]
    fn test_role_defaults_to_device() {
        assert_eq!(Role::parse(None), Role::Device);
        assert_eq!(Role::parse(Some("device")), Role::Device);
        assert_eq!(Role::parse(Some("something")), Role::Device);
        assert_eq!(Role::parse(Some("admin")), Role::Viewer);
        assert_eq!(Role::parse(Some("viewer")), Role::Viewer);
    }

    #[test]
    fn test_init_wire_shape() {
        let msg = ServerMessage::Init {
            server_time: Utc::now(),
            telemetry: TelemetryConfig::default(),
            state: InitState::from(VehicleState {
                status: VehicleStatus::Driving,
                speed_kmh: 12.0,
                ..Default::default()
            }),
        };
        let json: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "INIT");
        assert_eq!(json["telemetry"]["activeIntervalMs"], 2000);
        assert_eq!(json["state"]["speedKmh"], 12.0);
        assert_eq!(json["state"]["mode"], "active");
        assert!(json["serverTime"].is_string());
    }

    #[test]
    fn test_cmd_wire_shape() {
        let json: Value =
            serde_json::from_str(&ServerMessage::Cmd(Command::start()).encode().unwrap()).unwrap();
        assert_eq!(json, json!({"type": "CMD", "action": "START"}));

        let parsed: ServerMessage = serde_json::from_value(json!({
            "type": "CMD",
            "telemetry": {"activeIntervalMs": 500}
        }))
        .unwrap();
        let ServerMessage::Cmd(cmd) = parsed else {
            panic!("expected CMD");
        };
        assert_eq!(cmd.action, None);
        assert_eq!(cmd.telemetry.and_then(|t| t.active_interval_ms), Some(500));
    }

    #[test]
    fn test_telemetry_apply_ignores_zero() {
        let mut telemetry = TelemetryConfig::default();
        telemetry.apply(&TelemetryUpdate {
            active_interval_ms: Some(0),
            idle_interval_ms: Some(30_000),
        });
        assert_eq!(telemetry.active_interval_ms, 2_000);
        assert_eq!(telemetry.idle_interval_ms, 30_000);
        assert_eq!(telemetry.interval_ms(Mode::Idle), 30_000);
    }
}
