//! Relay de telemetría
//!
//! Acepta conexiones de dispositivos y dashboards, las agrupa por vehículo y
//! retransmite el estado. Cada grupo se crea con su primer miembro y se
//! elimina cuando sale el último.
//!
//! Sólo la conexión con rol `device` puede modificar el estado del vehículo;
//! el STATE aceptado se persiste primero y después se difunde a todo el grupo
//! (incluido el propio dispositivo).

pub mod handler;
pub mod session;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::models::{Position, Vehicle, VehicleUpdate};
use crate::protocol::{
    ClientMessage, Command, InitState, Role, ServerMessage, StatePatch, TelemetryConfig,
    VehicleState, CLOSE_POLICY_VIOLATION,
};
use crate::repositories::{Store, StoreError};

pub use session::{ConnectionId, ConnectionSession, Outbound, SessionPhase};

/// Código de cierre para fallos internos del servidor
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("first message must be HELLO")]
    ExpectedHello,

    #[error("invalid scooterId '{0}'")]
    InvalidScooterId(String),

    #[error("unknown vehicle {0}")]
    UnknownVehicle(Uuid),

    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProtocolError {
    pub fn close_code(&self) -> u16 {
        match self {
            ProtocolError::Store(_) => CLOSE_INTERNAL_ERROR,
            _ => CLOSE_POLICY_VIOLATION,
        }
    }
}

#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    store: Store,
    telemetry: TelemetryConfig,
    metrics: Metrics,
    next_id: AtomicU64,
    sessions: RwLock<HashMap<ConnectionId, ConnectionSession>>,
    groups: RwLock<HashMap<Uuid, HashSet<ConnectionId>>>,
}

impl Relay {
    pub fn new(store: Store, telemetry: TelemetryConfig, metrics: Metrics) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                store,
                telemetry,
                metrics,
                next_id: AtomicU64::new(1),
                sessions: RwLock::new(HashMap::new()),
                groups: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Registrar una conexión nueva; los frames de salida llegan por el receiver
    pub async fn connect(&self) -> (ConnectionId, UnboundedReceiver<Outbound>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        self.inner
            .sessions
            .write()
            .await
            .insert(id, ConnectionSession::new(id, tx));
        self.inner.metrics.connections_open.inc();
        debug!("🔌 Conexión {} abierta", id);

        (id, rx)
    }

    /// Procesar un frame de texto de una conexión.
    ///
    /// Un error implica cerrar la conexión con `ProtocolError::close_code`.
    pub async fn handle_text(&self, conn: ConnectionId, text: &str) -> Result<(), ProtocolError> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                debug!("🗑️ Frame JSON inválido descartado (conexión {}): {}", conn, e);
                return Ok(());
            }
        };

        let phase = self
            .inner
            .sessions
            .read()
            .await
            .get(&conn)
            .map(|s| s.phase)
            .ok_or(ProtocolError::UnknownConnection(conn))?;

        let message = serde_json::from_value::<ClientMessage>(value);

        match phase {
            SessionPhase::AwaitingHello => match message {
                Ok(ClientMessage::Hello { scooter_id, role }) => {
                    self.hello(conn, &scooter_id, role.as_deref()).await
                }
                _ => Err(ProtocolError::ExpectedHello),
            },
            SessionPhase::Joined { scooter_id, role } => match message {
                Ok(ClientMessage::State(patch)) if role == Role::Device => {
                    self.accept_state(scooter_id, &patch).await
                }
                Ok(ClientMessage::State(_)) => {
                    debug!("👀 STATE de un observador ignorado (conexión {})", conn);
                    Ok(())
                }
                Ok(ClientMessage::Hello { .. }) => {
                    debug!("🔁 HELLO repetido ignorado (conexión {})", conn);
                    Ok(())
                }
                Err(e) => {
                    debug!("🗑️ Mensaje desconocido descartado (conexión {}): {}", conn, e);
                    Ok(())
                }
            },
        }
    }

    async fn hello(
        &self,
        conn: ConnectionId,
        scooter_id: &str,
        role: Option<&str>,
    ) -> Result<(), ProtocolError> {
        let scooter_id = Uuid::parse_str(scooter_id.trim())
            .map_err(|_| ProtocolError::InvalidScooterId(scooter_id.to_string()))?;
        let role = Role::parse(role);

        let vehicle = self.inner.store.vehicles.find_by_id(scooter_id).await?;

        let outbox = {
            let mut sessions = self.inner.sessions.write().await;
            let session = sessions
                .get_mut(&conn)
                .ok_or(ProtocolError::UnknownConnection(conn))?;
            session.phase = SessionPhase::Joined { scooter_id, role };
            session.outbox()
        };

        self.inner
            .groups
            .write()
            .await
            .entry(scooter_id)
            .or_default()
            .insert(conn);

        let state = vehicle
            .as_ref()
            .map(VehicleState::from)
            .unwrap_or_default();
        let init = ServerMessage::Init {
            server_time: Utc::now(),
            telemetry: self.inner.telemetry,
            state: InitState::from(state),
        };

        info!(
            "👋 HELLO conexión {} → scooter {} ({:?}{})",
            conn,
            scooter_id,
            role,
            if vehicle.is_none() { ", sin registro" } else { "" }
        );

        if let Some(text) = encode(&init) {
            session::deliver(&outbox, Outbound::Text(text));
        }
        Ok(())
    }

    async fn accept_state(&self, scooter_id: Uuid, patch: &StatePatch) -> Result<(), ProtocolError> {
        let now = Utc::now();
        let update = patch.normalize(now);

        let vehicle = self
            .inner
            .store
            .vehicles
            .apply_update(scooter_id, &update)
            .await?
            .ok_or(ProtocolError::UnknownVehicle(scooter_id))?;

        if let Some((lat, lon)) = update.position() {
            self.inner
                .store
                .locations
                .record_position(scooter_id, &Position::new(lat, lon, now))
                .await?;
        }

        self.inner.metrics.state_updates.inc();
        self.broadcast_state(&vehicle).await;
        Ok(())
    }

    /// Cerrar una conexión por error de protocolo
    pub async fn reject(&self, conn: ConnectionId, error: &ProtocolError) {
        warn!("🚫 Conexión {} cerrada: {}", conn, error);
        if error.close_code() == CLOSE_POLICY_VIOLATION {
            self.inner.metrics.protocol_violations.inc();
        }

        let outbox = self
            .inner
            .sessions
            .read()
            .await
            .get(&conn)
            .map(ConnectionSession::outbox);
        if let Some(outbox) = outbox {
            session::deliver(
                &outbox,
                Outbound::Close {
                    code: error.close_code(),
                    reason: error.to_string(),
                },
            );
        }
    }

    /// Eliminar la conexión; si era el dispositivo, el vehículo queda `offline`
    pub async fn disconnect(&self, conn: ConnectionId) {
        let Some(session) = self.inner.sessions.write().await.remove(&conn) else {
            return;
        };
        self.inner.metrics.connections_open.dec();

        let SessionPhase::Joined { scooter_id, role } = session.phase else {
            debug!("🔌 Conexión {} cerrada antes del HELLO", conn);
            return;
        };

        {
            let mut groups = self.inner.groups.write().await;
            if let Some(members) = groups.get_mut(&scooter_id) {
                members.remove(&conn);
                if members.is_empty() {
                    groups.remove(&scooter_id);
                    debug!("🧹 Grupo del scooter {} eliminado", scooter_id);
                }
            }
        }

        if role != Role::Device {
            debug!("👋 Observador {} desconectado del scooter {}", conn, scooter_id);
            return;
        }

        info!("📴 Dispositivo del scooter {} desconectado", scooter_id);
        match self
            .inner
            .store
            .vehicles
            .apply_update(scooter_id, &VehicleUpdate::offline(Utc::now()))
            .await
        {
            Ok(Some(vehicle)) => self.broadcast_state(&vehicle).await,
            Ok(None) => {}
            Err(e) => error!("❌ No se pudo marcar offline el scooter {}: {}", scooter_id, e),
        }
    }

    /// Enviar un comando al grupo del vehículo.
    ///
    /// Devuelve `false` si el grupo no existe (nadie conectado).
    pub async fn send_command(&self, scooter_id: Uuid, command: Command) -> bool {
        let exists = self.inner.groups.read().await.contains_key(&scooter_id);
        if !exists {
            warn!("📵 Comando {:?} sin destinatario: scooter {} sin conexión", command.action, scooter_id);
            self.inner.metrics.commands_undelivered.inc();
            return false;
        }

        info!("📨 CMD {:?} → scooter {}", command.action, scooter_id);
        if let Some(text) = encode(&ServerMessage::Cmd(command)) {
            self.broadcast(scooter_id, text).await;
        }
        self.inner.metrics.commands_delivered.inc();
        true
    }

    async fn broadcast_state(&self, vehicle: &Vehicle) {
        let message = ServerMessage::State {
            scooter_id: vehicle.id,
            state: VehicleState::from(vehicle),
            server_time: Utc::now(),
        };
        if let Some(text) = encode(&message) {
            self.broadcast(vehicle.id, text).await;
        }
    }

    /// Difundir a una foto de los miembros actuales; los cerrados se saltan
    async fn broadcast(&self, scooter_id: Uuid, text: String) {
        let members: Vec<ConnectionId> = match self.inner.groups.read().await.get(&scooter_id) {
            Some(members) => members.iter().copied().collect(),
            None => return,
        };

        let outboxes: Vec<UnboundedSender<Outbound>> = {
            let sessions = self.inner.sessions.read().await;
            members
                .iter()
                .filter_map(|id| sessions.get(id).map(ConnectionSession::outbox))
                .collect()
        };

        for outbox in outboxes {
            session::deliver(&outbox, Outbound::Text(text.clone()));
        }
    }

    /// Número de conexiones suscritas a un vehículo
    pub async fn group_size(&self, scooter_id: Uuid) -> usize {
        self.inner
            .groups
            .read()
            .await
            .get(&scooter_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        self.inner.telemetry
    }
}

fn encode(message: &ServerMessage) -> Option<String> {
    match message.encode() {
        Ok(text) => Some(text),
        Err(e) => {
            error!("❌ Error serializando mensaje: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VehicleStatus;
    use serde_json::json;

    async fn relay_with_vehicle() -> (Relay, Store, Vehicle) {
        let store = Store::in_memory();
        let vehicle = store
            .vehicles
            .insert(&Vehicle::new("S-1", 40.0, -3.7))
            .await
            .unwrap();
        let relay = Relay::new(store.clone(), TelemetryConfig::default(), Metrics::new().unwrap());
        (relay, store, vehicle)
    }

    fn next_json(rx: &mut UnboundedReceiver<Outbound>) -> Value {
        match rx.try_recv() {
            Ok(Outbound::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    fn hello(id: Uuid, role: &str) -> String {
        json!({"type": "HELLO", "scooterId": id.to_string(), "role": role}).to_string()
    }

    #[tokio::test]
    async fn test_first_message_must_be_hello() {
        let (relay, _, _) = relay_with_vehicle().await;
        let (conn, _rx) = relay.connect().await;

        let result = relay
            .handle_text(conn, &json!({"type": "STATE", "battery": 50}).to_string())
            .await;
        assert!(matches!(result, Err(ProtocolError::ExpectedHello)));
        assert_eq!(result.unwrap_err().close_code(), CLOSE_POLICY_VIOLATION);
    }

    #[tokio::test]
    async fn test_malformed_json_is_dropped() {
        let (relay, _, _) = relay_with_vehicle().await;
        let (conn, mut rx) = relay.connect().await;

        assert!(relay.handle_text(conn, "{not json").await.is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_hello_sends_init_to_sender_only() {
        let (relay, _, vehicle) = relay_with_vehicle().await;
        let (viewer, mut viewer_rx) = relay.connect().await;
        relay.handle_text(viewer, &hello(vehicle.id, "admin")).await.unwrap();
        let _ = next_json(&mut viewer_rx);

        let (device, mut device_rx) = relay.connect().await;
        relay.handle_text(device, &hello(vehicle.id, "device")).await.unwrap();

        let init = next_json(&mut device_rx);
        assert_eq!(init["type"], "INIT");
        assert_eq!(init["state"]["lat"], 40.0);
        assert_eq!(init["state"]["mode"], "idle");
        assert!(viewer_rx.try_recv().is_err());
        assert_eq!(relay.group_size(vehicle.id).await, 2);
    }

    #[tokio::test]
    async fn test_device_state_is_persisted_and_broadcast() {
        let (relay, store, vehicle) = relay_with_vehicle().await;
        let (viewer, mut viewer_rx) = relay.connect().await;
        let (device, mut device_rx) = relay.connect().await;
        relay.handle_text(viewer, &hello(vehicle.id, "viewer")).await.unwrap();
        relay.handle_text(device, &hello(vehicle.id, "device")).await.unwrap();
        let _ = next_json(&mut viewer_rx);
        let _ = next_json(&mut device_rx);

        let state = json!({"type": "STATE", "battery": "120", "speedKmh": 15, "status": "driving", "lat": 40.1, "lon": -3.6});
        relay.handle_text(device, &state.to_string()).await.unwrap();

        let stored = store.vehicles.find_by_id(vehicle.id).await.unwrap().unwrap();
        assert_eq!(stored.battery, 100.0);
        assert_eq!(stored.status, VehicleStatus::Driving);
        assert!(stored.last_seen_at.is_some());

        for rx in [&mut viewer_rx, &mut device_rx] {
            let msg = next_json(rx);
            assert_eq!(msg["type"], "STATE");
            assert_eq!(msg["scooterId"], vehicle.id.to_string());
            assert_eq!(msg["state"]["speedKmh"], 15.0);
        }

        let location = store.locations.find(vehicle.id).await.unwrap().unwrap();
        assert_eq!(location.current.map(|p| p.lat), Some(40.1));
    }

    #[tokio::test]
    async fn test_viewer_state_is_ignored() {
        let (relay, store, vehicle) = relay_with_vehicle().await;
        let (viewer, mut rx) = relay.connect().await;
        relay.handle_text(viewer, &hello(vehicle.id, "admin")).await.unwrap();
        let _ = next_json(&mut rx);

        relay
            .handle_text(viewer, &json!({"type": "STATE", "battery": 3}).to_string())
            .await
            .unwrap();

        let stored = store.vehicles.find_by_id(vehicle.id).await.unwrap().unwrap();
        assert_eq!(stored.battery, 100.0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_state_for_unknown_vehicle_is_violation() {
        let (relay, _, _) = relay_with_vehicle().await;
        let (conn, _rx) = relay.connect().await;
        let unknown = Uuid::new_v4();
        relay.handle_text(conn, &hello(unknown, "device")).await.unwrap();

        let result = relay
            .handle_text(conn, &json!({"type": "STATE", "battery": 10}).to_string())
            .await;
        assert!(matches!(result, Err(ProtocolError::UnknownVehicle(id)) if id == unknown));
    }

    #[tokio::test]
    async fn test_device_disconnect_marks_offline_and_drops_group() {
        let (relay, store, vehicle) = relay_with_vehicle().await;
        let (device, _rx) = relay.connect().await;
        relay.handle_text(device, &hello(vehicle.id, "device")).await.unwrap();
        relay
            .handle_text(
                device,
                &json!({"type": "STATE", "status": "driving", "speedKmh": 20}).to_string(),
            )
            .await
            .unwrap();

        relay.disconnect(device).await;

        let stored = store.vehicles.find_by_id(vehicle.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VehicleStatus::Offline);
        assert_eq!(stored.speed_kmh, 0.0);
        assert_eq!(relay.group_size(vehicle.id).await, 0);
        assert!(!relay.send_command(vehicle.id, Command::start()).await);
    }

    #[tokio::test]
    async fn test_send_command_reaches_group() {
        let (relay, _, vehicle) = relay_with_vehicle().await;
        assert!(!relay.send_command(vehicle.id, Command::start()).await);

        let (device, mut rx) = relay.connect().await;
        relay.handle_text(device, &hello(vehicle.id, "device")).await.unwrap();
        let _ = next_json(&mut rx);

        assert!(relay.send_command(vehicle.id, Command::stop()).await);
        assert_eq!(next_json(&mut rx), json!({"type": "CMD", "action": "STOP"}));
    }

    #[tokio::test]
    async fn test_reject_queues_policy_close() {
        let (relay, _, _) = relay_with_vehicle().await;
        let (conn, mut rx) = relay.connect().await;
        relay.reject(conn, &ProtocolError::ExpectedHello).await;

        match rx.try_recv() {
            Ok(Outbound::Close { code, .. }) => assert_eq!(code, CLOSE_POLICY_VIOLATION),
            other => panic!("expected close frame, got {:?}", other),
        }
    }
}
