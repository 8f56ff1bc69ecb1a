//! Conexión del dispositivo con el relay
//!
//! Ciclo de vida: `Connecting → AwaitingInit → Ready(idle|active) → Closing`.
//! Cualquier corte de red vuelve a `Connecting` tras una espera fija; sólo
//! `DeviceHandle::close` termina el ciclo.
//!
//! La telemetría se programa con un único temporizador que se reinicia cada
//! vez que cambia el modo o los intervalos, así nunca hay dos envíos
//! periódicos en paralelo.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::config::DeviceConfig;
use super::sensors::{combined_snapshot, SensorAdapter};
use super::state::{DeviceState, SharedState};
use super::DeviceError;
use crate::protocol::{ClientMessage, Command, CommandAction, Mode, ServerMessage, TelemetryConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Connecting,
    AwaitingInit,
    Ready(Mode),
    Closing,
    Closed,
}

/// Estado observable del cliente
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStatus {
    pub phase: ClientPhase,
    /// Conexiones establecidas desde el arranque
    pub connections: u64,
    pub states_sent: u64,
}

impl Default for ClientStatus {
    fn default() -> Self {
        Self {
            phase: ClientPhase::Connecting,
            connections: 0,
            states_sent: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Disconnected,
    Closed,
}

pub struct DeviceClient {
    config: DeviceConfig,
    sensors: Vec<Arc<dyn SensorAdapter>>,
    state: SharedState,
}

impl DeviceClient {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            sensors: Vec::new(),
            state: DeviceState::default().shared(),
        }
    }

    /// Registrar un sensor; las lecturas se combinan en orden de registro
    pub fn with_sensor(mut self, sensor: Arc<dyn SensorAdapter>) -> Self {
        self.sensors.push(sensor);
        self
    }

    /// Arrancar sensores y el bucle de conexión
    pub async fn spawn(self) -> DeviceHandle {
        for sensor in &self.sensors {
            sensor.start(self.state.clone()).await;
        }

        let (status_tx, status_rx) = watch::channel(ClientStatus::default());
        let (closed_tx, closed_rx) = watch::channel(false);
        let state = self.state.clone();

        let runner = Runner {
            config: self.config,
            sensors: self.sensors,
            state: self.state,
            telemetry: TelemetryConfig::default(),
            status: status_tx,
            closed: closed_rx,
            ready: false,
        };
        let task = tokio::spawn(runner.run());

        DeviceHandle {
            state,
            status: status_rx,
            closed: closed_tx,
            task: Mutex::new(Some(task)),
        }
    }
}

/// Control de un cliente en ejecución. Soltar el handle también lo cierra.
pub struct DeviceHandle {
    state: SharedState,
    status: watch::Receiver<ClientStatus>,
    closed: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceHandle {
    pub async fn state(&self) -> DeviceState {
        self.state.read().await.clone()
    }

    pub fn shared_state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn status(&self) -> ClientStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientStatus> {
        self.status.clone()
    }

    /// Esperar hasta que el estado cumpla `predicate`
    pub async fn wait_for<F>(&self, predicate: F) -> ClientStatus
    where
        F: Fn(&ClientStatus) -> bool,
    {
        let mut status = self.status.clone();
        loop {
            let current = *status.borrow_and_update();
            if predicate(&current) {
                return current;
            }
            if status.changed().await.is_err() {
                return *status.borrow();
            }
        }
    }

    /// Cerrar la conexión y parar los sensores
    pub async fn close(&self) {
        self.closed.send_replace(true);
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                error!("❌ El cliente de dispositivo terminó con error: {}", e);
            }
        }
    }
}

struct Runner {
    config: DeviceConfig,
    sensors: Vec<Arc<dyn SensorAdapter>>,
    state: SharedState,
    telemetry: TelemetryConfig,
    status: watch::Sender<ClientStatus>,
    closed: watch::Receiver<bool>,
    ready: bool,
}

impl Runner {
    async fn run(mut self) {
        loop {
            if *self.closed.borrow() {
                break;
            }
            self.set_phase(ClientPhase::Connecting);
            info!(
                "🔗 Conectando al relay {} como {}",
                self.config.relay_url, self.config.scooter_id
            );

            let connected = tokio::select! {
                result = connect_async(self.config.relay_url.as_str()) => Some(result),
                _ = wait_closed(&mut self.closed) => None,
            };
            let outcome = match connected {
                None => SessionEnd::Closed,
                Some(Ok((ws, _))) => self.session(ws).await,
                Some(Err(e)) => {
                    warn!("⚠️ No se pudo conectar al relay: {}", e);
                    SessionEnd::Disconnected
                }
            };
            self.ready = false;
            if outcome == SessionEnd::Closed {
                break;
            }

            let delay = self.config.reconnect_delay;
            info!("⏳ Reintentando conexión en {:?}", delay);
            let closed = tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = wait_closed(&mut self.closed) => true,
            };
            if closed {
                break;
            }
        }

        self.set_phase(ClientPhase::Closing);
        for sensor in &self.sensors {
            sensor.stop().await;
        }
        self.set_phase(ClientPhase::Closed);
        info!("🛑 Dispositivo {} desconectado", self.config.scooter_id);
    }

    async fn session(&mut self, ws: WsStream) -> SessionEnd {
        let (mut sink, mut stream) = ws.split();
        self.status.send_modify(|status| {
            status.connections += 1;
            status.phase = ClientPhase::AwaitingInit;
        });
        info!("✅ Conectado al relay");

        let hello = ClientMessage::Hello {
            scooter_id: self.config.scooter_id.clone(),
            role: Some("device".to_string()),
        };
        if let Err(e) = send_message(&mut sink, &hello).await {
            warn!("⚠️ No se pudo enviar HELLO: {}", e);
            return SessionEnd::Disconnected;
        }

        // Sólo se arma tras el INIT
        let timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Err(e) = self.handle_text(&text, &mut sink, timer.as_mut()).await {
                            warn!("⚠️ Error enviando al relay: {}", e);
                            return SessionEnd::Disconnected;
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!("🔌 El relay cerró la conexión: {:?}", frame);
                        return SessionEnd::Disconnected;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("⚠️ Error leyendo del relay: {}", e);
                        return SessionEnd::Disconnected;
                    }
                    None => return SessionEnd::Disconnected,
                },
                () = &mut timer, if self.ready => {
                    if let Err(e) = self.send_state(&mut sink).await {
                        warn!("⚠️ Error enviando telemetría: {}", e);
                        return SessionEnd::Disconnected;
                    }
                    let next = self.next_deadline().await;
                    timer.as_mut().reset(next);
                }
                _ = wait_closed(&mut self.closed) => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    let _ = sink.close().await;
                    return SessionEnd::Closed;
                }
            }
        }
    }

    async fn handle_text(
        &mut self,
        text: &str,
        sink: &mut WsSink,
        mut timer: Pin<&mut Sleep>,
    ) -> Result<(), DeviceError> {
        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                debug!("Frame del relay ignorado: {}", e);
                return Ok(());
            }
        };

        match message {
            ServerMessage::Init {
                telemetry, state, ..
            } => {
                self.telemetry = telemetry;
                self.state.write().await.apply_server_state(&state.state);

                for sensor in &self.sensors {
                    if let Err(e) = sensor.init().await {
                        error!("❌ Sensor {} no inicializó: {}", sensor.name(), e);
                    }
                }

                let snapshot = combined_snapshot(&self.sensors).await;
                {
                    let mut local = self.state.write().await;
                    local.apply_snapshot(&snapshot);
                    local.set_mode(state.mode);
                }

                self.ready = true;
                self.set_phase(ClientPhase::Ready(state.mode));
                info!("📥 INIT recibido, modo {:?}", state.mode);

                let next = self.next_deadline().await;
                timer.as_mut().reset(next);
            }
            ServerMessage::Cmd(command) => {
                if !self.ready {
                    debug!("CMD recibido antes de INIT, ignorado");
                    return Ok(());
                }
                self.apply_command(command, sink, timer).await?;
            }
            ServerMessage::State { .. } => {}
        }
        Ok(())
    }

    async fn apply_command(
        &mut self,
        command: Command,
        sink: &mut WsSink,
        mut timer: Pin<&mut Sleep>,
    ) -> Result<(), DeviceError> {
        if let Some(action) = command.action {
            let target = match action {
                CommandAction::Start => Mode::Active,
                CommandAction::Stop => Mode::Idle,
            };
            let changed = {
                let mut local = self.state.write().await;
                if local.mode == target {
                    false
                } else {
                    local.set_mode(target);
                    true
                }
            };

            if changed {
                info!("🛴 Comando {:?}: modo {:?}", action, target);
                self.set_phase(ClientPhase::Ready(target));
                self.send_state(sink).await?;
                let next = self.next_deadline().await;
                timer.as_mut().reset(next);
            } else {
                debug!("Comando {:?} sin efecto, ya en modo {:?}", action, target);
            }
        }

        if let Some(update) = command.telemetry {
            self.telemetry.apply(&update);
            info!(
                "⏱️ Intervalos de telemetría: activo {} ms, reposo {} ms",
                self.telemetry.active_interval_ms, self.telemetry.idle_interval_ms
            );
            timer.as_mut().reset(Instant::now());
        }
        Ok(())
    }

    /// Leer sensores y enviar un STATE con el estado completo
    async fn send_state(&mut self, sink: &mut WsSink) -> Result<(), DeviceError> {
        let snapshot = combined_snapshot(&self.sensors).await;
        let message = {
            let mut local = self.state.write().await;
            local.apply_snapshot(&snapshot);
            if local.mode == Mode::Idle {
                local.speed_kmh = 0.0;
            }
            local.last_seen_at = Some(Utc::now());
            ClientMessage::State(local.to_patch())
        };

        send_message(sink, &message).await?;
        self.status.send_modify(|status| status.states_sent += 1);
        Ok(())
    }

    async fn next_deadline(&self) -> Instant {
        let mode = self.state.read().await.mode;
        Instant::now() + Duration::from_millis(self.telemetry.interval_ms(mode))
    }

    fn set_phase(&self, phase: ClientPhase) {
        self.status.send_modify(|status| status.phase = phase);
    }
}

async fn send_message(sink: &mut WsSink, message: &ClientMessage) -> Result<(), DeviceError> {
    let text = message.encode()?;
    sink.send(WsMessage::Text(text)).await?;
    Ok(())
}

/// Resuelve cuando se pide el cierre o se suelta el handle
async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    loop {
        if *closed.borrow_and_update() {
            return;
        }
        if closed.changed().await.is_err() {
            return;
        }
    }
}
