//! Adaptadores de sensores
//!
//! Cada adaptador entrega una lectura parcial (`snapshot`) y puede tener un
//! ciclo de vida propio (`start`/`stop`). Los valores simulables aceptan
//! overrides que se reflejan en el estado del dispositivo en el acto, no
//! sólo en la siguiente lectura.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::state::{SensorSnapshot, SharedState};
use super::DeviceError;
use crate::protocol::Mode;

#[async_trait]
pub trait SensorAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inicialización; el cliente la espera antes de pasar a `Ready`
    async fn init(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn snapshot(&self) -> SensorSnapshot;

    async fn start(&self, _owner: SharedState) {}

    async fn stop(&self) {}
}

/// Parámetros de descarga de la batería, en % por tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryModel {
    pub idle_drain: f64,
    pub active_base_drain: f64,
    pub speed_drain_per_kmh: f64,
    pub max_speed_for_drain: f64,
    pub charge_rate: f64,
}

impl Default for BatteryModel {
    fn default() -> Self {
        Self {
            idle_drain: 0.02,
            active_base_drain: 0.08,
            speed_drain_per_kmh: 0.004,
            max_speed_for_drain: 30.0,
            charge_rate: 0.5,
        }
    }
}

impl BatteryModel {
    pub fn next_level(&self, level: f64, mode: Mode, speed_kmh: f64, charging: bool) -> f64 {
        let next = if charging {
            level + self.charge_rate
        } else {
            let drain = match mode {
                Mode::Idle => self.idle_drain,
                Mode::Active => {
                    let speed = speed_kmh.clamp(0.0, self.max_speed_for_drain);
                    self.active_base_drain + self.speed_drain_per_kmh * speed
                }
            };
            level - drain
        };
        next.clamp(0.0, 100.0)
    }
}

/// Batería simulada que se descarga sola en cada tick
pub struct BatterySensor {
    model: BatteryModel,
    tick: Duration,
    // None hasta el primer tick u override: no pisa el valor del servidor
    level: Arc<Mutex<Option<f64>>>,
    charging: Arc<AtomicBool>,
    owner: Mutex<Option<SharedState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BatterySensor {
    pub fn new(tick: Duration) -> Self {
        Self::with_model(tick, BatteryModel::default())
    }

    pub fn with_model(tick: Duration, model: BatteryModel) -> Self {
        Self {
            model,
            tick,
            level: Arc::new(Mutex::new(None)),
            charging: Arc::new(AtomicBool::new(false)),
            owner: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn set_charging(&self, charging: bool) {
        self.charging.store(charging, Ordering::Relaxed);
    }

    pub fn is_charging(&self) -> bool {
        self.charging.load(Ordering::Relaxed)
    }

    /// Override del nivel de batería
    pub async fn set_level(&self, level: f64) {
        let level = level.clamp(0.0, 100.0);
        *self.level.lock().await = Some(level);
        if let Some(owner) = self.owner.lock().await.as_ref() {
            owner.write().await.battery = level;
        }
    }
}

#[async_trait]
impl SensorAdapter for BatterySensor {
    fn name(&self) -> &'static str {
        "battery"
    }

    async fn init(&self) -> Result<(), DeviceError> {
        if self.tick.is_zero() {
            return Err(DeviceError::Sensor {
                name: self.name(),
                message: "el tick de la batería debe ser mayor que cero".to_string(),
            });
        }
        Ok(())
    }

    async fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            battery: *self.level.lock().await,
            ..Default::default()
        }
    }

    async fn start(&self, owner: SharedState) {
        *self.owner.lock().await = Some(owner.clone());
        if self.tick.is_zero() {
            warn!("⚠️ Batería sin tick: no se simula la descarga");
            return;
        }

        let model = self.model;
        let tick = self.tick;
        let level = self.level.clone();
        let charging = self.charging.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            // El primer tick de interval es inmediato
            interval.tick().await;
            loop {
                interval.tick().await;
                let next = {
                    let mut state = owner.write().await;
                    let next = model.next_level(
                        state.battery,
                        state.mode,
                        state.speed_kmh,
                        charging.load(Ordering::Relaxed),
                    );
                    state.battery = next;
                    next
                };
                *level.lock().await = Some(next);
            }
        });

        if let Some(previous) = self.task.lock().await.replace(handle) {
            previous.abort();
        }
        debug!("🔋 Batería simulada iniciada (tick {:?})", tick);
    }

    async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        self.owner.lock().await.take();
    }
}

/// Posición con override
#[derive(Default)]
pub struct LocationSensor {
    value: Mutex<Option<(f64, f64)>>,
    owner: Mutex<Option<SharedState>>,
}

impl LocationSensor {
    pub fn new(initial: Option<(f64, f64)>) -> Self {
        Self {
            value: Mutex::new(initial),
            owner: Mutex::new(None),
        }
    }

    pub async fn set(&self, lat: f64, lon: f64) {
        *self.value.lock().await = Some((lat, lon));
        if let Some(owner) = self.owner.lock().await.as_ref() {
            let mut state = owner.write().await;
            state.lat = lat;
            state.lon = lon;
        }
    }

    pub async fn get(&self) -> Option<(f64, f64)> {
        *self.value.lock().await
    }
}

#[async_trait]
impl SensorAdapter for LocationSensor {
    fn name(&self) -> &'static str {
        "location"
    }

    async fn snapshot(&self) -> SensorSnapshot {
        let value = *self.value.lock().await;
        SensorSnapshot {
            lat: value.map(|(lat, _)| lat),
            lon: value.map(|(_, lon)| lon),
            ..Default::default()
        }
    }

    async fn start(&self, owner: SharedState) {
        *self.owner.lock().await = Some(owner);
    }

    async fn stop(&self) {
        self.owner.lock().await.take();
    }
}

/// Velocidad con override
#[derive(Default)]
pub struct SpeedSensor {
    value: Mutex<f64>,
    owner: Mutex<Option<SharedState>>,
}

impl SpeedSensor {
    pub async fn set(&self, speed_kmh: f64) {
        let speed = speed_kmh.max(0.0);
        *self.value.lock().await = speed;
        if let Some(owner) = self.owner.lock().await.as_ref() {
            owner.write().await.speed_kmh = speed;
        }
    }

    pub async fn get(&self) -> f64 {
        *self.value.lock().await
    }
}

#[async_trait]
impl SensorAdapter for SpeedSensor {
    fn name(&self) -> &'static str {
        "speed"
    }

    async fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            speed_kmh: Some(*self.value.lock().await),
            ..Default::default()
        }
    }

    async fn start(&self, owner: SharedState) {
        *self.owner.lock().await = Some(owner);
    }

    async fn stop(&self) {
        self.owner.lock().await.take();
    }
}

/// Lectura combinada de todos los sensores, en orden
pub async fn combined_snapshot(sensors: &[Arc<dyn SensorAdapter>]) -> SensorSnapshot {
    let mut combined = SensorSnapshot::default();
    for sensor in sensors {
        combined.merge(sensor.snapshot().await);
    }
    combined
}
