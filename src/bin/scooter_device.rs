//! Simulador de patinete
//!
//! Ejecuta el cliente de dispositivo contra un relay con sensores simulados:
//! batería que se descarga (y se carga en reposo cuando baja del 15%),
//! paseo aleatorio de la posición mientras el alquiler está activo.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scooter_fleet::device::{
    BatterySensor, DeviceClient, DeviceConfig, LocationSensor, SharedState, SpeedSensor,
};
use scooter_fleet::protocol::Mode;

const METERS_PER_DEGREE: f64 = 111_320.0;
const CHARGE_BELOW: f64 = 15.0;
const CHARGE_UNTIL: f64 = 95.0;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = DeviceConfig::from_env().context("configuración del dispositivo inválida")?;
    info!("🛴 Simulador de patinete {} → {}", config.scooter_id, config.relay_url);

    let battery = Arc::new(BatterySensor::new(config.battery_tick));
    let location = Arc::new(LocationSensor::new(config.initial_position));
    let speed = Arc::new(SpeedSensor::default());

    let handle = DeviceClient::new(config)
        .with_sensor(battery.clone())
        .with_sensor(location.clone())
        .with_sensor(speed.clone())
        .spawn()
        .await;

    let ride = tokio::spawn(simulate_ride(
        handle.shared_state(),
        battery,
        location,
        speed,
    ));

    signal::ctrl_c().await.context("no se pudo escuchar Ctrl+C")?;
    info!("🛑 Señal Ctrl+C recibida, cerrando dispositivo...");

    ride.abort();
    handle.close().await;
    Ok(())
}

/// Mover el patinete mientras está activo
async fn simulate_ride(
    state: SharedState,
    battery: Arc<BatterySensor>,
    location: Arc<LocationSensor>,
    speed: Arc<SpeedSensor>,
) {
    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        ticker.tick().await;
        let (mode, lat, lon, level) = {
            let s = state.read().await;
            (s.mode, s.lat, s.lon, s.battery)
        };

        if mode == Mode::Active && level > 0.0 {
            battery.set_charging(false);
            let kmh: f64 = rng.gen_range(8.0..22.0);
            speed.set(kmh).await;

            let meters = kmh / 3.6;
            let heading: f64 = rng.gen_range(0.0..std::f64::consts::TAU);
            let dlat = meters * heading.cos() / METERS_PER_DEGREE;
            let dlon = meters * heading.sin() / (METERS_PER_DEGREE * lat.to_radians().cos().max(0.01));
            location.set(lat + dlat, lon + dlon).await;
        } else {
            speed.set(0.0).await;
            if level < CHARGE_BELOW && !battery.is_charging() {
                info!("🔌 Batería al {:.1}%, cargando", level);
                battery.set_charging(true);
            } else if level >= CHARGE_UNTIL && battery.is_charging() {
                battery.set_charging(false);
            }
        }
    }
}
