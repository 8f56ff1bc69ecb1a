use std::net::SocketAddr;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scooter_fleet::config::database::mask_database_url;
use scooter_fleet::config::{DatabaseConfig, EnvironmentConfig};
use scooter_fleet::metrics::Metrics;
use scooter_fleet::repositories::Store;
use scooter_fleet::routes::create_app_router;
use scooter_fleet::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    // Configurar logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🛴 Scooter Fleet - Relay de telemetría y alquileres");
    info!("================================================");

    let config = EnvironmentConfig::from_env().context("configuración inválida")?;
    info!("⚙️ Entorno: {}", config.environment);
    if config.is_development() && config.cors_origins.is_empty() {
        warn!("⚠️ CORS permisivo (CORS_ORIGINS no definida)");
    }

    // Inicializar almacenamiento
    let store = match config.database_url.as_deref() {
        Some(url) => {
            info!("🗄️ Conectando a PostgreSQL: {}", mask_database_url(url));
            let pool = DatabaseConfig::new(url).create_pool().await.map_err(|e| {
                error!("❌ Error conectando a la base de datos: {}", e);
                anyhow::anyhow!("Error de base de datos: {}", e)
            })?;
            info!("✅ Base de datos lista");
            Store::postgres(pool)
        }
        None => {
            warn!("⚠️ DATABASE_URL no definida: usando almacenamiento en memoria");
            Store::in_memory()
        }
    };

    let metrics = Metrics::new().context("no se pudieron registrar las métricas")?;
    let app_state = AppState::new(config.clone(), store, metrics);
    let app = create_app_router(app_state);

    let addr: SocketAddr = config.server_url().parse()?;

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   GET   /ws - Relay WebSocket (dispositivos y dashboards)");
    info!("   GET   /health - Health check");
    info!("   GET   /metrics - Métricas Prometheus");
    info!("🛴 Vehículos:");
    info!("   GET   /api/vehicles - Listar vehículos");
    info!("   GET   /api/vehicles/:id - Obtener vehículo");
    info!("   GET   /api/vehicles/:id/location - Posición actual");
    info!("   PUT   /api/vehicles/:id/location - Corregir posición (admin)");
    info!("   GET   /api/vehicles/:id/location/history - Historial de posiciones");
    info!("   POST  /api/vehicles/:id/command - Enviar comando (admin)");
    info!("🧾 Alquileres:");
    info!("   POST  /api/rentals - Alquilar vehículo");
    info!("   GET   /api/rentals - Mis alquileres");
    info!("   GET   /api/rentals/:id - Obtener alquiler");
    info!("   GET   /api/rentals/:id/quote - Precio si se cierra ahora");
    info!("   PATCH /api/rentals/:id/end - Terminar alquiler");
    info!("🗺️ Zonas:");
    info!("   GET   /api/zones - Zonas activas");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!("❌ Error del servidor: {}", e);
            e
        })?;

    info!("👋 Servidor terminado");
    Ok(())
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ No se pudo escuchar Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("❌ No se pudo escuchar SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal SIGTERM recibida, apagando servidor...");
        },
    }
}
