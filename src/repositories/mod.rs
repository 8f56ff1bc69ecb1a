//! Repositorios
//!
//! El motor de almacenamiento es un detalle: el relay y el ciclo de alquiler
//! trabajan contra estos traits. Hay una implementación PostgreSQL (sqlx) y
//! otra en memoria para tests y desarrollo sin base de datos.
//!
//! Ambas implementaciones mantienen los invariantes de escritura:
//! - un vehículo que no está en `driving` queda con `speed_kmh = 0`
//! - el historial de posiciones sólo crece

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Location, Position, Rental, User, Vehicle, VehicleUpdate, Zone};

pub mod location_repository;
pub mod memory;
pub mod rental_repository;
pub mod user_repository;
pub mod vehicle_repository;
pub mod zone_repository;

pub use location_repository::PgLocationRepository;
pub use memory::MemoryStore;
pub use rental_repository::PgRentalRepository;
pub use user_repository::PgUserRepository;
pub use vehicle_repository::PgVehicleRepository;
pub use zone_repository::PgZoneRepository;

/// Errores de la capa de almacenamiento
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait VehicleRepository: Send + Sync {
    async fn insert(&self, vehicle: &Vehicle) -> StoreResult<Vehicle>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Vehicle>>;
    async fn list(&self) -> StoreResult<Vec<Vehicle>>;
    /// Aplicar una actualización parcial; `None` si el vehículo no existe
    async fn apply_update(&self, id: Uuid, update: &VehicleUpdate) -> StoreResult<Option<Vehicle>>;
}

#[async_trait]
pub trait LocationRepository: Send + Sync {
    async fn find(&self, vehicle_id: Uuid) -> StoreResult<Option<Location>>;
    /// Mover `current` al historial y fijar la nueva posición (crea la Location si falta)
    async fn record_position(&self, vehicle_id: Uuid, position: &Position) -> StoreResult<Location>;
    async fn history_len(&self, vehicle_id: Uuid) -> StoreResult<usize>;
    async fn history_since(&self, vehicle_id: Uuid, start: usize) -> StoreResult<Vec<Position>>;
}

#[async_trait]
pub trait RentalRepository: Send + Sync {
    async fn insert(&self, rental: &Rental) -> StoreResult<Rental>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Rental>>;
    async fn find_open_by_scooter(&self, scooter_id: Uuid) -> StoreResult<Option<Rental>>;
    async fn list_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Rental>>;
    /// Cerrar el alquiler sólo si sigue abierto; `None` si otro cierre ganó
    async fn close_if_open(&self, rental: &Rental) -> StoreResult<Option<Rental>>;
    async fn mark_paid(&self, id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait ZoneRepository: Send + Sync {
    async fn insert(&self, zone: &Zone) -> StoreResult<Zone>;
    async fn list_active(&self) -> StoreResult<Vec<Zone>>;
    async fn list_active_parking(&self) -> StoreResult<Vec<Zone>>;
}

/// Resultado de un cargo al crédito del usuario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited { credit: i64 },
    Insufficient { credit: i64 },
    UnknownUser,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User) -> StoreResult<User>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    /// Descontar `amount` del crédito de forma atómica si alcanza
    async fn debit(&self, id: Uuid, amount: i64) -> StoreResult<DebitOutcome>;
}

/// Acceso agrupado a todos los repositorios
#[derive(Clone)]
pub struct Store {
    pub vehicles: Arc<dyn VehicleRepository>,
    pub locations: Arc<dyn LocationRepository>,
    pub rentals: Arc<dyn RentalRepository>,
    pub zones: Arc<dyn ZoneRepository>,
    pub users: Arc<dyn UserRepository>,
}

impl Store {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            vehicles: Arc::new(PgVehicleRepository::new(pool.clone())),
            locations: Arc::new(PgLocationRepository::new(pool.clone())),
            rentals: Arc::new(PgRentalRepository::new(pool.clone())),
            zones: Arc::new(PgZoneRepository::new(pool.clone())),
            users: Arc::new(PgUserRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::default()))
    }

    pub fn from_memory(memory: Arc<MemoryStore>) -> Self {
        Self {
            vehicles: memory.clone(),
            locations: memory.clone(),
            rentals: memory.clone(),
            zones: memory.clone(),
            users: memory,
        }
    }
}
