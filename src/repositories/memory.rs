//! Almacenamiento en memoria
//!
//! Implementa todos los repositorios sobre `RwLock<HashMap>`. Se usa en tests
//! y cuando el servidor arranca sin `DATABASE_URL`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    DebitOutcome, LocationRepository, RentalRepository, StoreResult, UserRepository,
    VehicleRepository, ZoneRepository,
};
use crate::models::{Location, Position, Rental, User, Vehicle, VehicleUpdate, Zone};

#[derive(Default)]
pub struct MemoryStore {
    vehicles: RwLock<HashMap<Uuid, Vehicle>>,
    locations: RwLock<HashMap<Uuid, Location>>,
    rentals: RwLock<HashMap<Uuid, Rental>>,
    // Vec para conservar el orden de inserción de las zonas
    zones: RwLock<Vec<Zone>>,
    users: RwLock<HashMap<Uuid, User>>,
}

#[async_trait]
impl VehicleRepository for MemoryStore {
    async fn insert(&self, vehicle: &Vehicle) -> StoreResult<Vehicle> {
        let mut vehicle = vehicle.clone();
        // Pasar por apply para que el invariante de velocidad también valga aquí
        vehicle.apply(&VehicleUpdate::default());
        self.vehicles.write().await.insert(vehicle.id, vehicle.clone());
        Ok(vehicle)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Vehicle>> {
        Ok(self.vehicles.read().await.get(&id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Vehicle>> {
        let mut vehicles: Vec<Vehicle> = self.vehicles.read().await.values().cloned().collect();
        vehicles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(vehicles)
    }

    async fn apply_update(&self, id: Uuid, update: &VehicleUpdate) -> StoreResult<Option<Vehicle>> {
        let mut vehicles = self.vehicles.write().await;
        Ok(vehicles.get_mut(&id).map(|vehicle| {
            vehicle.apply(update);
            vehicle.clone()
        }))
    }
}

#[async_trait]
impl LocationRepository for MemoryStore {
    async fn find(&self, vehicle_id: Uuid) -> StoreResult<Option<Location>> {
        Ok(self.locations.read().await.get(&vehicle_id).cloned())
    }

    async fn record_position(&self, vehicle_id: Uuid, position: &Position) -> StoreResult<Location> {
        let mut locations = self.locations.write().await;
        let location = locations
            .entry(vehicle_id)
            .or_insert_with(|| Location::new(vehicle_id));
        location.record(position.clone());
        Ok(location.clone())
    }

    async fn history_len(&self, vehicle_id: Uuid) -> StoreResult<usize> {
        Ok(self
            .locations
            .read()
            .await
            .get(&vehicle_id)
            .map(|l| l.history.len())
            .unwrap_or(0))
    }

    async fn history_since(&self, vehicle_id: Uuid, start: usize) -> StoreResult<Vec<Position>> {
        Ok(self
            .locations
            .read()
            .await
            .get(&vehicle_id)
            .map(|l| l.history_since(start))
            .unwrap_or_default())
    }
}

#[async_trait]
impl RentalRepository for MemoryStore {
    async fn insert(&self, rental: &Rental) -> StoreResult<Rental> {
        self.rentals.write().await.insert(rental.id, rental.clone());
        Ok(rental.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Rental>> {
        Ok(self.rentals.read().await.get(&id).cloned())
    }

    async fn find_open_by_scooter(&self, scooter_id: Uuid) -> StoreResult<Option<Rental>> {
        Ok(self
            .rentals
            .read()
            .await
            .values()
            .find(|r| r.scooter_id == scooter_id && !r.is_closed())
            .cloned())
    }

    async fn list_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Rental>> {
        let mut rentals: Vec<Rental> = self
            .rentals
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rentals.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(rentals)
    }

    async fn close_if_open(&self, rental: &Rental) -> StoreResult<Option<Rental>> {
        let mut rentals = self.rentals.write().await;
        match rentals.get_mut(&rental.id) {
            Some(stored) if !stored.is_closed() => {
                stored.end_time = rental.end_time;
                stored.trip_history = rental.trip_history.clone();
                stored.cost = rental.cost;
                stored.paid = rental.paid;
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_paid(&self, id: Uuid) -> StoreResult<()> {
        if let Some(rental) = self.rentals.write().await.get_mut(&id) {
            rental.paid = true;
        }
        Ok(())
    }
}

#[async_trait]
impl ZoneRepository for MemoryStore {
    async fn insert(&self, zone: &Zone) -> StoreResult<Zone> {
        self.zones.write().await.push(zone.clone());
        Ok(zone.clone())
    }

    async fn list_active(&self) -> StoreResult<Vec<Zone>> {
        Ok(self
            .zones
            .read()
            .await
            .iter()
            .filter(|z| z.active)
            .cloned()
            .collect())
    }

    async fn list_active_parking(&self) -> StoreResult<Vec<Zone>> {
        Ok(self
            .zones
            .read()
            .await
            .iter()
            .filter(|z| z.is_active_parking())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: &User) -> StoreResult<User> {
        self.users.write().await.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn debit(&self, id: Uuid, amount: i64) -> StoreResult<DebitOutcome> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(DebitOutcome::UnknownUser);
        };
        if user.credit < amount {
            return Ok(DebitOutcome::Insufficient { credit: user.credit });
        }
        user.credit -= amount;
        Ok(DebitOutcome::Debited { credit: user.credit })
    }
}
