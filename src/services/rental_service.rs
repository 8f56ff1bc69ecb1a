//! Servicio de alquileres
//!
//! Ciclo de vida: `solicitado → activo → cerrando → cerrado`.
//!
//! Al abrir se guarda la longitud del historial del vehículo; al cerrar el
//! viaje es exactamente `history[start_history_index..]`. El cierre exige que
//! el STOP llegue al vehículo: sin dispositivo conectado el historial no se
//! puede dar por terminado y el alquiler no se toca.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::models::{Rental, VehicleStatus};
use crate::protocol::Command;
use crate::relay::Relay;
use crate::repositories::{DebitOutcome, Store, StoreError};
use crate::services::pricing_service::{self, PriceQuote};
use crate::utils::errors::AppError;

#[derive(Error, Debug)]
pub enum RentalError {
    #[error("Vehicle {0} not found")]
    VehicleNotFound(Uuid),

    #[error("Rental {0} not found")]
    RentalNotFound(Uuid),

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Vehicle {id} is not available (status: {status})")]
    VehicleUnavailable { id: Uuid, status: VehicleStatus },

    #[error("Vehicle {0} already has an open rental")]
    AlreadyRented(Uuid),

    #[error("Rental {0} belongs to another user")]
    NotOwner(Uuid),

    #[error("Vehicle {0} is offline, the rental cannot be ended")]
    VehicleOffline(Uuid),

    /// El alquiler queda cerrado con su coste pero sin cobrar
    #[error("Insufficient credit: cost {cost}, credit {credit}")]
    InsufficientCredit {
        rental: Box<Rental>,
        cost: i64,
        credit: i64,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RentalError> for AppError {
    fn from(err: RentalError) -> Self {
        match err {
            RentalError::VehicleNotFound(_)
            | RentalError::RentalNotFound(_)
            | RentalError::UserNotFound(_) => AppError::NotFound(err.to_string()),
            RentalError::VehicleUnavailable { .. }
            | RentalError::AlreadyRented(_)
            | RentalError::VehicleOffline(_) => AppError::Conflict(err.to_string()),
            RentalError::NotOwner(_) => AppError::Forbidden(err.to_string()),
            RentalError::InsufficientCredit { cost, credit, .. } => AppError::PaymentRequired {
                message: format!("Rental ended but not charged: cost {}, credit {}", cost, credit),
                cost,
                credit,
            },
            RentalError::Store(e) => AppError::Store(e),
        }
    }
}

/// Resultado de abrir un alquiler
#[derive(Debug, Clone)]
pub struct RentalStarted {
    pub rental: Rental,
    /// `false` si el START no encontró al dispositivo conectado
    pub vehicle_reachable: bool,
}

pub struct RentalService {
    store: Store,
    relay: Relay,
    metrics: Metrics,
}

impl RentalService {
    pub fn new(store: Store, relay: Relay, metrics: Metrics) -> Self {
        Self {
            store,
            relay,
            metrics,
        }
    }

    pub async fn request_rental(
        &self,
        user_id: Uuid,
        scooter_id: Uuid,
    ) -> Result<RentalStarted, RentalError> {
        self.request_rental_at(user_id, scooter_id, Utc::now()).await
    }

    pub async fn request_rental_at(
        &self,
        user_id: Uuid,
        scooter_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RentalStarted, RentalError> {
        if self.store.users.find_by_id(user_id).await?.is_none() {
            return Err(RentalError::UserNotFound(user_id));
        }

        let vehicle = self
            .store
            .vehicles
            .find_by_id(scooter_id)
            .await?
            .ok_or(RentalError::VehicleNotFound(scooter_id))?;
        if !vehicle.is_available() {
            return Err(RentalError::VehicleUnavailable {
                id: scooter_id,
                status: vehicle.status,
            });
        }
        if self
            .store
            .rentals
            .find_open_by_scooter(scooter_id)
            .await?
            .is_some()
        {
            return Err(RentalError::AlreadyRented(scooter_id));
        }

        let start_index = self.store.locations.history_len(scooter_id).await?;
        let rental = Rental::open(user_id, scooter_id, now, start_index);
        let rental = match self.store.rentals.insert(&rental).await {
            Ok(rental) => rental,
            Err(StoreError::Database(sqlx::Error::Database(db))) if db.is_unique_violation() => {
                return Err(RentalError::AlreadyRented(scooter_id));
            }
            Err(e) => return Err(e.into()),
        };
        self.metrics.rentals_opened.inc();

        let vehicle_reachable = self.relay.send_command(scooter_id, Command::start()).await;
        if !vehicle_reachable {
            warn!(
                "📵 Alquiler {} creado pero el scooter {} no está conectado",
                rental.id, scooter_id
            );
        }
        info!(
            "🛴 Alquiler {} iniciado: usuario {} scooter {} (historial desde {})",
            rental.id, user_id, scooter_id, start_index
        );

        Ok(RentalStarted {
            rental,
            vehicle_reachable,
        })
    }

    pub async fn end_rental(&self, rental_id: Uuid, user_id: Uuid) -> Result<Rental, RentalError> {
        self.end_rental_at(rental_id, user_id, Utc::now()).await
    }

    /// Cerrar un alquiler. Idempotente: un alquiler ya cerrado se devuelve tal cual.
    pub async fn end_rental_at(
        &self,
        rental_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Rental, RentalError> {
        let rental = self.owned_rental(rental_id, user_id).await?;
        if rental.is_closed() {
            return Ok(rental);
        }

        if !self
            .relay
            .send_command(rental.scooter_id, Command::stop())
            .await
        {
            return Err(RentalError::VehicleOffline(rental.scooter_id));
        }

        let user = self
            .store
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(RentalError::UserNotFound(user_id))?;
        let zones = self.store.zones.list_active_parking().await?;

        let mut closing = rental;
        closing.end_time = Some(now);
        closing.trip_history = self
            .store
            .locations
            .history_since(closing.scooter_id, closing.start_history_index)
            .await?;
        let quote = pricing_service::quote(&closing, &user.membership, &zones);
        closing.cost = Some(quote.cost);
        closing.paid = false;

        let Some(mut closed) = self.store.rentals.close_if_open(&closing).await? else {
            // Otro cierre concurrente llegó antes
            return self
                .store
                .rentals
                .find_by_id(rental_id)
                .await?
                .ok_or(RentalError::RentalNotFound(rental_id));
        };
        self.metrics.rentals_closed.inc();
        info!(
            "🏁 Alquiler {} cerrado: {} min, {} puntos, coste {} (aparcado: {})",
            closed.id,
            quote.minutes,
            closed.trip_history.len(),
            quote.cost,
            quote.parking.ok
        );

        match self.store.users.debit(user_id, quote.cost).await? {
            DebitOutcome::Debited { credit } => {
                self.store.rentals.mark_paid(closed.id).await?;
                closed.paid = true;
                info!("💳 Cobrados {} al usuario {}, crédito restante {}", quote.cost, user_id, credit);
                Ok(closed)
            }
            DebitOutcome::Insufficient { credit } => {
                warn!(
                    "💸 Crédito insuficiente para el alquiler {}: coste {}, crédito {}",
                    closed.id, quote.cost, credit
                );
                Err(RentalError::InsufficientCredit {
                    rental: Box::new(closed),
                    cost: quote.cost,
                    credit,
                })
            }
            DebitOutcome::UnknownUser => Err(RentalError::UserNotFound(user_id)),
        }
    }

    pub async fn get_rental(&self, rental_id: Uuid, user_id: Uuid) -> Result<Rental, RentalError> {
        self.owned_rental(rental_id, user_id).await
    }

    pub async fn list_rentals(&self, user_id: Uuid) -> Result<Vec<Rental>, RentalError> {
        Ok(self.store.rentals.list_by_user(user_id).await?)
    }

    /// Presupuesto del alquiler: el coste final si está cerrado, o lo que
    /// costaría cerrarlo ahora mismo
    pub async fn quote_rental(
        &self,
        rental_id: Uuid,
        user_id: Uuid,
    ) -> Result<PriceQuote, RentalError> {
        self.quote_rental_at(rental_id, user_id, Utc::now()).await
    }

    pub async fn quote_rental_at(
        &self,
        rental_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PriceQuote, RentalError> {
        let rental = self.owned_rental(rental_id, user_id).await?;
        let user = self
            .store
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(RentalError::UserNotFound(user_id))?;
        let zones = self.store.zones.list_active_parking().await?;

        if rental.is_closed() {
            return Ok(pricing_service::quote(&rental, &user.membership, &zones));
        }

        let trip = self
            .store
            .locations
            .history_since(rental.scooter_id, rental.start_history_index)
            .await?;
        Ok(pricing_service::quote_trip(
            rental.start_time,
            Some(now),
            &trip,
            &user.membership,
            &zones,
        ))
    }

    async fn owned_rental(&self, rental_id: Uuid, user_id: Uuid) -> Result<Rental, RentalError> {
        let rental = self
            .store
            .rentals
            .find_by_id(rental_id)
            .await?
            .ok_or(RentalError::RentalNotFound(rental_id))?;
        if rental.user_id != user_id {
            return Err(RentalError::NotOwner(rental_id));
        }
        Ok(rental)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Position, User, Vehicle};
    use crate::protocol::TelemetryConfig;
    use crate::relay::Outbound;
    use chrono::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        service: RentalService,
        store: Store,
        relay: Relay,
        user: User,
        vehicle: Vehicle,
    }

    async fn fixture(credit: i64) -> Fixture {
        let store = Store::in_memory();
        let metrics = Metrics::new().unwrap();
        let relay = Relay::new(store.clone(), TelemetryConfig::default(), metrics.clone());
        let user = store.users.insert(&User::new("ana", credit)).await.unwrap();
        let vehicle = store
            .vehicles
            .insert(&Vehicle::new("S-1", 40.0, -3.0))
            .await
            .unwrap();
        Fixture {
            service: RentalService::new(store.clone(), relay.clone(), metrics),
            store,
            relay,
            user,
            vehicle,
        }
    }

    async fn connect_device(relay: &Relay, scooter_id: Uuid) -> UnboundedReceiver<Outbound> {
        let (conn, outbox) = relay.connect().await;
        let hello = format!(r#"{{"type":"HELLO","scooterId":"{}"}}"#, scooter_id);
        relay.handle_text(conn, &hello).await.unwrap();
        outbox
    }

    #[tokio::test]
    async fn test_request_on_offline_vehicle_still_creates_rental() {
        let f = fixture(100).await;
        let started = f
            .service
            .request_rental(f.user.id, f.vehicle.id)
            .await
            .unwrap();
        assert!(!started.vehicle_reachable);
        assert_eq!(started.rental.start_history_index, 0);
    }

    #[tokio::test]
    async fn test_second_rental_on_same_vehicle_conflicts() {
        let f = fixture(100).await;
        f.service
            .request_rental(f.user.id, f.vehicle.id)
            .await
            .unwrap();
        let err = f
            .service
            .request_rental(f.user.id, f.vehicle.id)
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::AlreadyRented(_)));
    }

    #[tokio::test]
    async fn test_end_requires_connected_vehicle() {
        let f = fixture(100).await;
        let started = f
            .service
            .request_rental(f.user.id, f.vehicle.id)
            .await
            .unwrap();

        let err = f
            .service
            .end_rental(started.rental.id, f.user.id)
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::VehicleOffline(_)));

        let untouched = f
            .service
            .get_rental(started.rental.id, f.user.id)
            .await
            .unwrap();
        assert!(!untouched.is_closed());
        assert!(untouched.cost.is_none());
    }

    #[tokio::test]
    async fn test_only_owner_can_end() {
        let f = fixture(100).await;
        let _device = connect_device(&f.relay, f.vehicle.id).await;
        let started = f
            .service
            .request_rental(f.user.id, f.vehicle.id)
            .await
            .unwrap();

        let err = f
            .service
            .end_rental(started.rental.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::NotOwner(_)));
    }

    #[tokio::test]
    async fn test_insufficient_credit_closes_unpaid() {
        let f = fixture(5).await;
        let _device = connect_device(&f.relay, f.vehicle.id).await;
        let t0 = Utc::now();
        let started = f
            .service
            .request_rental_at(f.user.id, f.vehicle.id, t0)
            .await
            .unwrap();

        let err = f
            .service
            .end_rental_at(started.rental.id, f.user.id, t0 + Duration::minutes(3))
            .await
            .unwrap_err();
        match err {
            RentalError::InsufficientCredit { rental, cost, credit } => {
                // 3 min * 2 + 10 (sin historial)
                assert_eq!(cost, 16);
                assert_eq!(credit, 5);
                assert!(rental.is_closed());
                assert!(!rental.paid);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        // El segundo cierre no vuelve a intentar el cobro
        let again = f
            .service
            .end_rental(started.rental.id, f.user.id)
            .await
            .unwrap();
        assert_eq!(again.cost, Some(16));
        assert!(!again.paid);
        let user = f.store.users.find_by_id(f.user.id).await.unwrap().unwrap();
        assert_eq!(user.credit, 5);
    }

    #[tokio::test]
    async fn test_quote_open_rental_uses_current_history() {
        let f = fixture(100).await;
        let t0 = Utc::now();
        let started = f
            .service
            .request_rental_at(f.user.id, f.vehicle.id, t0)
            .await
            .unwrap();
        for i in 0..3 {
            let position = Position::new(40.0 + i as f64 * 0.001, -3.0, t0);
            f.store
                .locations
                .record_position(f.vehicle.id, &position)
                .await
                .unwrap();
        }

        let quote = f
            .service
            .quote_rental_at(started.rental.id, f.user.id, t0 + Duration::seconds(61))
            .await
            .unwrap();
        assert_eq!(quote.minutes, 2);
        assert!(!quote.parking.ok);
        assert_eq!(quote.cost, 14);
    }
}
