//! Servicio de tarificación
//!
//! Función pura sobre el viaje, la membresía del usuario y las zonas de
//! aparcamiento activas. Orden de cálculo:
//!
//! 1. `minutos * PRICE_PER_MINUTE`
//! 2. descuento por nivel (`medium` 50%, `small` 10%, redondeado)
//! 3. `START_FEE` si el patinete no quedó aparcado en zona
//! 4. `allin` deja el coste en 0 pase lo que pase

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Membership, MembershipTier, Position, Rental, Zone};
use crate::services::geofence::zone_contains;

pub const PRICE_PER_MINUTE: i64 = 2;
pub const START_FEE: i64 = 10;

/// Motivo por el que falla el aparcamiento
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParkingFailure {
    NoTripHistory,
    OutsideParkingZone,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParkingCheck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ParkingFailure>,
}

impl ParkingCheck {
    fn parked_in(zone: &Zone) -> Self {
        Self {
            ok: true,
            zone_id: Some(zone.id),
            zone_name: Some(zone.name.clone()),
            reason: None,
        }
    }

    fn failed(reason: ParkingFailure) -> Self {
        Self {
            ok: false,
            zone_id: None,
            zone_name: None,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub cost: i64,
    pub minutes: i64,
    pub tier: MembershipTier,
    pub parking: ParkingCheck,
}

/// Comprobar la última posición del viaje contra las zonas de aparcamiento.
/// Gana la primera zona que contenga el punto, en el orden recibido.
pub fn check_parking(final_position: Option<&Position>, zones: &[Zone]) -> ParkingCheck {
    let Some(position) = final_position else {
        return ParkingCheck::failed(ParkingFailure::NoTripHistory);
    };

    let point = position.point();
    zones
        .iter()
        .filter(|zone| zone.is_active_parking())
        .find(|zone| zone_contains(zone, point))
        .map(ParkingCheck::parked_in)
        .unwrap_or_else(|| ParkingCheck::failed(ParkingFailure::OutsideParkingZone))
}

pub fn apply_discount(cost: i64, tier: MembershipTier) -> i64 {
    match tier {
        MembershipTier::Medium => (cost as f64 * 0.5).round() as i64,
        MembershipTier::Small => (cost as f64 * 0.9).round() as i64,
        MembershipTier::None | MembershipTier::Allin => cost,
    }
}

pub fn compute_cost(minutes: i64, tier: MembershipTier, parked: bool) -> i64 {
    let mut cost = apply_discount(minutes * PRICE_PER_MINUTE, tier);
    if !parked {
        cost += START_FEE;
    }
    if tier == MembershipTier::Allin {
        cost = 0;
    }
    cost
}

/// Tarificar un tramo de viaje arbitrario
pub fn quote_trip(
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    trip: &[Position],
    membership: &Membership,
    zones: &[Zone],
) -> PriceQuote {
    let minutes = crate::models::rental::duration_minutes(Some(start), end);
    price(minutes, trip.last(), membership, zones)
}

/// Tarificar un alquiler cerrado
pub fn quote(rental: &Rental, membership: &Membership, zones: &[Zone]) -> PriceQuote {
    price(
        rental.duration_minutes(),
        rental.final_position(),
        membership,
        zones,
    )
}

fn price(
    minutes: i64,
    final_position: Option<&Position>,
    membership: &Membership,
    zones: &[Zone],
) -> PriceQuote {
    let tier = membership.effective_tier();
    let parking = check_parking(final_position, zones);

    PriceQuote {
        cost: compute_cost(minutes, tier, parking.ok),
        minutes,
        tier,
        parking,
    }
}
