//! Modelo de Rental
//!
//! Un alquiler abre con el índice del historial del vehículo y al cerrarse
//! captura el tramo de posiciones que le pertenece.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::Position;

/// Rental - mapea a la tabla rentals
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rental {
    pub id: Uuid,
    #[serde(rename = "user")]
    pub user_id: Uuid,
    #[serde(rename = "scooter")]
    pub scooter_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub start_history_index: usize,
    pub trip_history: Vec<Position>,
    pub cost: Option<i64>,
    /// `false` mientras el coste no se haya descontado del crédito
    pub paid: bool,
}

impl Rental {
    pub fn open(
        user_id: Uuid,
        scooter_id: Uuid,
        start_time: DateTime<Utc>,
        start_history_index: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            scooter_id,
            start_time,
            end_time: None,
            start_history_index,
            trip_history: Vec::new(),
            cost: None,
            paid: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Duración en minutos completos (redondeo hacia arriba)
    pub fn duration_minutes(&self) -> i64 {
        duration_minutes(Some(self.start_time), self.end_time)
    }

    /// Última posición del viaje
    pub fn final_position(&self) -> Option<&Position> {
        self.trip_history.last()
    }
}

/// `ceil((end - start) / 60000)`; cero si falta alguno de los dos
pub fn duration_minutes(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> i64 {
    match (start, end) {
        (Some(start), Some(end)) => {
            let millis = (end - start).num_milliseconds().max(0);
            (millis + 59_999) / 60_000
        }
        _ => 0,
    }
}
