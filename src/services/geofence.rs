//! Pruebas de pertenencia a geocercas
//!
//! Los polígonos se recorren como pares `[lat, lng]` en el orden en que se
//! guardan; el círculo usa distancia de gran círculo.

use crate::models::{GeoPoint, Zone, ZoneGeometry};

/// Radio medio de la Tierra en metros
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Distancia haversine entre dos puntos, en metros
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Ray casting sobre el anillo (cerrado implícitamente)
pub fn point_in_polygon(point: GeoPoint, ring: &[GeoPoint]) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let (x, y) = (point.lat, point.lng);
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = (ring[i].lat, ring[i].lng);
        let (xj, yj) = (ring[j].lat, ring[j].lng);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

pub fn point_in_circle(point: GeoPoint, center: GeoPoint, radius_m: f64) -> bool {
    haversine_m(point, center) <= radius_m
}

/// `false` para zonas con geometría inválida
pub fn zone_contains(zone: &Zone, point: GeoPoint) -> bool {
    match zone.geometry() {
        Some(ZoneGeometry::Circle { center, radius }) => point_in_circle(point, center, radius),
        Some(ZoneGeometry::Polygon(ring)) => point_in_polygon(point, ring),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ZoneKind;

    fn square() -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 1.0),
            GeoPoint::new(1.0, 1.0),
            GeoPoint::new(1.0, 0.0),
        ]
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_m(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 1.0, "distance was {}", d);
        assert_eq!(haversine_m(GeoPoint::new(40.0, -3.0), GeoPoint::new(40.0, -3.0)), 0.0);
    }

    #[test]
    fn test_point_in_square() {
        assert!(point_in_polygon(GeoPoint::new(0.5, 0.5), &square()));
        assert!(!point_in_polygon(GeoPoint::new(1.5, 0.5), &square()));
        assert!(!point_in_polygon(GeoPoint::new(0.5, -0.1), &square()));
    }

    #[test]
    fn test_concave_polygon() {
        // Forma de "U": el hueco central queda fuera
        let u = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 3.0),
            GeoPoint::new(3.0, 3.0),
            GeoPoint::new(3.0, 2.0),
            GeoPoint::new(1.0, 2.0),
            GeoPoint::new(1.0, 1.0),
            GeoPoint::new(3.0, 1.0),
            GeoPoint::new(3.0, 0.0),
        ];
        assert!(point_in_polygon(GeoPoint::new(0.5, 1.5), &u));
        assert!(point_in_polygon(GeoPoint::new(2.0, 0.5), &u));
        assert!(!point_in_polygon(GeoPoint::new(2.0, 1.5), &u));
    }

    #[test]
    fn test_circle_boundary_is_inclusive() {
        let center = GeoPoint::new(40.0, -3.0);
        let edge = GeoPoint::new(40.001, -3.0);
        let radius = haversine_m(center, edge);
        assert!(point_in_circle(edge, center, radius));
        assert!(!point_in_circle(edge, center, radius - 0.01));
    }

    #[test]
    fn test_malformed_zone_contains_nothing() {
        let mut zone = Zone::circle("z", ZoneKind::Parking, GeoPoint::new(0.0, 0.0), 100.0);
        zone.center = None;
        assert!(!zone_contains(&zone, GeoPoint::new(0.0, 0.0)));
    }
}
