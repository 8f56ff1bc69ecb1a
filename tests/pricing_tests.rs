use chrono::{Duration, Utc};
use uuid::Uuid;

use scooter_fleet::models::{
    GeoPoint, Membership, MembershipStatus, MembershipTier, Position, Rental, Zone, ZoneKind,
};
use scooter_fleet::services::geofence::{haversine_m, zone_contains};
use scooter_fleet::services::pricing_service::{quote, ParkingFailure};

fn closed_rental(minutes: i64, trip: Vec<Position>) -> Rental {
    let start = Utc::now();
    let mut rental = Rental::open(Uuid::new_v4(), Uuid::new_v4(), start, 0);
    rental.end_time = Some(start + Duration::minutes(minutes));
    rental.trip_history = trip;
    rental
}

fn plaza() -> Zone {
    Zone::polygon(
        "Plaza Mayor",
        ZoneKind::Parking,
        vec![
            GeoPoint::new(40.4150, -3.7080),
            GeoPoint::new(40.4150, -3.7060),
            GeoPoint::new(40.4160, -3.7060),
            GeoPoint::new(40.4160, -3.7080),
        ],
    )
}

#[test]
fn test_five_minutes_parked_costs_ten() {
    let zone = plaza();
    let rental = closed_rental(5, vec![Position::new(40.4155, -3.7070, Utc::now())]);

    let quote = quote(&rental, &Membership::default(), &[zone.clone()]);
    assert_eq!(quote.minutes, 5);
    assert_eq!(quote.cost, 10);
    assert!(quote.parking.ok);
    assert_eq!(quote.parking.zone_id, Some(zone.id));
    assert_eq!(quote.parking.zone_name.as_deref(), Some("Plaza Mayor"));
}

#[test]
fn test_five_minutes_outside_costs_twenty() {
    let rental = closed_rental(5, vec![Position::new(40.5, -3.5, Utc::now())]);
    let quote = quote(&rental, &Membership::default(), &[plaza()]);
    assert_eq!(quote.cost, 20);
    assert_eq!(quote.parking.reason, Some(ParkingFailure::OutsideParkingZone));
}

#[test]
fn test_medium_eleven_minutes_outside_costs_twenty_one() {
    let rental = closed_rental(11, vec![Position::new(40.5, -3.5, Utc::now())]);
    let quote = quote(&rental, &Membership::active(MembershipTier::Medium), &[plaza()]);
    assert_eq!(quote.tier, MembershipTier::Medium);
    assert_eq!(quote.cost, 21);
}

#[test]
fn test_allin_without_history_is_free() {
    let rental = closed_rental(45, Vec::new());
    let quote = quote(&rental, &Membership::active(MembershipTier::Allin), &[plaza()]);
    assert_eq!(quote.cost, 0);
    assert!(!quote.parking.ok);
    assert_eq!(quote.parking.reason, Some(ParkingFailure::NoTripHistory));
}

#[test]
fn test_inactive_membership_is_ignored() {
    let rental = closed_rental(11, vec![Position::new(40.5, -3.5, Utc::now())]);
    let membership = Membership {
        tier: MembershipTier::Medium,
        status: MembershipStatus::Inactive,
    };
    assert_eq!(quote(&rental, &membership, &[]).cost, 32);
}

#[test]
fn test_partial_minutes_round_up() {
    let start = Utc::now();
    let mut rental = Rental::open(Uuid::new_v4(), Uuid::new_v4(), start, 0);
    rental.end_time = Some(start + Duration::seconds(61));
    rental.trip_history = vec![Position::new(40.4155, -3.7070, start)];

    let quote = quote(&rental, &Membership::default(), &[plaza()]);
    assert_eq!(quote.minutes, 2);
    assert_eq!(quote.cost, 4);
}

#[test]
fn test_only_last_position_counts() {
    let now = Utc::now();
    let rental = closed_rental(
        3,
        vec![
            Position::new(40.4155, -3.7070, now),
            Position::new(40.5, -3.5, now),
        ],
    );
    let quote = quote(&rental, &Membership::default(), &[plaza()]);
    assert!(!quote.parking.ok);
}

#[test]
fn test_circle_zone_membership() {
    let center = GeoPoint::new(40.4168, -3.7038);
    let zone = Zone::circle("Sol", ZoneKind::Parking, center, 50.0);

    let near = GeoPoint::new(40.4170, -3.7038);
    let far = GeoPoint::new(40.4180, -3.7038);
    assert!(haversine_m(center, near) < 50.0);
    assert!(zone_contains(&zone, near));
    assert!(!zone_contains(&zone, far));
}

#[test]
fn test_malformed_zone_is_skipped_not_fatal() {
    let mut broken = Zone::polygon(
        "broken",
        ZoneKind::Parking,
        vec![GeoPoint::new(40.4155, -3.7070)],
    );
    broken.area = None;
    let rental = closed_rental(5, vec![Position::new(40.4155, -3.7070, Utc::now())]);

    let quote = quote(&rental, &Membership::default(), &[broken, plaza()]);
    assert!(quote.parking.ok);
    assert_eq!(quote.parking.zone_name.as_deref(), Some("Plaza Mayor"));
}
