//! Fixed tariff used both for estimates and for settlement.

pub const BASE_FARE: f64 = 40.0;
/// Distance covered by the base fare, in kilometres.
pub const INCLUDED_KM: f64 = 5.0;
pub const PER_EXTRA_KM: f64 = 15.0;

pub const MIN_PASSENGERS: u8 = 1;
pub const MAX_PASSENGERS: u8 = 4;

/// `(BASE_FARE + ceil(max(0, distance - INCLUDED_KM)) * PER_EXTRA_KM) * passengers`.
///
/// Any partial kilometre past the included distance bills as a whole one.
pub fn calculate_fare(distance_km: f64, passenger_count: u8) -> f64 {
    let distance_km = if distance_km.is_finite() {
        distance_km
    } else {
        0.0
    };
    let extra_km = (distance_km - INCLUDED_KM).max(0.0).ceil();

    (BASE_FARE + extra_km * PER_EXTRA_KM) * f64::from(passenger_count)
}
