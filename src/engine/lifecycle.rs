//! Ride lifecycle: validates each call, commits it through the ride store's
//! conditional writes and publishes the committed transition.
//!
//! ```text
//! REQUESTED   -> ASSIGNED | CANCELLED
//! ASSIGNED    -> IN_PROGRESS | CANCELLED
//! IN_PROGRESS -> COMPLETED
//! ```

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::fare::{calculate_fare, MAX_PASSENGERS, MIN_PASSENGERS};
use crate::error::AppError;
use crate::geo::{MetricSource, TripMetrics};
use crate::models::driver::GeoPoint;
use crate::models::event::{RideEvent, RideEventKind};
use crate::models::ride::{Ride, RideStatus};
use crate::state::AppState;
use crate::store::drivers::Claim;
use crate::store::rides::Commit;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RideRequest {
    pub pickup: Option<GeoPoint>,
    pub dropoff: Option<GeoPoint>,
    pub pickup_label: Option<String>,
    pub dropoff_label: Option<String>,
    pub passenger_count: Option<i64>,
}

fn validate_request(request: &RideRequest) -> Result<(GeoPoint, GeoPoint, u8), AppError> {
    let pickup = request
        .pickup
        .ok_or_else(|| AppError::Validation("pickup coordinates are required".to_string()))?;
    let dropoff = request
        .dropoff
        .ok_or_else(|| AppError::Validation("dropoff coordinates are required".to_string()))?;

    if !pickup.is_valid() {
        return Err(AppError::Validation("pickup coordinates are out of range".to_string()));
    }
    if !dropoff.is_valid() {
        return Err(AppError::Validation("dropoff coordinates are out of range".to_string()));
    }

    let count = request.passenger_count.unwrap_or(i64::from(MIN_PASSENGERS));
    if !(i64::from(MIN_PASSENGERS)..=i64::from(MAX_PASSENGERS)).contains(&count) {
        return Err(AppError::Validation(format!(
            "passenger_count must be between {MIN_PASSENGERS} and {MAX_PASSENGERS}"
        )));
    }

    Ok((pickup, dropoff, count as u8))
}

fn record_trip_metrics(state: &AppState, metrics: &TripMetrics) {
    if let MetricSource::Fallback(reason) = metrics.source {
        state
            .metrics
            .routing_fallbacks_total
            .with_label_values(&[reason])
            .inc();
    }
}

fn record_transition(state: &AppState, ride: &Ride) {
    state
        .metrics
        .ride_transitions_total
        .with_label_values(&[ride.status.as_str()])
        .inc();
}

/// Distinguishes a missing ride from a failed precondition after a zero-row commit.
fn lost(state: &AppState, ride_id: &Uuid, conflict: AppError) -> AppError {
    if state.rides.contains(ride_id) {
        conflict
    } else {
        AppError::NotFound(format!("ride {ride_id} not found"))
    }
}

fn committed(commit: Commit) -> Result<Ride, AppError> {
    commit
        .row
        .ok_or_else(|| AppError::Internal("commit reported success without a row".to_string()))
}

pub async fn request_ride(
    state: &AppState,
    passenger_id: Uuid,
    request: RideRequest,
) -> Result<Ride, AppError> {
    let (pickup, dropoff, passenger_count) = validate_request(&request)?;

    let trip = state.geo.trip_metrics(&pickup, &dropoff).await;
    record_trip_metrics(state, &trip);

    let now = Utc::now();
    let ride = Ride {
        id: Uuid::new_v4(),
        passenger_id,
        driver_id: None,
        pickup,
        dropoff,
        pickup_label: request.pickup_label,
        dropoff_label: request.dropoff_label,
        passenger_count,
        estimated_distance_km: trip.distance_km,
        estimated_duration_secs: trip.duration_secs,
        estimated_fare: calculate_fare(trip.distance_km, passenger_count),
        final_distance_km: None,
        final_fare: None,
        status: RideStatus::Requested,
        created_at: now,
        updated_at: now,
    };

    state.rides.insert(ride.clone());
    state.metrics.rides_requested_total.inc();
    record_transition(state, &ride);

    info!(
        ride_id = %ride.id,
        passenger_id = %passenger_id,
        estimated_distance_km = ride.estimated_distance_km,
        estimated_fare = ride.estimated_fare,
        "ride requested"
    );

    // A new ride is only offered to eligible drivers, never broadcast.
    let eligible = state.drivers.dispatchable();
    let delivered = state.broadcaster.dispatch_ride(&ride, &eligible);
    state
        .metrics
        .dispatch_deliveries_total
        .inc_by(delivered as u64);

    Ok(ride)
}

/// First writer wins: the driver whose conditional commit lands while the
/// ride is still REQUESTED and unassigned owns it; everyone else gets
/// [`AppError::Conflict`].
pub async fn accept_ride(state: &AppState, driver_id: Uuid, ride_id: Uuid) -> Result<Ride, AppError> {
    let outcome = try_accept(state, driver_id, ride_id);

    let label = match &outcome {
        Ok(_) => "success",
        Err(AppError::Conflict(_)) => "conflict",
        Err(AppError::Permission(_)) => "permission",
        Err(_) => "error",
    };
    state
        .metrics
        .accept_attempts_total
        .with_label_values(&[label])
        .inc();

    outcome
}

fn try_accept(state: &AppState, driver_id: Uuid, ride_id: Uuid) -> Result<Ride, AppError> {
    if !state.rides.contains(&ride_id) {
        return Err(AppError::NotFound(format!("ride {ride_id} not found")));
    }

    let driver = state
        .drivers
        .get(&driver_id)
        .ok_or_else(|| AppError::Permission(format!("driver {driver_id} is not registered")))?;

    match state.drivers.claim(&driver_id, ride_id) {
        Claim::Claimed => {}
        Claim::UnknownDriver => {
            return Err(AppError::Permission(format!(
                "driver {driver_id} is not registered"
            )));
        }
        Claim::NotOnline(status) => {
            info!(driver_id = %driver_id, ?status, "accept rejected: driver not online");
            return Err(AppError::must_be_online());
        }
        Claim::AlreadyEngaged(current) if current == ride_id => {
            return Err(AppError::ride_unavailable());
        }
        Claim::AlreadyEngaged(current) => {
            info!(driver_id = %driver_id, current_ride = %current, "accept rejected: driver busy");
            return Err(AppError::Conflict("you already have an active ride".to_string()));
        }
    }

    let commit = state.rides.assign(&ride_id, driver_id);
    if !commit.applied() {
        state.drivers.release(&driver_id, &ride_id);
        info!(ride_id = %ride_id, driver_id = %driver_id, "accept lost the race");
        return Err(lost(state, &ride_id, AppError::ride_unavailable()));
    }

    let ride = committed(commit)?;
    record_transition(state, &ride);
    info!(ride_id = %ride.id, driver_id = %driver_id, "ride assigned");

    state.broadcaster.publish(RideEvent::new(
        &ride,
        RideEventKind::RideAssigned {
            driver_id,
            driver_name: driver.name,
        },
    ));

    Ok(ride)
}

pub async fn start_ride(state: &AppState, driver_id: Uuid, ride_id: Uuid) -> Result<Ride, AppError> {
    let commit = state.rides.start(&ride_id, driver_id);
    if !commit.applied() {
        return Err(lost(
            state,
            &ride_id,
            AppError::Conflict("ride is not assigned to you or has already started".to_string()),
        ));
    }

    let ride = committed(commit)?;
    state.drivers.start_odometer(&driver_id, &ride_id);
    record_transition(state, &ride);
    info!(ride_id = %ride.id, driver_id = %driver_id, "ride started");

    state
        .broadcaster
        .publish(RideEvent::new(&ride, RideEventKind::RideStarted { driver_id }));

    Ok(ride)
}

/// Settles the ride on the measured distance: the driver's trip odometer
/// when it has readings, otherwise a fresh pickup-to-dropoff estimate.
pub async fn complete_ride(
    state: &AppState,
    driver_id: Uuid,
    ride_id: Uuid,
) -> Result<Ride, AppError> {
    let ride = state
        .rides
        .get(&ride_id)
        .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;

    let final_distance_km = match state
        .drivers
        .odometer(&driver_id, &ride_id)
        .filter(|km| *km > 0.0)
    {
        Some(km) => km,
        None => {
            let trip = state.geo.trip_metrics(&ride.pickup, &ride.dropoff).await;
            record_trip_metrics(state, &trip);
            trip.distance_km
        }
    };
    let final_fare = calculate_fare(final_distance_km, ride.passenger_count);

    let commit = state
        .rides
        .complete(&ride_id, driver_id, final_distance_km, final_fare);
    if !commit.applied() {
        return Err(AppError::Conflict(
            "ride is not in progress under your assignment".to_string(),
        ));
    }

    let ride = committed(commit)?;
    if !state.drivers.release(&driver_id, &ride_id) {
        warn!(ride_id = %ride_id, driver_id = %driver_id, "completed ride had no engagement to release");
    }
    record_transition(state, &ride);
    info!(
        ride_id = %ride.id,
        driver_id = %driver_id,
        final_distance_km,
        final_fare,
        "ride completed"
    );

    state.broadcaster.publish(RideEvent::new(
        &ride,
        RideEventKind::RideCompleted {
            driver_id,
            passenger_count: ride.passenger_count,
            final_distance_km,
            final_fare,
        },
    ));

    Ok(ride)
}

pub async fn cancel_ride(
    state: &AppState,
    passenger_id: Uuid,
    ride_id: Uuid,
) -> Result<Ride, AppError> {
    let owner = state
        .rides
        .get(&ride_id)
        .map(|ride| ride.passenger_id)
        .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;

    if owner != passenger_id {
        return Err(AppError::Permission("this ride belongs to another passenger".to_string()));
    }

    let commit = state.rides.cancel(&ride_id, passenger_id);
    if !commit.applied() {
        return Err(AppError::Conflict("ride can no longer be cancelled".to_string()));
    }

    let ride = committed(commit)?;
    if let Some(driver_id) = ride.driver_id {
        state.drivers.release(&driver_id, &ride_id);
    }
    record_transition(state, &ride);
    info!(ride_id = %ride.id, passenger_id = %passenger_id, "ride cancelled");

    state.broadcaster.publish(RideEvent::new(
        &ride,
        RideEventKind::RideCancelled {
            driver_id: ride.driver_id,
        },
    ));

    Ok(ride)
}
