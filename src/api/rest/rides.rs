use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Serialize;
use uuid::Uuid;

use crate::api::rest::extract::ValidJson;
use crate::api::rest::identity::{Caller, Role};
use crate::engine::lifecycle::{self, RideRequest};
use crate::error::AppError;
use crate::models::ride::Ride;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides", post(request_ride))
        .route("/rides/:id", get(get_ride))
        .route("/rides/:id/cancel", post(cancel_ride))
        .route("/passenger/rides/current", get(current_ride))
}

#[derive(Serialize)]
pub struct CurrentRideResponse {
    pub ride: Option<Ride>,
}

async fn request_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ValidJson(payload): ValidJson<RideRequest>,
) -> Result<Json<Ride>, AppError> {
    let passenger_id = caller.require(Role::Passenger)?;
    let ride = lifecycle::request_ride(&state, passenger_id, payload).await?;
    Ok(Json(ride))
}

async fn cancel_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let passenger_id = caller.require(Role::Passenger)?;
    let ride = lifecycle::cancel_ride(&state, passenger_id, id).await?;
    Ok(Json(ride))
}

/// Visible to the owning passenger, the assigned driver and admins.
async fn get_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let ride = state
        .rides
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("ride {id} not found")))?;

    let visible = match caller.role {
        Role::Admin => true,
        Role::Passenger => ride.passenger_id == caller.id,
        Role::Driver => ride.driver_id == Some(caller.id),
    };
    if !visible {
        return Err(AppError::Permission("not a party to this ride".to_string()));
    }

    Ok(Json(ride))
}

async fn current_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<CurrentRideResponse>, AppError> {
    let passenger_id = caller.require(Role::Passenger)?;
    Ok(Json(CurrentRideResponse {
        ride: state.rides.current_for_passenger(&passenger_id),
    }))
}
