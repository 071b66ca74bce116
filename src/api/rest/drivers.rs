use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::rest::extract::ValidJson;
use crate::api::rest::identity::{Caller, Role};
use crate::api::rest::rides::CurrentRideResponse;
use crate::engine::lifecycle;
use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::ride::Ride;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 200;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/driver/status", post(update_status))
        .route("/driver/rides/available", get(available_rides))
        .route("/driver/rides/current", get(current_ride))
        .route("/driver/rides/history", get(ride_history))
        .route("/driver/rides/:id/accept", post(accept_ride))
        .route("/driver/rides/:id/start", post(start_ride))
        .route("/driver/rides/:id/complete", post(complete_ride))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ValidJson(payload): ValidJson<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver_id = caller.require(Role::Driver)?;
    let driver = state.drivers.set_status(&driver_id, payload.status)?;

    info!(driver_id = %driver_id, status = ?driver.status, "driver status changed");
    Ok(Json(driver))
}

async fn available_rides(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<Ride>>, AppError> {
    let driver_id = caller.require(Role::Driver)?;
    if !state.drivers.is_online(&driver_id) {
        return Err(AppError::Permission(
            "you must be online to see available rides".to_string(),
        ));
    }

    Ok(Json(state.rides.available(MAX_LIST_LIMIT)))
}

async fn current_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<CurrentRideResponse>, AppError> {
    let driver_id = caller.require(Role::Driver)?;
    Ok(Json(CurrentRideResponse {
        ride: state.rides.current_for_driver(&driver_id),
    }))
}

async fn ride_history(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Ride>>, AppError> {
    let driver_id = caller.require(Role::Driver)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    Ok(Json(state.rides.history_for_driver(&driver_id, limit)))
}

async fn accept_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let driver_id = caller.require(Role::Driver)?;
    Ok(Json(lifecycle::accept_ride(&state, driver_id, id).await?))
}

async fn start_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let driver_id = caller.require(Role::Driver)?;
    Ok(Json(lifecycle::start_ride(&state, driver_id, id).await?))
}

async fn complete_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let driver_id = caller.require(Role::Driver)?;
    Ok(Json(lifecycle::complete_ride(&state, driver_id, id).await?))
}
