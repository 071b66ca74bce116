use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::rest::extract::ValidJson;
use crate::api::rest::identity::{Caller, Role};
use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::ride::{Ride, RideStatus};
use crate::state::AppState;

const RIDE_LIST_LIMIT: usize = 200;
const RECENT_RIDES: usize = 10;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/drivers", get(list_drivers).post(create_driver))
        .route("/admin/rides", get(list_rides))
        .route("/admin/dashboard", get(dashboard))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    pub vehicle_plate: Option<String>,
    pub vehicle_model: Option<String>,
}

#[derive(Deserialize)]
pub struct RideFilter {
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct Dashboard {
    pub total_drivers: usize,
    pub active_rides: usize,
    pub total_rides: usize,
    pub todays_revenue: f64,
    pub recent_rides: Vec<Ride>,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ValidJson(payload): ValidJson<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    caller.require(Role::Admin)?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    let driver = state
        .drivers
        .register(name.to_string(), payload.vehicle_plate, payload.vehicle_model);
    Ok(Json(driver))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<Driver>>, AppError> {
    caller.require(Role::Admin)?;
    Ok(Json(state.drivers.list()))
}

async fn list_rides(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(filter): Query<RideFilter>,
) -> Result<Json<Vec<Ride>>, AppError> {
    caller.require(Role::Admin)?;

    let status = match filter.status.as_deref() {
        None | Some("all") | Some("") => None,
        Some(raw) => Some(raw.parse::<RideStatus>().map_err(AppError::Validation)?),
    };

    Ok(Json(state.rides.list(status, RIDE_LIST_LIMIT)))
}

async fn dashboard(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Dashboard>, AppError> {
    caller.require(Role::Admin)?;

    let start_of_day = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| AppError::Internal("failed to compute start of day".to_string()))?;

    Ok(Json(Dashboard {
        total_drivers: state.drivers.len(),
        active_rides: state
            .rides
            .count_where(|ride| !ride.status.is_terminal()),
        total_rides: state.rides.len(),
        todays_revenue: state.rides.revenue_since(start_of_day),
        recent_rides: state.rides.list(None, RECENT_RIDES),
    }))
}
