use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Requested,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Requested => "requested",
            RideStatus::Assigned => "assigned",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    /// ASSIGNED or IN_PROGRESS: a driver is actively working the ride.
    pub fn is_active(&self) -> bool {
        matches!(self, RideStatus::Assigned | RideStatus::InProgress)
    }
}

impl std::str::FromStr for RideStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "requested" => Ok(RideStatus::Requested),
            "assigned" => Ok(RideStatus::Assigned),
            "in_progress" => Ok(RideStatus::InProgress),
            "completed" => Ok(RideStatus::Completed),
            "cancelled" => Ok(RideStatus::Cancelled),
            other => Err(format!("unknown ride status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub pickup_label: Option<String>,
    pub dropoff_label: Option<String>,
    pub passenger_count: u8,
    pub estimated_distance_km: f64,
    pub estimated_duration_secs: f64,
    pub estimated_fare: f64,
    pub final_distance_km: Option<f64>,
    pub final_fare: Option<f64>,
    pub status: RideStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
