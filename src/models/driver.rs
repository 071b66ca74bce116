use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Offline,
    Online,
    OnTrip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub vehicle_plate: Option<String>,
    pub vehicle_model: Option<String>,
    pub status: DriverStatus,
    pub location: Option<GeoPoint>,
    /// Ride this driver currently owns (ASSIGNED or IN_PROGRESS).
    pub engaged_ride: Option<Uuid>,
    /// Kilometres travelled since the engaged ride was started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_odometer_km: Option<f64>,
    pub updated_at: DateTime<Utc>,
}
