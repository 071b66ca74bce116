use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;
use crate::models::ride::{Ride, RideStatus};

/// A committed lifecycle transition, published to every connected observer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideEvent {
    pub ride_id: Uuid,
    pub passenger_id: Uuid,
    pub status: RideStatus,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: RideEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RideEventKind {
    RideAssigned {
        driver_id: Uuid,
        driver_name: String,
    },
    RideStarted {
        driver_id: Uuid,
    },
    RideCompleted {
        driver_id: Uuid,
        passenger_count: u8,
        final_distance_km: f64,
        final_fare: f64,
    },
    RideCancelled {
        driver_id: Option<Uuid>,
    },
}

impl RideEvent {
    pub fn new(ride: &Ride, kind: RideEventKind) -> Self {
        Self {
            ride_id: ride.id,
            passenger_id: ride.passenger_id,
            status: ride.status,
            at: ride.updated_at,
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverLocationUpdate {
    pub driver_id: Uuid,
    pub lat: f64,
    pub lng: f64,
}

/// Frames pushed to realtime sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "ride:incoming")]
    RideIncoming(Ride),
    #[serde(rename = "ride:status:update")]
    RideStatusUpdate(RideEvent),
    #[serde(rename = "ride:accept:result")]
    AcceptResult {
        ride_id: Uuid,
        accepted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "driver:location:update")]
    DriverLocation(DriverLocationUpdate),
    #[serde(rename = "auth:ok")]
    AuthOk { driver_id: Uuid },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Frames received from realtime sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "auth:driver")]
    AuthDriver { driver_id: Uuid },
    #[serde(rename = "driver:location")]
    DriverLocation(GeoPoint),
    #[serde(rename = "ride:accept")]
    AcceptRide { ride_id: Uuid },
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::{ClientMessage, RideEventKind, ServerMessage};

    #[test]
    fn status_update_flattens_transition_fields() {
        let ride_id = Uuid::from_u128(7);
        let driver_id = Uuid::from_u128(9);
        let event = super::RideEvent {
            ride_id,
            passenger_id: Uuid::from_u128(1),
            status: crate::models::ride::RideStatus::Assigned,
            at: chrono::Utc::now(),
            kind: RideEventKind::RideAssigned {
                driver_id,
                driver_name: "Juan".to_string(),
            },
        };

        let value = serde_json::to_value(ServerMessage::RideStatusUpdate(event)).unwrap();

        assert_eq!(value["event"], "ride:status:update");
        assert_eq!(value["data"]["type"], "ride_assigned");
        assert_eq!(value["data"]["status"], "assigned");
        assert_eq!(value["data"]["driver_name"], "Juan");
        assert!(value["data"].get("final_fare").is_none());
    }

    #[test]
    fn parses_accept_frame() {
        let ride_id = Uuid::from_u128(42);
        let frame = json!({ "event": "ride:accept", "data": { "ride_id": ride_id } });

        let message: ClientMessage = serde_json::from_value(frame).unwrap();

        assert!(matches!(message, ClientMessage::AcceptRide { ride_id: id } if id == ride_id));
    }
}
