use std::collections::HashSet;

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::driver::{Driver, DriverStatus, GeoPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Claimed,
    UnknownDriver,
    NotOnline(DriverStatus),
    AlreadyEngaged(Uuid),
}

#[derive(Default)]
pub struct DriverRegistry {
    drivers: DashMap<Uuid, Driver>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: String,
        vehicle_plate: Option<String>,
        vehicle_model: Option<String>,
    ) -> Driver {
        let driver = Driver {
            id: Uuid::new_v4(),
            name,
            vehicle_plate,
            vehicle_model,
            status: DriverStatus::Offline,
            location: None,
            engaged_ride: None,
            trip_odometer_km: None,
            updated_at: Utc::now(),
        };

        self.drivers.insert(driver.id, driver.clone());
        driver
    }

    pub fn get(&self, id: &Uuid) -> Option<Driver> {
        self.drivers.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub fn list(&self) -> Vec<Driver> {
        let mut drivers: Vec<Driver> = self
            .drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        drivers.sort_by(|a, b| a.name.cmp(&b.name));
        drivers
    }

    /// The driver's own availability change. Lifecycle transitions never call this.
    pub fn set_status(&self, id: &Uuid, status: DriverStatus) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

        driver.status = status;
        driver.updated_at = Utc::now();

        Ok(driver.clone())
    }

    pub fn is_online(&self, id: &Uuid) -> bool {
        self.drivers
            .get(id)
            .is_some_and(|driver| driver.status == DriverStatus::Online)
    }

    /// Online drivers without an engaged ride.
    pub fn dispatchable(&self) -> HashSet<Uuid> {
        self.drivers
            .iter()
            .filter(|entry| {
                let driver = entry.value();
                driver.status == DriverStatus::Online && driver.engaged_ride.is_none()
            })
            .map(|entry| *entry.key())
            .collect()
    }

    /// Reserves the driver for `ride_id` if they are ONLINE and hold no other ride.
    pub fn claim(&self, driver_id: &Uuid, ride_id: Uuid) -> Claim {
        let Some(mut driver) = self.drivers.get_mut(driver_id) else {
            return Claim::UnknownDriver;
        };

        if driver.status != DriverStatus::Online {
            return Claim::NotOnline(driver.status);
        }

        if let Some(current) = driver.engaged_ride {
            return Claim::AlreadyEngaged(current);
        }

        driver.engaged_ride = Some(ride_id);
        driver.trip_odometer_km = None;
        Claim::Claimed
    }

    /// Clears the engagement only if it still points at `ride_id`.
    pub fn release(&self, driver_id: &Uuid, ride_id: &Uuid) -> bool {
        let Some(mut driver) = self.drivers.get_mut(driver_id) else {
            return false;
        };

        if driver.engaged_ride.as_ref() != Some(ride_id) {
            return false;
        }

        driver.engaged_ride = None;
        driver.trip_odometer_km = None;
        true
    }

    pub fn start_odometer(&self, driver_id: &Uuid, ride_id: &Uuid) {
        if let Some(mut driver) = self.drivers.get_mut(driver_id) {
            if driver.engaged_ride.as_ref() == Some(ride_id) {
                driver.trip_odometer_km = Some(0.0);
            }
        }
    }

    pub fn odometer(&self, driver_id: &Uuid, ride_id: &Uuid) -> Option<f64> {
        self.drivers.get(driver_id).and_then(|driver| {
            if driver.engaged_ride.as_ref() == Some(ride_id) {
                driver.trip_odometer_km
            } else {
                None
            }
        })
    }

    /// Stores the latest fix and advances a running trip odometer.
    pub fn record_location(&self, driver_id: &Uuid, point: GeoPoint) -> Result<(), AppError> {
        if !point.is_valid() {
            return Err(AppError::Validation("location is out of range".to_string()));
        }

        let mut driver = self
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        if let (Some(odometer), Some(previous)) = (driver.trip_odometer_km, driver.location) {
            driver.trip_odometer_km = Some(odometer + haversine_km(&previous, &point));
        }

        driver.location = Some(point);
        driver.updated_at = Utc::now();
        Ok(())
    }
}
