//! Authoritative ride records.
//!
//! Every status change goes through [`RideStore::update_where`]: the
//! precondition is checked and the mutation applied while the row's shard
//! lock is held, and the affected-row count is the only success signal.
//! A zero count is a normal outcome (lost race or stale precondition), not
//! an error.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::engine::transitions::Transition;
use crate::models::ride::{Ride, RideStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverGuard {
    Any,
    Unassigned,
    Is(Uuid),
}

#[derive(Debug, Clone, Copy)]
pub struct Precondition {
    pub statuses: &'static [RideStatus],
    pub driver: DriverGuard,
    pub passenger: Option<Uuid>,
}

impl Precondition {
    pub fn for_transition(transition: Transition) -> Self {
        Self {
            statuses: transition.from_states(),
            driver: DriverGuard::Any,
            passenger: None,
        }
    }

    pub fn unassigned(mut self) -> Self {
        self.driver = DriverGuard::Unassigned;
        self
    }

    pub fn driver(mut self, driver_id: Uuid) -> Self {
        self.driver = DriverGuard::Is(driver_id);
        self
    }

    pub fn passenger(mut self, passenger_id: Uuid) -> Self {
        self.passenger = Some(passenger_id);
        self
    }

    pub fn matches(&self, ride: &Ride) -> bool {
        let driver_ok = match self.driver {
            DriverGuard::Any => true,
            DriverGuard::Unassigned => ride.driver_id.is_none(),
            DriverGuard::Is(id) => ride.driver_id == Some(id),
        };
        let passenger_ok = self.passenger.is_none_or(|id| ride.passenger_id == id);

        self.statuses.contains(&ride.status) && driver_ok && passenger_ok
    }
}

/// Result of a conditional write, like `UPDATE ... RETURNING *`.
#[derive(Debug, Clone)]
pub struct Commit {
    pub rows_affected: u64,
    pub row: Option<Ride>,
}

impl Commit {
    fn none() -> Self {
        Self {
            rows_affected: 0,
            row: None,
        }
    }

    pub fn applied(&self) -> bool {
        self.rows_affected > 0
    }
}

#[derive(Default)]
pub struct RideStore {
    rides: DashMap<Uuid, Ride>,
}

impl RideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ride: Ride) {
        self.rides.insert(ride.id, ride);
    }

    pub fn get(&self, id: &Uuid) -> Option<Ride> {
        self.rides.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.rides.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.rides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rides.is_empty()
    }

    /// Applies `apply` and bumps `updated_at` only if `pre` holds at the moment
    /// of the write.
    pub fn update_where<F>(&self, id: &Uuid, pre: &Precondition, apply: F) -> Commit
    where
        F: FnOnce(&mut Ride),
    {
        let Some(mut ride) = self.rides.get_mut(id) else {
            return Commit::none();
        };

        if !pre.matches(&ride) {
            return Commit::none();
        }

        apply(&mut ride);
        ride.updated_at = Utc::now();

        Commit {
            rows_affected: 1,
            row: Some(ride.clone()),
        }
    }

    /// `SET status = ASSIGNED, driver_id = ? WHERE status = REQUESTED AND driver_id IS NULL`.
    pub fn assign(&self, ride_id: &Uuid, driver_id: Uuid) -> Commit {
        let pre = Precondition::for_transition(Transition::Assign).unassigned();
        self.update_where(ride_id, &pre, |ride| {
            ride.driver_id = Some(driver_id);
            ride.status = Transition::Assign.target();
        })
    }

    pub fn start(&self, ride_id: &Uuid, driver_id: Uuid) -> Commit {
        let pre = Precondition::for_transition(Transition::Start).driver(driver_id);
        self.update_where(ride_id, &pre, |ride| {
            ride.status = Transition::Start.target();
        })
    }

    /// Final distance and fare are written in the same commit as COMPLETED.
    pub fn complete(
        &self,
        ride_id: &Uuid,
        driver_id: Uuid,
        final_distance_km: f64,
        final_fare: f64,
    ) -> Commit {
        let pre = Precondition::for_transition(Transition::Complete).driver(driver_id);
        self.update_where(ride_id, &pre, |ride| {
            ride.final_distance_km = Some(final_distance_km);
            ride.final_fare = Some(final_fare);
            ride.status = Transition::Complete.target();
        })
    }

    pub fn cancel(&self, ride_id: &Uuid, passenger_id: Uuid) -> Commit {
        let pre = Precondition::for_transition(Transition::Cancel).passenger(passenger_id);
        self.update_where(ride_id, &pre, |ride| {
            ride.status = Transition::Cancel.target();
        })
    }

    fn collect<P>(&self, predicate: P, limit: usize) -> Vec<Ride>
    where
        P: Fn(&Ride) -> bool,
    {
        let mut rides: Vec<Ride> = self
            .rides
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rides.truncate(limit);
        rides
    }

    /// Newest first. `None` returns every status.
    pub fn list(&self, status: Option<RideStatus>, limit: usize) -> Vec<Ride> {
        self.collect(|ride| status.is_none_or(|s| ride.status == s), limit)
    }

    pub fn available(&self, limit: usize) -> Vec<Ride> {
        self.collect(
            |ride| ride.status == RideStatus::Requested && ride.driver_id.is_none(),
            limit,
        )
    }

    pub fn current_for_driver(&self, driver_id: &Uuid) -> Option<Ride> {
        self.collect(
            |ride| ride.driver_id.as_ref() == Some(driver_id) && ride.status.is_active(),
            1,
        )
        .pop()
    }

    pub fn current_for_passenger(&self, passenger_id: &Uuid) -> Option<Ride> {
        self.collect(
            |ride| ride.passenger_id == *passenger_id && !ride.status.is_terminal(),
            1,
        )
        .pop()
    }

    pub fn history_for_driver(&self, driver_id: &Uuid, limit: usize) -> Vec<Ride> {
        self.collect(
            |ride| ride.driver_id.as_ref() == Some(driver_id) && ride.status.is_terminal(),
            limit,
        )
    }

    pub fn count_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&Ride) -> bool,
    {
        self.rides
            .iter()
            .filter(|entry| predicate(entry.value()))
            .count()
    }

    /// Sum of final fares for rides completed at or after `since`.
    pub fn revenue_since(&self, since: DateTime<Utc>) -> f64 {
        self.rides
            .iter()
            .filter(|entry| {
                let ride = entry.value();
                ride.status == RideStatus::Completed && ride.updated_at >= since
            })
            .filter_map(|entry| entry.value().final_fare)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::RideStore;
    use crate::models::driver::GeoPoint;
    use crate::models::ride::{Ride, RideStatus};

    fn ride(passenger_id: Uuid) -> Ride {
        let now = Utc::now();
        Ride {
            id: Uuid::new_v4(),
            passenger_id,
            driver_id: None,
            pickup: GeoPoint {
                lat: 14.55,
                lng: 121.02,
            },
            dropoff: GeoPoint {
                lat: 14.58,
                lng: 121.06,
            },
            pickup_label: None,
            dropoff_label: None,
            passenger_count: 1,
            estimated_distance_km: 5.3,
            estimated_duration_secs: 760.0,
            estimated_fare: 55.0,
            final_distance_km: None,
            final_fare: None,
            status: RideStatus::Requested,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn second_assign_affects_zero_rows() {
        let store = RideStore::new();
        let r = ride(Uuid::new_v4());
        let id = r.id;
        store.insert(r);

        let first = store.assign(&id, Uuid::from_u128(1));
        let second = store.assign(&id, Uuid::from_u128(2));

        assert_eq!(first.rows_affected, 1);
        assert_eq!(second.rows_affected, 0);
        assert_eq!(store.get(&id).unwrap().driver_id, Some(Uuid::from_u128(1)));
    }

    #[test]
    fn start_requires_the_assigned_driver() {
        let store = RideStore::new();
        let r = ride(Uuid::new_v4());
        let id = r.id;
        store.insert(r);
        store.assign(&id, Uuid::from_u128(1));

        assert!(!store.start(&id, Uuid::from_u128(2)).applied());
        assert!(store.start(&id, Uuid::from_u128(1)).applied());
        assert!(!store.start(&id, Uuid::from_u128(1)).applied());
        assert_eq!(store.get(&id).unwrap().status, RideStatus::InProgress);
    }

    #[test]
    fn complete_writes_finals_with_status() {
        let store = RideStore::new();
        let r = ride(Uuid::new_v4());
        let id = r.id;
        store.insert(r);
        let driver = Uuid::from_u128(1);

        assert!(!store.complete(&id, driver, 6.0, 55.0).applied());
        assert!(store.get(&id).unwrap().final_fare.is_none());

        store.assign(&id, driver);
        store.start(&id, driver);
        let commit = store.complete(&id, driver, 6.0, 55.0);

        let row = commit.row.unwrap();
        assert_eq!(row.status, RideStatus::Completed);
        assert_eq!(row.final_distance_km, Some(6.0));
        assert_eq!(row.final_fare, Some(55.0));
    }

    #[test]
    fn cancel_is_scoped_to_the_owning_passenger() {
        let store = RideStore::new();
        let owner = Uuid::new_v4();
        let r = ride(owner);
        let id = r.id;
        store.insert(r);

        assert!(!store.cancel(&id, Uuid::new_v4()).applied());
        assert!(store.cancel(&id, owner).applied());
        assert!(!store.cancel(&id, owner).applied());
        assert!(!store.assign(&id, Uuid::from_u128(1)).applied());
    }

    #[test]
    fn missing_ride_affects_zero_rows() {
        let store = RideStore::new();
        assert_eq!(store.assign(&Uuid::new_v4(), Uuid::new_v4()).rows_affected, 0);
    }

    #[test]
    fn queries_filter_by_owner_and_status() {
        let store = RideStore::new();
        let passenger = Uuid::new_v4();
        let driver = Uuid::from_u128(5);
        let open = ride(passenger);
        let taken = ride(passenger);
        let taken_id = taken.id;
        store.insert(open);
        store.insert(taken);
        store.assign(&taken_id, driver);

        assert_eq!(store.available(10).len(), 1);
        assert_eq!(store.current_for_driver(&driver).unwrap().id, taken_id);
        assert_eq!(store.list(Some(RideStatus::Assigned), 10).len(), 1);
        assert_eq!(store.list(None, 10).len(), 2);
        assert!(store.history_for_driver(&driver, 10).is_empty());
    }
}
