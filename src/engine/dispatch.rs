use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::event::{DriverLocationUpdate, RideEvent, ServerMessage};
use crate::models::ride::Ride;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSession {
    pub driver_id: Uuid,
    pub authenticated_at: DateTime<Utc>,
}

struct SessionEntry {
    tx: mpsc::UnboundedSender<ServerMessage>,
    driver: Option<DriverSession>,
}

/// Fans new rides out to eligible driver sessions and publishes lifecycle
/// events to every connected observer.
pub struct DispatchBroadcaster {
    sessions: DashMap<Uuid, SessionEntry>,
    events_tx: broadcast::Sender<ServerMessage>,
}

impl DispatchBroadcaster {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));

        Self {
            sessions: DashMap::new(),
            events_tx,
        }
    }

    /// Registers a realtime connection. The returned [`Session`] is owned by
    /// that connection and deregisters itself when dropped.
    pub fn open_session(
        self: &Arc<Self>,
    ) -> (Session, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        self.sessions.insert(id, SessionEntry { tx, driver: None });
        debug!(session_id = %id, "session opened");

        (
            Session {
                id,
                driver: None,
                broadcaster: Arc::clone(self),
            },
            rx,
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.events_tx.subscribe()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Sends `ride:incoming` to every connected session whose driver is in
    /// `eligible`. Returns the number of deliveries.
    pub fn dispatch_ride(&self, ride: &Ride, eligible: &HashSet<Uuid>) -> usize {
        let mut delivered = 0;

        for entry in self.sessions.iter() {
            let Some(driver) = entry.driver else {
                continue;
            };

            if !eligible.contains(&driver.driver_id) {
                continue;
            }

            if entry.tx.send(ServerMessage::RideIncoming(ride.clone())).is_ok() {
                delivered += 1;
            }
        }

        info!(ride_id = %ride.id, delivered, "ride dispatched");
        delivered
    }

    pub fn publish(&self, event: RideEvent) {
        debug!(ride_id = %event.ride_id, status = event.status.as_str(), "publishing ride event");
        // No subscribers is not an error.
        let _ = self.events_tx.send(ServerMessage::RideStatusUpdate(event));
    }

    pub fn publish_location(&self, update: DriverLocationUpdate) {
        let _ = self.events_tx.send(ServerMessage::DriverLocation(update));
    }

    pub fn send_to(&self, session_id: &Uuid, message: ServerMessage) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|entry| entry.tx.send(message).is_ok())
    }

    fn bind_driver(&self, session_id: &Uuid, driver: DriverSession) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.driver = Some(driver);
        }
    }

    fn close(&self, session_id: &Uuid) {
        self.sessions.remove(session_id);
        debug!(session_id = %session_id, "session closed");
    }
}

/// Per-connection context: which driver, if any, this channel speaks for.
pub struct Session {
    id: Uuid,
    driver: Option<DriverSession>,
    broadcaster: Arc<DispatchBroadcaster>,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn driver(&self) -> Option<DriverSession> {
        self.driver
    }

    pub fn authenticate_driver(&mut self, driver_id: Uuid) -> DriverSession {
        let driver = DriverSession {
            driver_id,
            authenticated_at: Utc::now(),
        };

        self.driver = Some(driver);
        self.broadcaster.bind_driver(&self.id, driver);
        info!(session_id = %self.id, driver_id = %driver_id, "driver session authenticated");
        driver
    }

    pub fn reply(&self, message: ServerMessage) -> bool {
        self.broadcaster.send_to(&self.id, message)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.broadcaster.close(&self.id);
    }
}
