use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::engine::dispatch::Session;
use crate::engine::lifecycle;
use crate::models::event::{ClientMessage, DriverLocationUpdate, ServerMessage};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (mut session, mut direct_rx) = state.broadcaster.open_session();
    let mut events = BroadcastStream::new(state.broadcaster.subscribe());
    let session_id = session.id();

    state.metrics.connected_sessions.inc();
    info!(session_id = %session_id, "websocket client connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                Some(message) = direct_rx.recv() => message,
                Some(item) = events.next() => match item {
                    Ok(message) => message,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(session_id = %session_id, skipped, "websocket client lagging; events dropped");
                        continue;
                    }
                },
                else => break,
            };

            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => handle_frame(&recv_state, &mut session, &text).await,
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // The session lives inside the receive task; aborting it deregisters the session.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.metrics.connected_sessions.dec();
    info!(session_id = %session_id, "websocket client disconnected");
}

async fn handle_frame(state: &AppState, session: &mut Session, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            session.reply(ServerMessage::Error {
                message: format!("invalid frame: {err}"),
            });
            return;
        }
    };

    match message {
        ClientMessage::AuthDriver { driver_id } => {
            if state.drivers.get(&driver_id).is_none() {
                session.reply(ServerMessage::Error {
                    message: format!("driver {driver_id} is not registered"),
                });
                return;
            }

            session.authenticate_driver(driver_id);
            session.reply(ServerMessage::AuthOk { driver_id });
        }
        ClientMessage::DriverLocation(point) => {
            let Some(driver) = session.driver() else {
                session.reply(unauthenticated());
                return;
            };

            match state.drivers.record_location(&driver.driver_id, point) {
                Ok(()) => state.broadcaster.publish_location(DriverLocationUpdate {
                    driver_id: driver.driver_id,
                    lat: point.lat,
                    lng: point.lng,
                }),
                Err(err) => {
                    session.reply(ServerMessage::Error {
                        message: err.user_message(),
                    });
                }
            }
        }
        ClientMessage::AcceptRide { ride_id } => {
            let Some(driver) = session.driver() else {
                session.reply(unauthenticated());
                return;
            };

            let reply = match lifecycle::accept_ride(state, driver.driver_id, ride_id).await {
                Ok(_) => ServerMessage::AcceptResult {
                    ride_id,
                    accepted: true,
                    reason: None,
                },
                Err(err) => ServerMessage::AcceptResult {
                    ride_id,
                    accepted: false,
                    reason: Some(err.user_message()),
                },
            };
            session.reply(reply);
        }
    }
}

fn unauthenticated() -> ServerMessage {
    ServerMessage::Error {
        message: "send auth:driver before driver events".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use uuid::Uuid;

    use super::handle_frame;
    use crate::engine::lifecycle::{self, RideRequest};
    use crate::error::{MUST_BE_ONLINE, RIDE_UNAVAILABLE};
    use crate::geo::GeoMetrics;
    use crate::models::driver::{DriverStatus, GeoPoint};
    use crate::models::event::ServerMessage;
    use crate::state::AppState;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(GeoMetrics::haversine_only(), 64))
    }

    fn frame(event: &str, data: serde_json::Value) -> String {
        json!({ "event": event, "data": data }).to_string()
    }

    async fn requested_ride(state: &AppState) -> Uuid {
        let request = RideRequest {
            pickup: Some(GeoPoint {
                lat: 7.0731,
                lng: 125.6128,
            }),
            dropoff: Some(GeoPoint {
                lat: 7.1146,
                lng: 125.62,
            }),
            passenger_count: Some(1),
            ..RideRequest::default()
        };
        lifecycle::request_ride(state, Uuid::new_v4(), request)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn auth_binds_session_to_registered_driver() {
        let state = state();
        let driver = state.drivers.register("Ana".to_string(), None, None).id;
        let (mut session, mut rx) = state.broadcaster.open_session();

        handle_frame(&state, &mut session, &frame("auth:driver", json!({ "driver_id": driver }))).await;

        match rx.try_recv() {
            Ok(ServerMessage::AuthOk { driver_id }) => assert_eq!(driver_id, driver),
            other => panic!("expected auth:ok, got {other:?}"),
        }
        assert_eq!(session.driver().map(|d| d.driver_id), Some(driver));
    }

    #[tokio::test]
    async fn auth_for_unknown_driver_is_refused() {
        let state = state();
        let (mut session, mut rx) = state.broadcaster.open_session();

        handle_frame(
            &state,
            &mut session,
            &frame("auth:driver", json!({ "driver_id": Uuid::new_v4() })),
        )
        .await;

        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Error { .. })));
        assert!(session.driver().is_none());
    }

    #[tokio::test]
    async fn garbage_frame_gets_error_reply() {
        let state = state();
        let (mut session, mut rx) = state.broadcaster.open_session();

        handle_frame(&state, &mut session, "{\"event\":\"ride:teleport\"}").await;

        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Error { .. })));
    }

    #[tokio::test]
    async fn location_requires_authentication() {
        let state = state();
        let (mut session, mut rx) = state.broadcaster.open_session();
        let mut events = state.broadcaster.subscribe();

        handle_frame(
            &state,
            &mut session,
            &frame("driver:location", json!({ "lat": 7.07, "lng": 125.61 })),
        )
        .await;

        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Error { .. })));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn location_is_recorded_and_broadcast() {
        let state = state();
        let driver = state.drivers.register("Ben".to_string(), None, None).id;
        let (mut session, mut rx) = state.broadcaster.open_session();
        session.authenticate_driver(driver);
        let mut events = state.broadcaster.subscribe();

        handle_frame(
            &state,
            &mut session,
            &frame("driver:location", json!({ "lat": 7.07, "lng": 125.61 })),
        )
        .await;

        match events.try_recv() {
            Ok(ServerMessage::DriverLocation(update)) => {
                assert_eq!(update.driver_id, driver);
                assert_eq!((update.lat, update.lng), (7.07, 125.61));
            }
            other => panic!("expected driver:location:update, got {other:?}"),
        }
        let stored = state.drivers.get(&driver).unwrap().location.unwrap();
        assert_eq!((stored.lat, stored.lng), (7.07, 125.61));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn out_of_range_location_is_rejected() {
        let state = state();
        let driver = state.drivers.register("Cy".to_string(), None, None).id;
        let (mut session, mut rx) = state.broadcaster.open_session();
        session.authenticate_driver(driver);

        handle_frame(
            &state,
            &mut session,
            &frame("driver:location", json!({ "lat": 91.0, "lng": 0.0 })),
        )
        .await;

        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Error { .. })));
        assert!(state.drivers.get(&driver).unwrap().location.is_none());
    }

    #[tokio::test]
    async fn accept_results_distinguish_offline_from_taken() {
        let state = state();
        let ride_id = requested_ride(&state).await;

        let offline = state.drivers.register("Offline".to_string(), None, None).id;
        let (mut offline_session, mut offline_rx) = state.broadcaster.open_session();
        offline_session.authenticate_driver(offline);

        let accept = frame("ride:accept", json!({ "ride_id": ride_id }));
        handle_frame(&state, &mut offline_session, &accept).await;

        match offline_rx.try_recv() {
            Ok(ServerMessage::AcceptResult {
                accepted, reason, ..
            }) => {
                assert!(!accepted);
                assert_eq!(reason.as_deref(), Some(MUST_BE_ONLINE));
            }
            other => panic!("expected ride:accept:result, got {other:?}"),
        }

        let mut online_rx = Vec::new();
        let mut sessions = Vec::new();
        for name in ["First", "Second"] {
            let id = state.drivers.register(name.to_string(), None, None).id;
            state.drivers.set_status(&id, DriverStatus::Online).unwrap();
            let (mut session, rx) = state.broadcaster.open_session();
            session.authenticate_driver(id);
            sessions.push(session);
            online_rx.push(rx);
        }

        for session in sessions.iter_mut() {
            handle_frame(&state, session, &accept).await;
        }

        match online_rx[0].try_recv() {
            Ok(ServerMessage::AcceptResult {
                ride_id: id,
                accepted,
                reason,
            }) => {
                assert_eq!(id, ride_id);
                assert!(accepted);
                assert!(reason.is_none());
            }
            other => panic!("expected ride:accept:result, got {other:?}"),
        }
        match online_rx[1].try_recv() {
            Ok(ServerMessage::AcceptResult {
                accepted, reason, ..
            }) => {
                assert!(!accepted);
                assert_eq!(reason.as_deref(), Some(RIDE_UNAVAILABLE));
            }
            other => panic!("expected ride:accept:result, got {other:?}"),
        }
    }
}
