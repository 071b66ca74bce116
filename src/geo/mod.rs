pub mod osrm;

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::driver::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Assumed average road speed when no routing provider answers.
pub const FALLBACK_SPEED_KMH: f64 = 25.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn extrapolated_duration_secs(distance_km: f64) -> f64 {
    (distance_km.max(0.0) / FALLBACK_SPEED_KMH) * 3600.0
}

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("routing request failed: {0}")]
    Transport(String),

    #[error("routing request timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed routing response: {0}")]
    Malformed(String),

    #[error("no route found: {0}")]
    NoRoute(String),
}

impl RoutingError {
    pub fn reason(&self) -> &'static str {
        match self {
            RoutingError::Transport(_) => "transport",
            RoutingError::Timeout(_) => "timeout",
            RoutingError::Malformed(_) => "malformed",
            RoutingError::NoRoute(_) => "no_route",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_secs: Option<f64>,
}

/// Road-network routing backend.
pub trait RouteProvider: Send + Sync {
    fn route<'a>(
        &'a self,
        from: GeoPoint,
        to: GeoPoint,
    ) -> BoxFuture<'a, Result<RouteEstimate, RoutingError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricSource {
    Routed,
    Haversine,
    Fallback(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripMetrics {
    pub distance_km: f64,
    pub duration_secs: f64,
    pub source: MetricSource,
}

/// Trip distance/duration estimation. Never fails: any provider problem
/// degrades to the great-circle distance.
#[derive(Clone)]
pub struct GeoMetrics {
    provider: Option<Arc<dyn RouteProvider>>,
    timeout: Duration,
}

impl GeoMetrics {
    pub fn haversine_only() -> Self {
        Self {
            provider: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn with_provider(provider: Arc<dyn RouteProvider>, timeout: Duration) -> Self {
        Self {
            provider: Some(provider),
            timeout,
        }
    }

    pub async fn trip_metrics(&self, from: &GeoPoint, to: &GeoPoint) -> TripMetrics {
        let baseline_km = haversine_km(from, to);

        let Some(provider) = &self.provider else {
            return TripMetrics {
                distance_km: baseline_km,
                duration_secs: extrapolated_duration_secs(baseline_km),
                source: MetricSource::Haversine,
            };
        };

        let outcome = match tokio::time::timeout(self.timeout, provider.route(*from, *to)).await {
            Ok(result) => result.and_then(validate),
            Err(_) => Err(RoutingError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(route) => {
                debug!(distance_km = route.distance_km, "routing provider answered");
                TripMetrics {
                    distance_km: route.distance_km,
                    duration_secs: route
                        .duration_secs
                        .unwrap_or_else(|| extrapolated_duration_secs(route.distance_km)),
                    source: MetricSource::Routed,
                }
            }
            Err(err) => {
                warn!(error = %err, "routing provider degraded; using haversine estimate");
                TripMetrics {
                    distance_km: baseline_km,
                    duration_secs: extrapolated_duration_secs(baseline_km),
                    source: MetricSource::Fallback(err.reason()),
                }
            }
        }
    }
}

fn validate(route: RouteEstimate) -> Result<RouteEstimate, RoutingError> {
    if !route.distance_km.is_finite() || route.distance_km < 0.0 {
        return Err(RoutingError::Malformed(format!(
            "distance {} is not a usable number",
            route.distance_km
        )));
    }

    let duration_secs = route
        .duration_secs
        .filter(|secs| secs.is_finite() && *secs >= 0.0);

    Ok(RouteEstimate {
        distance_km: route.distance_km,
        duration_secs,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::future::BoxFuture;
    use futures::FutureExt;

    use super::{
        haversine_km, GeoMetrics, MetricSource, RouteEstimate, RouteProvider, RoutingError,
    };
    use crate::models::driver::GeoPoint;

    const PICKUP: GeoPoint = GeoPoint {
        lat: 7.0731,
        lng: 125.6128,
    };
    const DROPOFF: GeoPoint = GeoPoint {
        lat: 7.1907,
        lng: 125.4553,
    };

    struct Failing;

    impl RouteProvider for Failing {
        fn route<'a>(
            &'a self,
            _from: GeoPoint,
            _to: GeoPoint,
        ) -> BoxFuture<'a, Result<RouteEstimate, RoutingError>> {
            async {
                Err::<RouteEstimate, _>(RoutingError::Transport(
                    "connection refused".to_string(),
                ))
            }
            .boxed()
        }
    }

    struct Stalled;

    impl RouteProvider for Stalled {
        fn route<'a>(
            &'a self,
            _from: GeoPoint,
            _to: GeoPoint,
        ) -> BoxFuture<'a, Result<RouteEstimate, RoutingError>> {
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, RoutingError>(RouteEstimate {
                    distance_km: 1.0,
                    duration_secs: Some(60.0),
                })
            }
            .boxed()
        }
    }

    struct Fixed(RouteEstimate);

    impl RouteProvider for Fixed {
        fn route<'a>(
            &'a self,
            _from: GeoPoint,
            _to: GeoPoint,
        ) -> BoxFuture<'a, Result<RouteEstimate, RoutingError>> {
            let estimate = self.0;
            async move { Ok::<_, RoutingError>(estimate) }.boxed()
        }
    }

    #[test]
    fn zero_distance_for_same_point() {
        let distance = haversine_km(&PICKUP, &PICKUP);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[tokio::test]
    async fn failing_provider_falls_back_to_haversine() {
        let geo = GeoMetrics::with_provider(Arc::new(Failing), Duration::from_secs(1));

        let metrics = geo.trip_metrics(&PICKUP, &DROPOFF).await;

        assert!((metrics.distance_km - haversine_km(&PICKUP, &DROPOFF)).abs() < 1e-9);
        assert_eq!(metrics.source, MetricSource::Fallback("transport"));
        assert!(metrics.duration_secs > 0.0);
    }

    #[tokio::test]
    async fn stalled_provider_times_out_into_fallback() {
        let geo = GeoMetrics::with_provider(Arc::new(Stalled), Duration::from_millis(50));

        let metrics = geo.trip_metrics(&PICKUP, &DROPOFF).await;

        assert!((metrics.distance_km - haversine_km(&PICKUP, &DROPOFF)).abs() < 1e-9);
        assert_eq!(metrics.source, MetricSource::Fallback("timeout"));
    }

    #[tokio::test]
    async fn non_numeric_distance_is_rejected() {
        let geo = GeoMetrics::with_provider(
            Arc::new(Fixed(RouteEstimate {
                distance_km: f64::NAN,
                duration_secs: Some(100.0),
            })),
            Duration::from_secs(1),
        );

        let metrics = geo.trip_metrics(&PICKUP, &DROPOFF).await;

        assert_eq!(metrics.source, MetricSource::Fallback("malformed"));
        assert!((metrics.distance_km - haversine_km(&PICKUP, &DROPOFF)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn routed_result_is_used_when_well_formed() {
        let geo = GeoMetrics::with_provider(
            Arc::new(Fixed(RouteEstimate {
                distance_km: 23.4,
                duration_secs: None,
            })),
            Duration::from_secs(1),
        );

        let metrics = geo.trip_metrics(&PICKUP, &DROPOFF).await;

        assert_eq!(metrics.source, MetricSource::Routed);
        assert_eq!(metrics.distance_km, 23.4);
        assert!((metrics.duration_secs - super::extrapolated_duration_secs(23.4)).abs() < 1e-9);
    }
}
