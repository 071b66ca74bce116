//! OSRM-compatible HTTP routing.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Deserialize;

use crate::geo::{RouteEstimate, RouteProvider, RoutingError};
use crate::models::driver::GeoPoint;

pub struct OsrmRouteProvider {
    client: Client,
    endpoint: String,
}

impl OsrmRouteProvider {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, RoutingError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RoutingError::Transport(format!("failed to build client: {err}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, from: &GeoPoint, to: &GeoPoint) -> String {
        format!(
            "{}/route/v1/driving/{},{};{},{}?overview=false",
            self.endpoint, from.lng, from.lat, to.lng, to.lat,
        )
    }

    async fn fetch(&self, from: GeoPoint, to: GeoPoint) -> Result<RouteEstimate, RoutingError> {
        let body = self
            .client
            .get(self.url(&from, &to))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| RoutingError::Transport(err.to_string()))?
            .text()
            .await
            .map_err(|err| RoutingError::Transport(err.to_string()))?;

        parse_route_body(&body)
    }
}

impl RouteProvider for OsrmRouteProvider {
    fn route<'a>(
        &'a self,
        from: GeoPoint,
        to: GeoPoint,
    ) -> BoxFuture<'a, Result<RouteEstimate, RoutingError>> {
        self.fetch(from, to).boxed()
    }
}

#[derive(Deserialize)]
struct OsrmResponse {
    code: String,
    routes: Option<Vec<OsrmRoute>>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    distance: Option<f64>, // metres
    duration: Option<f64>, // seconds
}

pub fn parse_route_body(body: &str) -> Result<RouteEstimate, RoutingError> {
    let response: OsrmResponse =
        serde_json::from_str(body).map_err(|err| RoutingError::Malformed(err.to_string()))?;

    if response.code != "Ok" {
        return Err(RoutingError::NoRoute(response.code));
    }

    let route = response
        .routes
        .and_then(|routes| routes.into_iter().next())
        .ok_or_else(|| RoutingError::NoRoute("empty routes".to_string()))?;

    let distance_m = route
        .distance
        .ok_or_else(|| RoutingError::Malformed("route has no distance".to_string()))?;

    Ok(RouteEstimate {
        distance_km: distance_m / 1000.0,
        duration_secs: route.duration,
    })
}
