use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::engine::dispatch::DispatchBroadcaster;
use crate::error::AppError;
use crate::geo::osrm::OsrmRouteProvider;
use crate::geo::GeoMetrics;
use crate::observability::metrics::Metrics;
use crate::store::drivers::DriverRegistry;
use crate::store::rides::RideStore;

pub struct AppState {
    pub rides: RideStore,
    pub drivers: DriverRegistry,
    pub broadcaster: Arc<DispatchBroadcaster>,
    pub geo: GeoMetrics,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(geo: GeoMetrics, event_buffer_size: usize) -> Self {
        Self {
            rides: RideStore::new(),
            drivers: DriverRegistry::new(),
            broadcaster: Arc::new(DispatchBroadcaster::new(event_buffer_size)),
            geo,
            metrics: Metrics::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let geo = match &config.routing_url {
            Some(url) => {
                let provider = OsrmRouteProvider::new(url, config.routing_timeout)
                    .map_err(|err| AppError::Internal(err.to_string()))?;
                info!(routing_url = %url, "routing provider configured");
                GeoMetrics::with_provider(Arc::new(provider), config.routing_timeout)
            }
            None => {
                info!("no routing provider configured; using haversine estimates");
                GeoMetrics::haversine_only()
            }
        };

        Ok(Self::new(geo, config.event_buffer_size))
    }
}
