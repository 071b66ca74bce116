use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub rides_requested_total: IntCounter,
    pub ride_transitions_total: IntCounterVec,
    pub accept_attempts_total: IntCounterVec,
    pub routing_fallbacks_total: IntCounterVec,
    pub dispatch_deliveries_total: IntCounter,
    pub connected_sessions: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let rides_requested_total =
            IntCounter::new("rides_requested_total", "Total rides requested by passengers")
                .expect("valid rides_requested_total metric");

        let ride_transitions_total = IntCounterVec::new(
            Opts::new("ride_transitions_total", "Committed ride transitions by new status"),
            &["status"],
        )
        .expect("valid ride_transitions_total metric");

        let accept_attempts_total = IntCounterVec::new(
            Opts::new("accept_attempts_total", "Ride accept attempts by outcome"),
            &["outcome"],
        )
        .expect("valid accept_attempts_total metric");

        let routing_fallbacks_total = IntCounterVec::new(
            Opts::new(
                "routing_fallbacks_total",
                "Routing provider failures answered with the haversine estimate",
            ),
            &["reason"],
        )
        .expect("valid routing_fallbacks_total metric");

        let dispatch_deliveries_total = IntCounter::new(
            "dispatch_deliveries_total",
            "Incoming-ride notifications delivered to driver sessions",
        )
        .expect("valid dispatch_deliveries_total metric");

        let connected_sessions =
            IntGauge::new("connected_sessions", "Currently connected realtime sessions")
                .expect("valid connected_sessions metric");

        registry
            .register(Box::new(rides_requested_total.clone()))
            .expect("register rides_requested_total");
        registry
            .register(Box::new(ride_transitions_total.clone()))
            .expect("register ride_transitions_total");
        registry
            .register(Box::new(accept_attempts_total.clone()))
            .expect("register accept_attempts_total");
        registry
            .register(Box::new(routing_fallbacks_total.clone()))
            .expect("register routing_fallbacks_total");
        registry
            .register(Box::new(dispatch_deliveries_total.clone()))
            .expect("register dispatch_deliveries_total");
        registry
            .register(Box::new(connected_sessions.clone()))
            .expect("register connected_sessions");

        Self {
            registry,
            rides_requested_total,
            ride_transitions_total,
            accept_attempts_total,
            routing_fallbacks_total,
            dispatch_deliveries_total,
            connected_sessions,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
