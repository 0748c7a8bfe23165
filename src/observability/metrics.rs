use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub deliveries_created_total: IntCounter,
    pub route_optimizations_total: IntCounterVec,
    pub route_optimization_latency_seconds: Histogram,
    pub active_deliveries: IntGauge,
    pub customer_notifications_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let deliveries_created_total = IntCounter::new(
            "deliveries_created_total",
            "Delivery orders created from sales",
        )
        .expect("valid deliveries_created_total metric");

        let route_optimizations_total = IntCounterVec::new(
            Opts::new("route_optimizations_total", "Route optimization runs by outcome"),
            &["outcome"],
        )
        .expect("valid route_optimizations_total metric");

        let route_optimization_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "route_optimization_latency_seconds",
            "Latency of one route optimization run in seconds",
        ))
        .expect("valid route_optimization_latency_seconds metric");

        let active_deliveries =
            IntGauge::new("active_deliveries", "Deliveries currently being tracked")
                .expect("valid active_deliveries metric");

        let customer_notifications_total = IntCounterVec::new(
            Opts::new(
                "customer_notifications_total",
                "Notifications pushed to tracking sessions by kind",
            ),
            &["kind"],
        )
        .expect("valid customer_notifications_total metric");

        registry
            .register(Box::new(deliveries_created_total.clone()))
            .expect("register deliveries_created_total");
        registry
            .register(Box::new(route_optimizations_total.clone()))
            .expect("register route_optimizations_total");
        registry
            .register(Box::new(route_optimization_latency_seconds.clone()))
            .expect("register route_optimization_latency_seconds");
        registry
            .register(Box::new(active_deliveries.clone()))
            .expect("register active_deliveries");
        registry
            .register(Box::new(customer_notifications_total.clone()))
            .expect("register customer_notifications_total");

        Self {
            registry,
            deliveries_created_total,
            route_optimizations_total,
            route_optimization_latency_seconds,
            active_deliveries,
            customer_notifications_total,
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
