use std::sync::Arc;

use chrono::Duration;
use tokio::sync::mpsc;

use crate::bus::EventBus;
use crate::config::Config;
use crate::engine::routing::RoutingEngine;
use crate::engine::tracking::{TrackingEngine, TrackingSettings};
use crate::models::event::{DeliveryEvent, Topic};
use crate::observability::metrics::Metrics;

const ROUTING_TOPICS: [Topic; 4] = [
    Topic::OrderReadyForDelivery,
    Topic::DriverLocationUpdate,
    Topic::DeliveryStatusUpdate,
    Topic::RouteOptimizationRequest,
];

const TRACKING_TOPICS: [Topic; 6] = [
    Topic::DeliveryOrderCreated,
    Topic::DeliveryStatusUpdate,
    Topic::DeliveryStatusChanged,
    Topic::DriverLocationUpdate,
    Topic::RouteOptimized,
    Topic::CustomerTrackingRequest,
];

pub struct AppState {
    pub config: Config,
    pub bus: Arc<EventBus>,
    pub routing: Arc<RoutingEngine>,
    pub tracking: Arc<TrackingEngine>,
    pub metrics: Metrics,
}

/// Receiving halves of the engines' bus subscriptions.
pub struct EngineInbox {
    pub routing_rx: mpsc::UnboundedReceiver<DeliveryEvent>,
    pub tracking_rx: mpsc::UnboundedReceiver<DeliveryEvent>,
}

impl AppState {
    pub fn new(config: &Config) -> (Self, EngineInbox) {
        let bus = Arc::new(EventBus::new(config.event_buffer_size));
        let metrics = Metrics::new();

        let routing = Arc::new(RoutingEngine::new(
            bus.clone(),
            metrics.clone(),
            Duration::hours(config.route_horizon_hours),
        ));
        let tracking = Arc::new(TrackingEngine::new(
            routing.clone(),
            bus.clone(),
            metrics.clone(),
            TrackingSettings::from_config(config),
        ));

        let inbox = EngineInbox {
            routing_rx: bus.subscribe(&ROUTING_TOPICS),
            tracking_rx: bus.subscribe(&TRACKING_TOPICS),
        };

        (
            Self {
                config: config.clone(),
                bus,
                routing,
                tracking,
                metrics,
            },
            inbox,
        )
    }
}
