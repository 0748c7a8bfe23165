use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::DeliveryDriver;
use crate::models::location::DriverPosition;
use crate::models::order::{DeliveryOrder, DeliveryStatus, StatusMetadata};
use crate::models::route::{DeliveryRoute, RouteOptimizationRequest};
use crate::models::sale::SaleOrder;
use crate::models::tracking::{
    CustomerTrackingSession, EtaFactors, NotificationData, NotificationKind, TrackingUpdate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Topic {
    OrderReadyForDelivery,
    DriverLocationUpdate,
    DeliveryStatusUpdate,
    RouteOptimizationRequest,
    CustomerTrackingRequest,
    DeliveryOrderCreated,
    DriverRegistered,
    RouteOptimized,
    AutoRouteOptimizationTriggered,
    DeliveryStatusChanged,
    DeliveryTrackingInitialized,
    TrackingUpdateAdded,
    EtaUpdated,
    TrackingSessionCreated,
    CustomerNotification,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::OrderReadyForDelivery => "ORDER_READY_FOR_DELIVERY",
            Topic::DriverLocationUpdate => "DRIVER_LOCATION_UPDATE",
            Topic::DeliveryStatusUpdate => "DELIVERY_STATUS_UPDATE",
            Topic::RouteOptimizationRequest => "ROUTE_OPTIMIZATION_REQUEST",
            Topic::CustomerTrackingRequest => "CUSTOMER_TRACKING_REQUEST",
            Topic::DeliveryOrderCreated => "DELIVERY_ORDER_CREATED",
            Topic::DriverRegistered => "DRIVER_REGISTERED",
            Topic::RouteOptimized => "ROUTE_OPTIMIZED",
            Topic::AutoRouteOptimizationTriggered => "AUTO_ROUTE_OPTIMIZATION_TRIGGERED",
            Topic::DeliveryStatusChanged => "DELIVERY_STATUS_CHANGED",
            Topic::DeliveryTrackingInitialized => "DELIVERY_TRACKING_INITIALIZED",
            Topic::TrackingUpdateAdded => "TRACKING_UPDATE_ADDED",
            Topic::EtaUpdated => "ETA_UPDATED",
            Topic::TrackingSessionCreated => "TRACKING_SESSION_CREATED",
            Topic::CustomerNotification => "CUSTOMER_NOTIFICATION",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every message carried by the bus. Inbound events come from collaborators
/// outside the core, outbound ones are published by the engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryEvent {
    OrderReadyForDelivery {
        order: Box<SaleOrder>,
    },
    DriverLocationUpdate {
        driver_id: Uuid,
        location: DriverPosition,
    },
    DeliveryStatusUpdate {
        delivery_id: Uuid,
        status: DeliveryStatus,
        metadata: Option<StatusMetadata>,
    },
    RouteOptimizationRequest {
        request: Box<RouteOptimizationRequest>,
    },
    CustomerTrackingRequest {
        delivery_id: Uuid,
        customer_id: String,
    },
    DeliveryOrderCreated {
        delivery: Box<DeliveryOrder>,
    },
    DriverRegistered {
        driver: Box<DeliveryDriver>,
    },
    RouteOptimized {
        route: Box<DeliveryRoute>,
        driver: Box<DeliveryDriver>,
        assigned_orders: usize,
        unassigned_orders: usize,
    },
    AutoRouteOptimizationTriggered {
        pending_orders: usize,
    },
    DeliveryStatusChanged {
        delivery_id: Uuid,
        status: DeliveryStatus,
        metadata: Option<StatusMetadata>,
    },
    DeliveryTrackingInitialized {
        delivery_id: Uuid,
        shareable_link: String,
    },
    TrackingUpdateAdded {
        delivery_id: Uuid,
        update: Box<TrackingUpdate>,
    },
    EtaUpdated {
        delivery_id: Uuid,
        eta: DateTime<Utc>,
        confidence: f64,
        factors: EtaFactors,
    },
    TrackingSessionCreated {
        session: Box<CustomerTrackingSession>,
    },
    CustomerNotification {
        session_id: Uuid,
        delivery_id: Uuid,
        #[serde(rename = "type")]
        kind: NotificationKind,
        message: String,
        data: NotificationData,
    },
}

impl DeliveryEvent {
    pub fn topic(&self) -> Topic {
        match self {
            DeliveryEvent::OrderReadyForDelivery { .. } => Topic::OrderReadyForDelivery,
            DeliveryEvent::DriverLocationUpdate { .. } => Topic::DriverLocationUpdate,
            DeliveryEvent::DeliveryStatusUpdate { .. } => Topic::DeliveryStatusUpdate,
            DeliveryEvent::RouteOptimizationRequest { .. } => Topic::RouteOptimizationRequest,
            DeliveryEvent::CustomerTrackingRequest { .. } => Topic::CustomerTrackingRequest,
            DeliveryEvent::DeliveryOrderCreated { .. } => Topic::DeliveryOrderCreated,
            DeliveryEvent::DriverRegistered { .. } => Topic::DriverRegistered,
            DeliveryEvent::RouteOptimized { .. } => Topic::RouteOptimized,
            DeliveryEvent::AutoRouteOptimizationTriggered { .. } => {
                Topic::AutoRouteOptimizationTriggered
            }
            DeliveryEvent::DeliveryStatusChanged { .. } => Topic::DeliveryStatusChanged,
            DeliveryEvent::DeliveryTrackingInitialized { .. } => {
                Topic::DeliveryTrackingInitialized
            }
            DeliveryEvent::TrackingUpdateAdded { .. } => Topic::TrackingUpdateAdded,
            DeliveryEvent::EtaUpdated { .. } => Topic::EtaUpdated,
            DeliveryEvent::TrackingSessionCreated { .. } => Topic::TrackingSessionCreated,
            DeliveryEvent::CustomerNotification { .. } => Topic::CustomerNotification,
        }
    }

    /// Whether this event concerns the given delivery. Route events match any
    /// delivery on the route.
    pub fn concerns_delivery(&self, id: Uuid) -> bool {
        match self {
            DeliveryEvent::DeliveryStatusUpdate { delivery_id, .. }
            | DeliveryEvent::CustomerTrackingRequest { delivery_id, .. }
            | DeliveryEvent::DeliveryStatusChanged { delivery_id, .. }
            | DeliveryEvent::DeliveryTrackingInitialized { delivery_id, .. }
            | DeliveryEvent::TrackingUpdateAdded { delivery_id, .. }
            | DeliveryEvent::EtaUpdated { delivery_id, .. }
            | DeliveryEvent::CustomerNotification { delivery_id, .. } => *delivery_id == id,
            DeliveryEvent::DeliveryOrderCreated { delivery } => delivery.id == id,
            DeliveryEvent::TrackingSessionCreated { session } => session.delivery_id == id,
            DeliveryEvent::RouteOptimized { route, .. } => route.stop_for(id).is_some(),
            _ => false,
        }
    }
}
