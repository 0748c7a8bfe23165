use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::TransportMode;
use crate::models::order::{DeliveryStatus, StatusMetadata};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackingEventType {
    DriverAssigned,
    PickedUp,
    InTransit,
    ArrivedAtStop,
    OutForDelivery,
    Delivered,
    FailedDelivery,
    Cancelled,
    ReturnedToSender,
    Delayed,
    LocationUpdate,
    EtaUpdate,
    DriverMessage,
}

impl From<DeliveryStatus> for TrackingEventType {
    fn from(status: DeliveryStatus) -> Self {
        match status {
            DeliveryStatus::Assigned => TrackingEventType::DriverAssigned,
            DeliveryStatus::PickedUp => TrackingEventType::PickedUp,
            DeliveryStatus::InTransit => TrackingEventType::InTransit,
            DeliveryStatus::Delivered => TrackingEventType::Delivered,
            DeliveryStatus::Failed => TrackingEventType::FailedDelivery,
            DeliveryStatus::Cancelled => TrackingEventType::Cancelled,
            DeliveryStatus::Returned => TrackingEventType::ReturnedToSender,
            DeliveryStatus::Pending => TrackingEventType::Delayed,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrackedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingUpdate {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub event_type: TrackingEventType,
    pub timestamp: DateTime<Utc>,
    pub location: Option<TrackedLocation>,
    pub driver_id: Option<Uuid>,
    pub message: Option<String>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub metadata: Option<StatusMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverSummary {
    pub driver_id: Uuid,
    pub name: String,
    pub phone: String,
    pub vehicle: TransportMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NextStop {
    pub address: String,
    pub estimated_arrival: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteProgress {
    pub completed_stops: u32,
    pub total_stops: u32,
    pub next_stop: Option<NextStop>,
}

/// Customer-facing view of one delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTracking {
    pub delivery_id: Uuid,
    pub tracking_code: String,
    pub current_status: DeliveryStatus,
    pub estimated_delivery_time: DateTime<Utc>,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub driver_info: Option<DriverSummary>,
    pub current_location: Option<TrackedLocation>,
    pub route_progress: RouteProgress,
    pub tracking_history: Vec<TrackingUpdate>,
    pub last_update: DateTime<Utc>,
    pub shareable_link: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct EtaFactors {
    /// minutes
    pub traffic: f64,
    /// minutes
    pub weather: f64,
    /// multiplier, 1.0 means on time
    pub driver_performance: f64,
    /// minutes
    pub route_complexity: f64,
    /// minutes
    pub time_of_day: f64,
}

impl EtaFactors {
    /// Minutes added to the previous estimate. Driver performance and route
    /// complexity are reported but do not move the estimate.
    pub fn total_adjustment(&self) -> f64 {
        self.traffic + self.weather + self.time_of_day
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtaPrediction {
    pub delivery_id: Uuid,
    pub current_eta: DateTime<Utc>,
    /// percent, 60..=95
    pub confidence: f64,
    pub factors: EtaFactors,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerTrackingSession {
    pub session_id: Uuid,
    pub delivery_id: Uuid,
    pub customer_id: String,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub view_count: u32,
    pub share_count: u32,
    pub notifications_enabled: bool,
    pub preferred_language: String,
    pub timezone: String,
}

impl CustomerTrackingSession {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.last_activity > ttl
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPreferences {
    pub notifications_enabled: Option<bool>,
    pub preferred_language: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    StatusUpdate,
    LocationUpdate,
    EtaUpdate,
    DriverAssigned,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::StatusUpdate => "status_update",
            NotificationKind::LocationUpdate => "location_update",
            NotificationKind::EtaUpdate => "eta_update",
            NotificationKind::DriverAssigned => "driver_assigned",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationData {
    pub event_type: TrackingEventType,
    pub status: Option<DeliveryStatus>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub location: Option<TrackedLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealTimeDashboard {
    pub active_deliveries: usize,
    pub on_time_deliveries: usize,
    /// minutes until arrival, averaged over active deliveries
    pub average_eta: f64,
    /// km planned on routes that still carry an active delivery
    pub total_distance: f64,
}
