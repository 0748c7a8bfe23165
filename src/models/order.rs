use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::{DeliveryLocation, GeoPoint};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPriority {
    Standard,
    Express,
    SameDay,
    Instant,
    Scheduled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
    Returned,
}

impl DeliveryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered
                | DeliveryStatus::Failed
                | DeliveryStatus::Cancelled
                | DeliveryStatus::Returned
        )
    }

    /// Terminal states are final, and nothing re-enters `Pending` once it has
    /// left it (a routed order would otherwise be routed twice).
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        !self.is_terminal() && next != DeliveryStatus::Pending && next != self
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::PickedUp => "picked_up",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Cancelled => "cancelled",
            DeliveryStatus::Returned => "returned",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TemperatureRange {
    pub min: f64,
    pub max: f64,
    pub unit: TemperatureUnit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryItem {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
    #[serde(default)]
    pub special_handling: Vec<String>,
    pub temperature_requirements: Option<TemperatureRange>,
}

/// Package estimate: weight in kg, sides in cm.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PackageDimensions {
    pub weight: f64,
    pub width: f64,
    pub height: f64,
    pub length: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOrder {
    pub id: Uuid,
    pub order_id: String,
    pub business_id: String,
    pub customer_id: String,
    pub pickup_location: DeliveryLocation,
    pub delivery_location: DeliveryLocation,
    pub items: Vec<DeliveryItem>,
    pub total_value: f64,
    pub currency: String,
    pub priority: DeliveryPriority,
    pub requested_time: Option<DateTime<Utc>>,
    pub estimated_pickup_time: Option<DateTime<Utc>>,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub status: DeliveryStatus,
    pub assigned_driver_id: Option<Uuid>,
    pub tracking_code: String,
    pub special_instructions: Option<String>,
    pub requires_refrigeration: bool,
    pub requires_signature: bool,
    pub fragile_items: bool,
    pub dimensions: PackageDimensions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryOrder {
    pub fn destination(&self) -> GeoPoint {
        self.delivery_location.point()
    }
}

/// Aggregate over every delivery order ever created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct DeliveryStatistics {
    pub total_deliveries: usize,
    pub completed_deliveries: usize,
    pub pending_deliveries: usize,
    /// minutes from creation to hand-over, averaged over delivered orders
    pub average_delivery_time: f64,
    /// fraction of delivered orders that arrived by their estimate, 0..=1
    pub on_time_delivery_rate: f64,
}

/// Free-form context attached to a status update. Proof-of-delivery references
/// are lifted onto the route stop when the delivery completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photos: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
