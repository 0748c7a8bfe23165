use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::DeliveryDriver;
use crate::models::location::DeliveryLocation;
use crate::models::order::DeliveryOrder;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Planned,
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    Pending,
    Arrived,
    Completed,
    Failed,
    Skipped,
}

impl StopStatus {
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            StopStatus::Completed | StopStatus::Failed | StopStatus::Skipped
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStop {
    pub id: Uuid,
    pub order_id: Uuid,
    pub sequence: u32,
    pub location: DeliveryLocation,
    pub estimated_arrival: DateTime<Utc>,
    pub actual_arrival: Option<DateTime<Utc>>,
    pub estimated_departure: DateTime<Utc>,
    pub actual_departure: Option<DateTime<Utc>>,
    pub status: StopStatus,
    pub notes: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRoute {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub date: NaiveDate,
    pub status: RouteStatus,
    pub stops: Vec<DeliveryStop>,
    /// km
    pub total_distance: f64,
    /// minutes
    pub total_duration: f64,
    pub estimated_start_time: DateTime<Utc>,
    pub estimated_end_time: DateTime<Utc>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub optimization_score: f64,
    pub fuel_efficiency: f64,
    /// kg CO2
    pub carbon_footprint: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryRoute {
    pub fn stop_for(&self, order_id: Uuid) -> Option<&DeliveryStop> {
        self.stops.iter().find(|stop| stop.order_id == order_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct CapacityOverride {
    pub weight: Option<f64>,
    pub volume: Option<f64>,
    pub packages: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RouteConstraints {
    pub max_stops: Option<u32>,
    /// km
    pub max_distance: Option<f64>,
    /// minutes
    pub max_duration: Option<f64>,
    pub vehicle_capacity: Option<CapacityOverride>,
    pub special_requirements: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OptimizationGoals {
    pub minimize_time: bool,
    pub minimize_distance: bool,
    pub maximize_efficiency: bool,
    pub balance_workload: bool,
    pub respect_time_windows: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteOptimizationRequest {
    pub driver: DeliveryDriver,
    pub pending_orders: Vec<DeliveryOrder>,
    pub time_window: TimeWindow,
    #[serde(default)]
    pub constraints: RouteConstraints,
    #[serde(default)]
    pub optimization_goals: OptimizationGoals,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct OptimizationMetrics {
    pub total_distance: f64,
    pub total_duration: f64,
    pub stops_optimized: usize,
    pub time_windows_respected: usize,
    /// percent of the effective weight capacity
    pub capacity_utilization: f64,
    /// litres, against walking the orders in the order they were given
    pub fuel_savings: f64,
    /// kg CO2, same baseline as `fuel_savings`
    pub co2_reduction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteOptimizationResult {
    pub route: DeliveryRoute,
    pub unassigned_orders: Vec<DeliveryOrder>,
    pub optimization_metrics: OptimizationMetrics,
}
