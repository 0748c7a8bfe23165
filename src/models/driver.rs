use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::{DriverPosition, GeoPoint};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Car,
    Motorcycle,
    Bicycle,
    Walking,
    Drone,
    Scooter,
    Van,
    Truck,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Available,
    Busy,
    Offline,
    Maintenance,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VehicleCapacity {
    /// kg
    pub weight: f64,
    /// cubic metres
    pub volume: f64,
    pub packages: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ServiceArea {
    pub center: GeoPoint,
    /// km
    pub radius: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkingHours {
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub days_off: Vec<String>,
}

/// Everything a driver supplies at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverProfile {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub license_number: String,
    pub vehicle_type: TransportMode,
    pub vehicle_capacity: VehicleCapacity,
    pub service_area: ServiceArea,
    pub current_location: Option<DriverPosition>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub working_hours: WorkingHours,
    #[serde(default)]
    pub certifications: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryDriver {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub license_number: String,
    pub vehicle_type: TransportMode,
    pub vehicle_capacity: VehicleCapacity,
    pub service_area: ServiceArea,
    pub current_location: Option<DriverPosition>,
    pub status: DriverStatus,
    pub rating: f64,
    pub completed_deliveries: u32,
    /// minutes
    pub average_delivery_time: f64,
    pub specialties: Vec<String>,
    pub working_hours: WorkingHours,
    pub certifications: Vec<String>,
    pub registered_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl DeliveryDriver {
    pub fn from_profile(profile: DriverProfile, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: profile.name,
            phone: profile.phone,
            email: profile.email,
            license_number: profile.license_number,
            vehicle_type: profile.vehicle_type,
            vehicle_capacity: profile.vehicle_capacity,
            service_area: profile.service_area,
            current_location: profile.current_location,
            status: DriverStatus::Available,
            rating: profile.rating.clamp(0.0, 5.0),
            completed_deliveries: 0,
            average_delivery_time: 0.0,
            specialties: profile.specialties,
            working_hours: profile.working_hours,
            certifications: profile.certifications,
            registered_at: now,
            last_active: now,
        }
    }

    pub fn has_specialty(&self, specialty: &str) -> bool {
        self.specialties.iter().any(|s| s == specialty)
    }

    /// Where a route for this driver starts: the last fix, else the middle of
    /// the service area.
    pub fn start_point(&self) -> GeoPoint {
        self.current_location
            .map(|position| position.point())
            .unwrap_or(self.service_area.center)
    }

    /// Folds one completed delivery into the running average.
    pub fn record_completed_delivery(&mut self, minutes: f64) {
        let completed = f64::from(self.completed_deliveries);
        self.average_delivery_time =
            (self.average_delivery_time * completed + minutes.max(0.0)) / (completed + 1.0);
        self.completed_deliveries = self.completed_deliveries.saturating_add(1);
    }
}
