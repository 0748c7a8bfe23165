use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Geocoded address attached to an order. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub instructions: Option<String>,
    pub contact_name: String,
    pub contact_phone: String,
    pub access_code: Option<String>,
}

impl DeliveryLocation {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.latitude,
            lng: self.longitude,
        }
    }
}

/// A location fix reported by (or simulated for) a driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DriverPosition {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_accuracy")]
    pub accuracy: f64,
}

fn default_accuracy() -> f64 {
    10.0
}

impl DriverPosition {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}
