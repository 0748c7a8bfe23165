use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::TemperatureRange;

/// Order payload as handed over by checkout once a sale is ready to ship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleOrder {
    pub id: String,
    pub business_id: String,
    pub customer_id: String,
    pub business_name: Option<String>,
    pub business_phone: Option<String>,
    pub business_location: SaleAddress,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub delivery_address: SaleAddress,
    pub delivery_instructions: Option<String>,
    pub items: Vec<SaleItem>,
    pub total: f64,
    pub currency: Option<String>,
    pub priority: Option<String>,
    pub requested_delivery_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub requires_signature: bool,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleAddress {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    pub access_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub price: f64,
    /// Unit weight in kg.
    pub weight: Option<f64>,
    pub category: Option<String>,
    #[serde(default)]
    pub fragile: bool,
    #[serde(default)]
    pub special_handling: Vec<String>,
    pub temperature_requirements: Option<TemperatureRange>,
}
