use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{DeliveryDriver, DriverProfile};
use crate::models::location::{DeliveryLocation, GeoPoint};
use crate::models::order::{
    DeliveryItem, DeliveryOrder, DeliveryPriority, DeliveryStatus, PackageDimensions,
};
use crate::models::route::RouteOptimizationRequest;
use crate::models::sale::{SaleAddress, SaleItem, SaleOrder};

const DEFAULT_ITEM_WEIGHT_KG: f64 = 0.5;
const DEFAULT_CURRENCY: &str = "USD";
const TRACKING_CODE_PREFIX: &str = "DL";
const REFRIGERATED_CATEGORIES: [&str; 2] = ["dairy", "meat"];

pub fn validate_sale(sale: &SaleOrder) -> Result<(), AppError> {
    if sale.id.trim().is_empty() {
        return Err(AppError::BadRequest("order id cannot be empty".to_string()));
    }
    if sale.items.is_empty() {
        return Err(AppError::BadRequest(format!(
            "order {} has no items",
            sale.id
        )));
    }
    if let Some(item) = sale.items.iter().find(|item| item.quantity == 0) {
        return Err(AppError::BadRequest(format!(
            "item {} has zero quantity",
            item.id
        )));
    }
    if sale
        .items
        .iter()
        .any(|item| item.weight.is_some_and(|weight| !weight.is_finite() || weight < 0.0))
    {
        return Err(AppError::BadRequest(
            "item weight must be a non-negative number".to_string(),
        ));
    }
    validate_point("business location", &address_point(&sale.business_location))?;
    validate_point("delivery address", &address_point(&sale.delivery_address))?;
    Ok(())
}

pub fn validate_profile(profile: &DriverProfile) -> Result<(), AppError> {
    if profile.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    let capacity = profile.vehicle_capacity;
    if !capacity.weight.is_finite() || capacity.weight < 0.0 {
        return Err(AppError::BadRequest(
            "vehicle weight capacity must be >= 0".to_string(),
        ));
    }
    if !capacity.volume.is_finite() || capacity.volume < 0.0 {
        return Err(AppError::BadRequest(
            "vehicle volume capacity must be >= 0".to_string(),
        ));
    }
    if capacity.packages == 0 {
        return Err(AppError::BadRequest(
            "vehicle package capacity must be > 0".to_string(),
        ));
    }
    let area = profile.service_area;
    if !area.radius.is_finite() || area.radius <= 0.0 {
        return Err(AppError::BadRequest(
            "service area radius must be > 0".to_string(),
        ));
    }
    validate_point("service area center", &area.center)?;
    if let Some(position) = profile.current_location {
        validate_point("current location", &position.point())?;
    }
    Ok(())
}

pub fn validate_driver(driver: &DeliveryDriver) -> Result<(), AppError> {
    validate_point("service area center", &driver.service_area.center)?;
    if !driver.service_area.radius.is_finite() || driver.service_area.radius < 0.0 {
        return Err(AppError::BadRequest(format!(
            "driver {} has an invalid service radius",
            driver.id
        )));
    }
    if let Some(position) = driver.current_location {
        validate_point("current location", &position.point())?;
    }
    Ok(())
}

pub fn validate_request(request: &RouteOptimizationRequest) -> Result<(), AppError> {
    validate_driver(&request.driver)?;
    if request.time_window.end < request.time_window.start {
        return Err(AppError::BadRequest(
            "time window ends before it starts".to_string(),
        ));
    }
    for order in &request.pending_orders {
        validate_point("delivery location", &order.destination())?;
        if !order.dimensions.weight.is_finite() {
            return Err(AppError::BadRequest(format!(
                "delivery {} has an invalid package weight",
                order.id
            )));
        }
    }
    Ok(())
}

fn validate_point(label: &str, point: &GeoPoint) -> Result<(), AppError> {
    if point.is_valid() {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "{label} has invalid coordinates ({}, {})",
            point.lat, point.lng
        )))
    }
}

fn address_point(address: &SaleAddress) -> GeoPoint {
    GeoPoint {
        lat: address.latitude,
        lng: address.longitude,
    }
}

/// Maps a checkout payload onto a fresh `PENDING` delivery order.
pub fn delivery_order_from_sale(sale: SaleOrder, now: DateTime<Utc>) -> DeliveryOrder {
    let id = Uuid::new_v4();
    let priority = determine_priority(&sale);
    let requires_refrigeration = requires_refrigeration(&sale.items);
    let fragile_items = has_fragile_items(&sale.items);
    let dimensions = package_dimensions(&sale.items);

    let pickup_location = pickup_location(&sale);
    let delivery_location = delivery_location(&sale);
    let items = sale.items.into_iter().map(delivery_item).collect();

    DeliveryOrder {
        id,
        order_id: sale.id,
        business_id: sale.business_id,
        customer_id: sale.customer_id,
        pickup_location,
        delivery_location,
        items,
        total_value: sale.total,
        currency: sale
            .currency
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        priority,
        requested_time: sale.requested_delivery_time,
        estimated_pickup_time: None,
        estimated_delivery_time: None,
        actual_delivery_time: None,
        status: DeliveryStatus::Pending,
        assigned_driver_id: None,
        tracking_code: tracking_code(id, now),
        special_instructions: sale.special_instructions,
        requires_refrigeration,
        requires_signature: sale.requires_signature,
        fragile_items,
        dimensions,
        created_at: now,
        updated_at: now,
    }
}

fn pickup_location(sale: &SaleOrder) -> DeliveryLocation {
    let address = &sale.business_location;
    DeliveryLocation {
        latitude: address.latitude,
        longitude: address.longitude,
        address: address.street.clone(),
        city: address.city.clone(),
        postal_code: address.postal_code.clone(),
        country: address.country.clone(),
        instructions: None,
        contact_name: sale
            .business_name
            .clone()
            .unwrap_or_else(|| "Business".to_string()),
        contact_phone: sale.business_phone.clone().unwrap_or_default(),
        access_code: address.access_code.clone(),
    }
}

fn delivery_location(sale: &SaleOrder) -> DeliveryLocation {
    let address = &sale.delivery_address;
    DeliveryLocation {
        latitude: address.latitude,
        longitude: address.longitude,
        address: address.street.clone(),
        city: address.city.clone(),
        postal_code: address.postal_code.clone(),
        country: address.country.clone(),
        instructions: sale.delivery_instructions.clone(),
        contact_name: sale
            .customer_name
            .clone()
            .unwrap_or_else(|| "Customer".to_string()),
        contact_phone: sale.customer_phone.clone().unwrap_or_default(),
        access_code: address.access_code.clone(),
    }
}

fn delivery_item(item: SaleItem) -> DeliveryItem {
    DeliveryItem {
        id: item.id,
        product_id: item.product_id,
        name: item.name,
        quantity: item.quantity,
        unit_price: item.price,
        special_handling: item.special_handling,
        temperature_requirements: item.temperature_requirements,
    }
}

pub fn determine_priority(sale: &SaleOrder) -> DeliveryPriority {
    let express_requested = sale
        .priority
        .as_deref()
        .is_some_and(|priority| priority.eq_ignore_ascii_case("express"));

    if express_requested || sale.requested_delivery_time.is_some() {
        DeliveryPriority::Express
    } else {
        DeliveryPriority::Standard
    }
}

pub fn requires_refrigeration(items: &[SaleItem]) -> bool {
    items.iter().any(|item| {
        item.temperature_requirements.is_some()
            || item.category.as_deref().is_some_and(|category| {
                REFRIGERATED_CATEGORIES
                    .iter()
                    .any(|cold| category.eq_ignore_ascii_case(cold))
            })
    })
}

pub fn has_fragile_items(items: &[SaleItem]) -> bool {
    items.iter().any(|item| {
        item.fragile
            || item
                .special_handling
                .iter()
                .any(|tag| tag.eq_ignore_ascii_case("fragile"))
    })
}

/// Weight is summed per unit; sides scale with weight inside fixed bands (cm).
pub fn package_dimensions(items: &[SaleItem]) -> PackageDimensions {
    let weight: f64 = items
        .iter()
        .map(|item| item.weight.unwrap_or(DEFAULT_ITEM_WEIGHT_KG) * f64::from(item.quantity))
        .sum();

    PackageDimensions {
        weight,
        width: (weight * 2.0).clamp(30.0, 100.0),
        height: (weight * 1.5).clamp(20.0, 80.0),
        length: (weight * 3.0).clamp(40.0, 120.0),
    }
}

/// Prefix, creation time in base36 and a short slice of the delivery id.
pub fn tracking_code(id: Uuid, now: DateTime<Utc>) -> String {
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
    let suffix: String = id.simple().to_string().chars().take(4).collect();
    format!("{TRACKING_CODE_PREFIX}{}{}", to_base36(millis), suffix).to_uppercase()
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize] as char);
        value /= 36;
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::engine::fixtures::{profile_at, sale_at};
    use crate::models::order::{TemperatureRange, TemperatureUnit};

    #[test]
    fn sale_maps_onto_pending_delivery() {
        let sale = sale_at(30.05, 31.25);
        let sale_id = sale.id.clone();

        let order = delivery_order_from_sale(sale, Utc::now());

        assert_eq!(order.status, DeliveryStatus::Pending);
        assert_eq!(order.order_id, sale_id);
        assert_eq!(order.pickup_location.contact_name, "Bakery");
        assert_eq!(order.delivery_location.contact_name, "Mona");
        assert_eq!(order.delivery_location.latitude, 30.05);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].unit_price, 5.0);
        assert_eq!(order.currency, "USD");
        assert_eq!(order.priority, DeliveryPriority::Standard);
        assert!(order.assigned_driver_id.is_none());
        assert!(order.tracking_code.starts_with("DL"));
    }

    #[test]
    fn express_flag_or_requested_time_means_express() {
        let mut sale = sale_at(30.05, 31.25);
        sale.priority = Some("express".to_string());
        assert_eq!(determine_priority(&sale), DeliveryPriority::Express);

        let mut scheduled = sale_at(30.05, 31.25);
        scheduled.requested_delivery_time = Some(Utc::now());
        assert_eq!(determine_priority(&scheduled), DeliveryPriority::Express);
    }

    #[test]
    fn dairy_and_temperature_bands_need_refrigeration() {
        let mut sale = sale_at(30.05, 31.25);
        assert!(!requires_refrigeration(&sale.items));

        sale.items[0].category = Some("Dairy".to_string());
        assert!(requires_refrigeration(&sale.items));

        let mut banded = sale_at(30.05, 31.25);
        banded.items[0].temperature_requirements = Some(TemperatureRange {
            min: 2.0,
            max: 6.0,
            unit: TemperatureUnit::Celsius,
        });
        assert!(requires_refrigeration(&banded.items));
    }

    #[test]
    fn fragile_flag_or_handling_tag_marks_fragile() {
        let mut sale = sale_at(30.05, 31.25);
        assert!(!has_fragile_items(&sale.items));

        sale.items[0].special_handling = vec!["fragile".to_string()];
        assert!(has_fragile_items(&sale.items));
    }

    #[test]
    fn dimensions_are_clamped_to_bands() {
        let mut sale = sale_at(30.05, 31.25);
        sale.items[0].quantity = 2;
        sale.items[0].weight = Some(1.0);
        let small = package_dimensions(&sale.items);
        assert_eq!(small.weight, 2.0);
        assert_eq!(small.width, 30.0);
        assert_eq!(small.height, 20.0);
        assert_eq!(small.length, 40.0);

        sale.items[0].quantity = 100;
        let large = package_dimensions(&sale.items);
        assert_eq!(large.width, 100.0);
        assert_eq!(large.height, 80.0);
        assert_eq!(large.length, 120.0);

        sale.items[0].weight = None;
        sale.items[0].quantity = 40;
        let defaulted = package_dimensions(&sale.items);
        assert_eq!(defaulted.weight, 20.0);
        assert_eq!(defaulted.width, 40.0);
        assert_eq!(defaulted.height, 30.0);
        assert_eq!(defaulted.length, 60.0);
    }

    #[test]
    fn tracking_code_is_time_based() {
        let id = Uuid::from_u128(0xabcd_0000_0000_0000_0000_0000_0000_0000);
        let at = Utc.timestamp_millis_opt(36 * 36).unwrap();
        assert_eq!(tracking_code(id, at), "DL100ABCD");
    }

    #[test]
    fn malformed_sales_are_rejected() {
        let mut empty = sale_at(30.05, 31.25);
        empty.items.clear();
        assert!(matches!(validate_sale(&empty), Err(AppError::BadRequest(_))));

        let mut off_planet = sale_at(130.0, 31.25);
        off_planet.id = "sale-1".to_string();
        assert!(validate_sale(&off_planet).is_err());

        assert!(validate_sale(&sale_at(30.05, 31.25)).is_ok());
    }

    #[test]
    fn profiles_need_a_name_and_a_service_radius() {
        assert!(validate_profile(&profile_at(30.0, 31.2, 5.0)).is_ok());

        let mut nameless = profile_at(30.0, 31.2, 5.0);
        nameless.name = "  ".to_string();
        assert!(validate_profile(&nameless).is_err());

        assert!(validate_profile(&profile_at(30.0, 31.2, 0.0)).is_err());
    }
}
