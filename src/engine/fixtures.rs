use chrono::Utc;
use uuid::Uuid;

use crate::models::driver::{
    DeliveryDriver, DriverProfile, ServiceArea, TransportMode, VehicleCapacity, WorkingHours,
};
use crate::models::location::{DeliveryLocation, DriverPosition, GeoPoint};
use crate::models::order::{
    DeliveryItem, DeliveryOrder, DeliveryPriority, DeliveryStatus, PackageDimensions,
};
use crate::models::sale::{SaleAddress, SaleItem, SaleOrder};

/// Kilometres per degree of latitude on the 6371 km sphere.
pub const KM_PER_DEGREE: f64 = 111.194_926_644_558_73;

pub fn location(lat: f64, lng: f64) -> DeliveryLocation {
    DeliveryLocation {
        latitude: lat,
        longitude: lng,
        address: format!("{lat:.4},{lng:.4}"),
        city: "Cairo".to_string(),
        postal_code: "11511".to_string(),
        country: "EG".to_string(),
        instructions: None,
        contact_name: "Customer".to_string(),
        contact_phone: String::new(),
        access_code: None,
    }
}

pub fn order_at(lat: f64, lng: f64) -> DeliveryOrder {
    let now = Utc::now();
    DeliveryOrder {
        id: Uuid::new_v4(),
        order_id: format!("sale-{}", Uuid::new_v4()),
        business_id: "biz-1".to_string(),
        customer_id: "cust-1".to_string(),
        pickup_location: location(30.0, 31.2),
        delivery_location: location(lat, lng),
        items: vec![DeliveryItem {
            id: "item-1".to_string(),
            product_id: "prod-1".to_string(),
            name: "Bread".to_string(),
            quantity: 1,
            unit_price: 10.0,
            special_handling: Vec::new(),
            temperature_requirements: None,
        }],
        total_value: 10.0,
        currency: "EGP".to_string(),
        priority: DeliveryPriority::Standard,
        requested_time: None,
        estimated_pickup_time: None,
        estimated_delivery_time: None,
        actual_delivery_time: None,
        status: DeliveryStatus::Pending,
        assigned_driver_id: None,
        tracking_code: "DLTEST".to_string(),
        special_instructions: None,
        requires_refrigeration: false,
        requires_signature: false,
        fragile_items: false,
        dimensions: PackageDimensions {
            weight: 2.0,
            width: 30.0,
            height: 20.0,
            length: 40.0,
        },
        created_at: now,
        updated_at: now,
    }
}

pub fn profile_at(lat: f64, lng: f64, radius_km: f64) -> DriverProfile {
    DriverProfile {
        name: "Driver".to_string(),
        phone: "+20100000000".to_string(),
        email: String::new(),
        license_number: "LIC-1".to_string(),
        vehicle_type: TransportMode::Car,
        vehicle_capacity: VehicleCapacity {
            weight: 100.0,
            volume: 2.0,
            packages: 20,
        },
        service_area: ServiceArea {
            center: GeoPoint { lat, lng },
            radius: radius_km,
        },
        current_location: Some(DriverPosition {
            lat,
            lng,
            timestamp: Utc::now(),
            accuracy: 10.0,
        }),
        rating: 4.5,
        specialties: Vec::new(),
        working_hours: WorkingHours::default(),
        certifications: Vec::new(),
    }
}

pub fn driver_at(lat: f64, lng: f64, radius_km: f64) -> DeliveryDriver {
    DeliveryDriver::from_profile(profile_at(lat, lng, radius_km), Utc::now())
}

pub fn sale_at(lat: f64, lng: f64) -> SaleOrder {
    SaleOrder {
        id: format!("sale-{}", Uuid::new_v4()),
        business_id: "biz-1".to_string(),
        customer_id: "cust-1".to_string(),
        business_name: Some("Bakery".to_string()),
        business_phone: None,
        business_location: SaleAddress {
            latitude: 30.0,
            longitude: 31.2,
            street: "1 Market St".to_string(),
            city: "Cairo".to_string(),
            postal_code: "11511".to_string(),
            country: "EG".to_string(),
            access_code: None,
        },
        customer_name: Some("Mona".to_string()),
        customer_phone: Some("+20111111111".to_string()),
        delivery_address: SaleAddress {
            latitude: lat,
            longitude: lng,
            street: "9 Nile Rd".to_string(),
            city: "Cairo".to_string(),
            postal_code: "11512".to_string(),
            country: "EG".to_string(),
            access_code: None,
        },
        delivery_instructions: None,
        items: vec![SaleItem {
            id: "item-1".to_string(),
            product_id: "prod-1".to_string(),
            name: "Bread".to_string(),
            quantity: 2,
            price: 5.0,
            weight: Some(1.0),
            category: Some("bakery".to_string()),
            fragile: false,
            special_handling: Vec::new(),
            temperature_requirements: None,
        }],
        total: 10.0,
        currency: None,
        priority: None,
        requested_delivery_time: None,
        requires_signature: false,
        special_instructions: None,
    }
}
