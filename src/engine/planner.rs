use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::engine::scoring::{
    SERVICE_TIME_MINUTES, capacity_utilization, carbon_footprint, fuel_consumption,
    optimization_score, travel_minutes,
};
use crate::geo::haversine_km;
use crate::models::driver::{DeliveryDriver, VehicleCapacity};
use crate::models::order::DeliveryOrder;
use crate::models::route::{
    DeliveryRoute, DeliveryStop, OptimizationGoals, OptimizationMetrics, RouteConstraints,
    RouteStatus, StopStatus, TimeWindow,
};

pub const REFRIGERATED: &str = "refrigerated";
pub const FRAGILE: &str = "fragile";

/// Outcome of sequencing one driver's candidate orders.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    pub stops: Vec<DeliveryStop>,
    pub assigned: Vec<DeliveryOrder>,
    pub unassigned: Vec<DeliveryOrder>,
    pub metrics: OptimizationMetrics,
}

impl RoutePlan {
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

pub fn effective_capacity(driver: &DeliveryDriver, constraints: &RouteConstraints) -> VehicleCapacity {
    let base = driver.vehicle_capacity;
    match constraints.vehicle_capacity {
        Some(overrides) => VehicleCapacity {
            weight: overrides.weight.unwrap_or(base.weight),
            volume: overrides.volume.unwrap_or(base.volume),
            packages: overrides.packages.unwrap_or(base.packages),
        },
        None => base,
    }
}

pub fn is_eligible(
    order: &DeliveryOrder,
    driver: &DeliveryDriver,
    constraints: &RouteConstraints,
) -> bool {
    let capacity = effective_capacity(driver, constraints);
    if order.dimensions.weight > capacity.weight {
        return false;
    }

    let from_center = haversine_km(&driver.service_area.center, &order.destination());
    if from_center > driver.service_area.radius {
        return false;
    }

    if order.requires_refrigeration && !driver.has_specialty(REFRIGERATED) {
        return false;
    }

    if order.fragile_items && !driver.has_specialty(FRAGILE) {
        return false;
    }

    constraints
        .special_requirements
        .iter()
        .all(|requirement| driver.has_specialty(requirement))
}

fn minutes(value: f64) -> Duration {
    Duration::milliseconds((value * 60_000.0).round() as i64)
}

/// `None` when the instant is past what `DateTime<Utc>` can hold.
fn offset(start: DateTime<Utc>, value: f64) -> Option<DateTime<Utc>> {
    start.checked_add_signed(minutes(value))
}

/// Filters, sequences nearest-first from the driver's start point and lays
/// stops out on a running clock. One pass: orders are never reordered after
/// sorting, only skipped when a limit would be broken.
pub fn plan_route(
    driver: &DeliveryDriver,
    orders: &[DeliveryOrder],
    window: &TimeWindow,
    constraints: &RouteConstraints,
    goals: &OptimizationGoals,
) -> RoutePlan {
    let capacity = effective_capacity(driver, constraints);
    let start = driver.start_point();
    let mode = driver.vehicle_type;

    let mut candidates: Vec<(f64, usize)> = orders
        .iter()
        .enumerate()
        .filter(|(_, order)| is_eligible(order, driver, constraints))
        .map(|(index, order)| (haversine_km(&start, &order.destination()), index))
        .collect();
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

    let stop_limit = constraints
        .max_stops
        .unwrap_or(u32::MAX)
        .min(capacity.packages) as usize;

    let mut stops: Vec<DeliveryStop> = Vec::with_capacity(candidates.len());
    let mut assigned = Vec::with_capacity(candidates.len());
    let mut routed = vec![false; orders.len()];
    let mut here = start;
    let mut elapsed = 0.0;
    let mut total_distance = 0.0;
    let mut assigned_weight = 0.0;

    for (_, index) in candidates {
        if stops.len() >= stop_limit {
            break;
        }

        let order = &orders[index];
        let destination = order.destination();
        let leg = haversine_km(&here, &destination);
        let arrival_offset = elapsed + travel_minutes(leg, mode);
        let departure_offset = arrival_offset + SERVICE_TIME_MINUTES;
        let (Some(arrival), Some(departure)) = (
            offset(window.start, arrival_offset),
            offset(window.start, departure_offset),
        ) else {
            continue;
        };

        let too_far = constraints
            .max_distance
            .is_some_and(|max| total_distance + leg > max);
        let too_long = constraints
            .max_duration
            .is_some_and(|max| departure_offset > max);
        let past_window = goals.respect_time_windows && departure > window.end;
        if too_far || too_long || past_window {
            continue;
        }

        let sequence = stops.len() as u32 + 1;
        stops.push(DeliveryStop {
            id: Uuid::new_v4(),
            order_id: order.id,
            sequence,
            location: order.delivery_location.clone(),
            estimated_arrival: arrival,
            actual_arrival: None,
            estimated_departure: departure,
            actual_departure: None,
            status: StopStatus::Pending,
            notes: None,
            photos: Vec::new(),
            signature: None,
        });

        assigned.push(order.clone());
        routed[index] = true;
        here = destination;
        elapsed = departure_offset;
        total_distance += leg;
        assigned_weight += order.dimensions.weight;
    }

    let unassigned: Vec<DeliveryOrder> = orders
        .iter()
        .zip(&routed)
        .filter(|(_, routed)| !**routed)
        .map(|(order, _)| order.clone())
        .collect();

    let baseline_distance = baseline_distance(driver, orders, &routed);
    let metrics = OptimizationMetrics {
        total_distance,
        total_duration: elapsed,
        stops_optimized: stops.len(),
        time_windows_respected: stops
            .iter()
            .filter(|stop| stop.estimated_departure <= window.end)
            .count(),
        capacity_utilization: capacity_utilization(assigned_weight, capacity.weight),
        fuel_savings: fuel_consumption(baseline_distance, mode)
            - fuel_consumption(total_distance, mode),
        co2_reduction: carbon_footprint(baseline_distance, mode)
            - carbon_footprint(total_distance, mode),
    };

    RoutePlan {
        stops,
        assigned,
        unassigned,
        metrics,
    }
}

/// Distance of visiting the routed orders in the order they were handed in.
fn baseline_distance(driver: &DeliveryDriver, orders: &[DeliveryOrder], routed: &[bool]) -> f64 {
    let mut here = driver.start_point();
    let mut distance = 0.0;
    for (order, _) in orders.iter().zip(routed).filter(|(_, routed)| **routed) {
        let destination = order.destination();
        distance += haversine_km(&here, &destination);
        here = destination;
    }
    distance
}

pub fn build_route(
    driver: &DeliveryDriver,
    window: &TimeWindow,
    plan: &RoutePlan,
    now: DateTime<Utc>,
) -> DeliveryRoute {
    if plan.is_empty() {
        return empty_route(driver.id, window, now);
    }

    let metrics = &plan.metrics;
    DeliveryRoute {
        id: Uuid::new_v4(),
        driver_id: driver.id,
        date: window.start.date_naive(),
        status: RouteStatus::Planned,
        stops: plan.stops.clone(),
        total_distance: metrics.total_distance,
        total_duration: metrics.total_duration,
        estimated_start_time: window.start,
        estimated_end_time: offset(window.start, metrics.total_duration).unwrap_or(window.end),
        actual_start_time: None,
        actual_end_time: None,
        optimization_score: optimization_score(metrics),
        fuel_efficiency: fuel_consumption(metrics.total_distance, driver.vehicle_type),
        carbon_footprint: carbon_footprint(metrics.total_distance, driver.vehicle_type),
        created_at: now,
        updated_at: now,
    }
}

pub fn empty_route(driver_id: Uuid, window: &TimeWindow, now: DateTime<Utc>) -> DeliveryRoute {
    DeliveryRoute {
        id: Uuid::new_v4(),
        driver_id,
        date: window.start.date_naive(),
        status: RouteStatus::Planned,
        stops: Vec::new(),
        total_distance: 0.0,
        total_duration: 0.0,
        estimated_start_time: window.start,
        estimated_end_time: window.start,
        actual_start_time: None,
        actual_end_time: None,
        optimization_score: 0.0,
        fuel_efficiency: 0.0,
        carbon_footprint: 0.0,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::engine::fixtures::{KM_PER_DEGREE, driver_at, order_at};
    use crate::models::route::CapacityOverride;

    fn window() -> TimeWindow {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        TimeWindow {
            start,
            end: start + Duration::hours(8),
        }
    }

    fn plan(driver: &DeliveryDriver, orders: &[DeliveryOrder]) -> RoutePlan {
        plan_route(
            driver,
            orders,
            &window(),
            &RouteConstraints::default(),
            &OptimizationGoals::default(),
        )
    }

    #[test]
    fn window_at_end_of_time_leaves_orders_unassigned() {
        let driver = driver_at(30.0, 31.2, 10.0);
        let near = order_at(30.0 + 1.1 / KM_PER_DEGREE, 31.2);
        let end = DateTime::<Utc>::MAX_UTC;
        let window = TimeWindow {
            start: end - Duration::minutes(1),
            end,
        };

        let plan = plan_route(
            &driver,
            std::slice::from_ref(&near),
            &window,
            &RouteConstraints::default(),
            &OptimizationGoals::default(),
        );
        let route = build_route(&driver, &window, &plan, Utc::now());

        assert!(plan.is_empty());
        assert!(route.stops.is_empty());
        assert_eq!(plan.unassigned.len(), 1);
        assert_eq!(plan.unassigned[0].id, near.id);
    }

    #[test]
    fn order_outside_service_area_is_left_unassigned() {
        let driver = driver_at(30.04, 31.24, 5.0);
        let far = order_at(30.04 + 15.0 / KM_PER_DEGREE, 31.24);

        let plan = plan(&driver, std::slice::from_ref(&far));
        let route = build_route(&driver, &window(), &plan, Utc::now());

        assert!(plan.is_empty());
        assert!(route.stops.is_empty());
        assert_eq!(route.total_distance, 0.0);
        assert_eq!(route.optimization_score, 0.0);
        assert_eq!(plan.unassigned.len(), 1);
        assert_eq!(plan.unassigned[0].id, far.id);
    }

    #[test]
    fn nearer_order_is_sequenced_first() {
        let driver = driver_at(30.0, 31.2, 10.0);
        let six_km = order_at(30.0 + 6.0 / KM_PER_DEGREE, 31.2);
        let two_km = order_at(30.0 + 2.0 / KM_PER_DEGREE, 31.2);

        let plan = plan(&driver, &[six_km.clone(), two_km.clone()]);

        assert_eq!(plan.stops.len(), 2);
        assert_eq!(plan.stops[0].order_id, two_km.id);
        assert_eq!(plan.stops[0].sequence, 1);
        assert_eq!(plan.stops[1].order_id, six_km.id);
        assert_eq!(plan.stops[1].sequence, 2);
        assert!(plan.unassigned.is_empty());
    }

    #[test]
    fn stop_clock_advances_by_travel_then_service() {
        let driver = driver_at(30.0, 31.2, 50.0);
        let four_km = order_at(30.0 + 4.0 / KM_PER_DEGREE, 31.2);

        let plan = plan(&driver, &[four_km]);
        let stop = &plan.stops[0];

        // 4 km by car at 40 km/h is six minutes.
        assert_eq!(stop.estimated_arrival, window().start + Duration::minutes(6));
        assert_eq!(stop.estimated_departure, window().start + Duration::minutes(16));
        assert!((plan.metrics.total_duration - 16.0).abs() < 1e-6);
        assert!((plan.metrics.total_distance - 4.0).abs() < 1e-6);
    }

    #[test]
    fn sequences_are_contiguous_with_increasing_arrivals() {
        let driver = driver_at(30.0, 31.2, 30.0);
        let orders: Vec<DeliveryOrder> = [5.0, 1.0, 12.0, 3.0, 3.0, 8.0]
            .iter()
            .map(|km| order_at(30.0 + km / KM_PER_DEGREE, 31.2))
            .collect();

        let plan = plan(&driver, &orders);

        assert_eq!(plan.stops.len(), orders.len());
        for (index, stop) in plan.stops.iter().enumerate() {
            assert_eq!(stop.sequence as usize, index + 1);
        }
        for pair in plan.stops.windows(2) {
            assert!(pair[0].estimated_arrival < pair[1].estimated_arrival);
        }
    }

    #[test]
    fn equal_distances_keep_input_order() {
        let driver = driver_at(30.0, 31.2, 30.0);
        let first = order_at(30.0 + 3.0 / KM_PER_DEGREE, 31.2);
        let second = order_at(30.0 + 3.0 / KM_PER_DEGREE, 31.2);

        let plan = plan(&driver, &[first.clone(), second.clone()]);

        assert_eq!(plan.stops[0].order_id, first.id);
        assert_eq!(plan.stops[1].order_id, second.id);
    }

    #[test]
    fn refrigerated_order_needs_refrigerated_driver() {
        let mut driver = driver_at(30.0, 31.2, 10.0);
        let mut cold = order_at(30.01, 31.2);
        cold.requires_refrigeration = true;

        let plan_without = plan(&driver, std::slice::from_ref(&cold));
        assert!(plan_without.is_empty());
        assert_eq!(plan_without.unassigned.len(), 1);

        driver.specialties.push(REFRIGERATED.to_string());
        let plan_with = plan(&driver, std::slice::from_ref(&cold));
        assert_eq!(plan_with.stops.len(), 1);
    }

    #[test]
    fn fragile_order_needs_fragile_driver() {
        let driver = driver_at(30.0, 31.2, 10.0);
        let mut glass = order_at(30.01, 31.2);
        glass.fragile_items = true;

        assert!(!is_eligible(&glass, &driver, &RouteConstraints::default()));
    }

    #[test]
    fn capacity_override_replaces_vehicle_weight() {
        let driver = driver_at(30.0, 31.2, 10.0);
        let mut heavy = order_at(30.01, 31.2);
        heavy.dimensions.weight = 60.0;

        assert!(is_eligible(&heavy, &driver, &RouteConstraints::default()));

        let constraints = RouteConstraints {
            vehicle_capacity: Some(CapacityOverride {
                weight: Some(50.0),
                ..CapacityOverride::default()
            }),
            ..RouteConstraints::default()
        };
        assert!(!is_eligible(&heavy, &driver, &constraints));
    }

    #[test]
    fn max_stops_defers_the_farthest_orders() {
        let driver = driver_at(30.0, 31.2, 30.0);
        let orders: Vec<DeliveryOrder> = [1.0, 2.0, 3.0]
            .iter()
            .map(|km| order_at(30.0 + km / KM_PER_DEGREE, 31.2))
            .collect();
        let constraints = RouteConstraints {
            max_stops: Some(2),
            ..RouteConstraints::default()
        };

        let plan = plan_route(
            &driver,
            &orders,
            &window(),
            &constraints,
            &OptimizationGoals::default(),
        );

        assert_eq!(plan.stops.len(), 2);
        assert_eq!(plan.unassigned.len(), 1);
        assert_eq!(plan.unassigned[0].id, orders[2].id);
    }

    #[test]
    fn respecting_time_windows_skips_late_stops() {
        let driver = driver_at(30.0, 31.2, 30.0);
        let orders = vec![order_at(30.0 + 4.0 / KM_PER_DEGREE, 31.2)];
        let start = window().start;
        let tight = TimeWindow {
            start,
            end: start + Duration::minutes(12),
        };
        let goals = OptimizationGoals {
            respect_time_windows: true,
            ..OptimizationGoals::default()
        };

        let plan = plan_route(&driver, &orders, &tight, &RouteConstraints::default(), &goals);
        assert!(plan.is_empty());
        assert_eq!(plan.unassigned.len(), 1);
    }

    #[test]
    fn metrics_are_derived_from_the_walk() {
        let driver = driver_at(30.0, 31.2, 30.0);
        let orders = vec![
            order_at(30.0 + 10.0 / KM_PER_DEGREE, 31.2),
            order_at(30.0 + 5.0 / KM_PER_DEGREE, 31.2),
        ];

        let plan = plan(&driver, &orders);
        let route = build_route(&driver, &window(), &plan, Utc::now());

        assert!((plan.metrics.total_distance - 10.0).abs() < 1e-6);
        // Input order would drive 10 km out and 5 km back: 15 km.
        assert!((plan.metrics.fuel_savings - 5.0 / 12.0).abs() < 1e-6);
        assert_eq!(plan.metrics.time_windows_respected, 2);
        assert!((plan.metrics.capacity_utilization - 4.0).abs() < 1e-9);
        assert!((route.fuel_efficiency - 10.0 / 12.0).abs() < 1e-6);
        assert!((route.carbon_footprint - 1.2).abs() < 1e-6);
        assert!((0.0..=100.0).contains(&route.optimization_score));
        assert_eq!(
            route.estimated_end_time,
            route.estimated_start_time
                + Duration::milliseconds((route.total_duration * 60_000.0).round() as i64)
        );
    }
}
