use crate::models::driver::TransportMode;
use crate::models::route::OptimizationMetrics;

pub const SERVICE_TIME_MINUTES: f64 = 10.0;

const DISTANCE_PENALTY_DIVISOR: f64 = 10.0;
const DISTANCE_PENALTY_CAP: f64 = 30.0;
const DURATION_PENALTY_DIVISOR: f64 = 60.0;
const DURATION_PENALTY_CAP: f64 = 20.0;
const UTILIZATION_REWARD: f64 = 0.5;

/// Average cruising speed in km/h.
pub fn average_speed_kmh(mode: TransportMode) -> f64 {
    match mode {
        TransportMode::Car => 40.0,
        TransportMode::Motorcycle => 35.0,
        TransportMode::Bicycle => 15.0,
        TransportMode::Walking => 5.0,
        TransportMode::Drone => 50.0,
        TransportMode::Scooter => 20.0,
        TransportMode::Van => 35.0,
        TransportMode::Truck => 30.0,
        TransportMode::Other => 30.0,
    }
}

/// Fuel figure in L/100km; zero for modes that burn none.
pub fn fuel_efficiency_l_per_100km(mode: TransportMode) -> f64 {
    match mode {
        TransportMode::Car => 12.0,
        TransportMode::Motorcycle => 4.0,
        TransportMode::Bicycle | TransportMode::Walking | TransportMode::Drone => 0.0,
        TransportMode::Scooter => 2.0,
        TransportMode::Van => 10.0,
        TransportMode::Truck => 15.0,
        TransportMode::Other => 10.0,
    }
}

/// kg CO2 per km.
pub fn emission_factor_kg_per_km(mode: TransportMode) -> f64 {
    match mode {
        TransportMode::Car => 0.12,
        TransportMode::Motorcycle => 0.08,
        TransportMode::Bicycle | TransportMode::Walking => 0.0,
        TransportMode::Drone => 0.05,
        TransportMode::Scooter => 0.06,
        TransportMode::Van => 0.15,
        TransportMode::Truck => 0.25,
        TransportMode::Other => 0.12,
    }
}

pub fn travel_minutes(distance_km: f64, mode: TransportMode) -> f64 {
    distance_km.max(0.0) / average_speed_kmh(mode) * 60.0
}

/// Route fuel figure: distance divided by the mode's L/100km rating.
pub fn fuel_consumption(distance_km: f64, mode: TransportMode) -> f64 {
    let efficiency = fuel_efficiency_l_per_100km(mode);
    if efficiency <= 0.0 {
        return 0.0;
    }
    distance_km / efficiency
}

pub fn carbon_footprint(distance_km: f64, mode: TransportMode) -> f64 {
    distance_km * emission_factor_kg_per_km(mode)
}

/// Assigned weight as a percentage of the weight the vehicle may carry.
pub fn capacity_utilization(assigned_weight: f64, capacity_weight: f64) -> f64 {
    if capacity_weight <= 0.0 {
        return 0.0;
    }
    (assigned_weight / capacity_weight * 100.0).clamp(0.0, 100.0)
}

/// 0..=100, higher is better.
pub fn optimization_score(metrics: &OptimizationMetrics) -> f64 {
    let mut score = 100.0;
    score -= (metrics.total_distance / DISTANCE_PENALTY_DIVISOR).min(DISTANCE_PENALTY_CAP);
    score -= (metrics.total_duration / DURATION_PENALTY_DIVISOR).min(DURATION_PENALTY_CAP);
    score += metrics.capacity_utilization * UTILIZATION_REWARD;
    score.clamp(0.0, 100.0)
}
