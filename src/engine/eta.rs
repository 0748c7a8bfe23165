use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::models::order::DeliveryPriority;
use crate::models::tracking::EtaFactors;

pub const MIN_CONFIDENCE: f64 = 60.0;
pub const MAX_CONFIDENCE: f64 = 95.0;
/// A recomputed ETA is pushed to customers only past this drift.
pub const NOTIFY_THRESHOLD_MINUTES: i64 = 10;
pub const DEFAULT_ETA_MINUTES: i64 = 60;

const WEATHER_SPREAD_MINUTES: f64 = 5.0;
const EXPRESS_COMPLEXITY_MINUTES: f64 = 5.0;

/// Source of the weather adjustment, in minutes.
pub trait WeatherFactor: Send + Sync {
    fn minutes(&self) -> f64;
}

/// Uniform noise in `[-5, 5]` until a real feed is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomWeather;

impl WeatherFactor for RandomWeather {
    fn minutes(&self) -> f64 {
        rand::thread_rng().gen_range(-WEATHER_SPREAD_MINUTES..=WEATHER_SPREAD_MINUTES)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedWeather(pub f64);

impl WeatherFactor for FixedWeather {
    fn minutes(&self) -> f64 {
        self.0
    }
}

/// Rush-hour delay for a local hour of day.
pub fn traffic_minutes(hour: u32) -> f64 {
    let mut minutes = 0.0;
    if (7..=9).contains(&hour) {
        minutes += 15.0;
    }
    if (16..=19).contains(&hour) {
        minutes += 20.0;
    }
    minutes
}

pub fn time_of_day_minutes(hour: u32) -> f64 {
    let mut minutes = 0.0;
    if hour >= 22 || hour <= 6 {
        minutes += 10.0;
    }
    if (11..=14).contains(&hour) {
        minutes -= 5.0;
    }
    minutes
}

pub fn analyze_factors(
    hour: u32,
    priority: DeliveryPriority,
    weather: &dyn WeatherFactor,
) -> EtaFactors {
    EtaFactors {
        traffic: traffic_minutes(hour),
        weather: weather.minutes().clamp(-WEATHER_SPREAD_MINUTES, WEATHER_SPREAD_MINUTES),
        driver_performance: 1.0,
        route_complexity: if priority == DeliveryPriority::Express {
            EXPRESS_COMPLEXITY_MINUTES
        } else {
            0.0
        },
        time_of_day: time_of_day_minutes(hour),
    }
}

pub fn confidence(factors: &EtaFactors) -> f64 {
    (MAX_CONFIDENCE - factors.total_adjustment().abs() / 2.0).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// Shifts the previous estimate by the summed adjustment.
pub fn adjusted_eta(previous: DateTime<Utc>, factors: &EtaFactors) -> DateTime<Utc> {
    let millis = (factors.total_adjustment() * 60_000.0).round() as i64;
    previous + Duration::milliseconds(millis)
}

pub fn drifted(previous: Option<DateTime<Utc>>, current: DateTime<Utc>) -> bool {
    previous.is_some_and(|previous| {
        (current - previous).num_milliseconds().abs() > NOTIFY_THRESHOLD_MINUTES * 60_000
    })
}

/// Human wording for the time left until `eta`.
pub fn format_eta(eta: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = ((eta - now).num_milliseconds() as f64 / 60_000.0).round() as i64;

    match minutes {
        m if m < 0 => "Overdue".to_string(),
        0 => "Arriving now".to_string(),
        1 => "1 minute".to_string(),
        m if m < 60 => format!("{m} minutes"),
        m => {
            let hours = m / 60;
            let rest = m % 60;
            match (hours, rest) {
                (1, 0) => "1 hour".to_string(),
                (h, 0) => format!("{h} hours"),
                (h, r) => format!("{h}h {r}m"),
            }
        }
    }
}
