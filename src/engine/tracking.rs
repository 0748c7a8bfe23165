use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, Timelike, Utc};
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;
use tokio::time::{Duration as TickDuration, Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::config::Config;
use crate::engine::eta::{
    DEFAULT_ETA_MINUTES, RandomWeather, WeatherFactor, adjusted_eta, analyze_factors, confidence,
    drifted, format_eta,
};
use crate::engine::routing::RoutingEngine;
use crate::geo::step_towards;
use crate::models::driver::DeliveryDriver;
use crate::models::event::DeliveryEvent;
use crate::models::location::{DriverPosition, GeoPoint};
use crate::models::order::{DeliveryOrder, DeliveryStatus, StatusMetadata};
use crate::models::route::DeliveryRoute;
use crate::models::tracking::{
    CustomerTrackingSession, DeliveryTracking, DriverSummary, EtaPrediction, NextStop,
    NotificationData, NotificationKind, RealTimeDashboard, RouteProgress, SessionPreferences,
    TrackedLocation, TrackingEventType, TrackingUpdate,
};
use crate::observability::metrics::Metrics;

/// Pickup plus drop-off.
const STOPS_PER_DELIVERY: u32 = 2;
/// Roughly 100 m of simulated movement per poll.
const SIMULATED_STEP_DEGREES: f64 = 0.001;

/// Produces the next position fix for a driver heading to a drop-off.
pub trait LocationSource: Send + Sync {
    fn next_position(
        &self,
        driver_id: Uuid,
        from: GeoPoint,
        destination: GeoPoint,
        now: DateTime<Utc>,
    ) -> Option<DriverPosition>;
}

/// Moves the driver a fixed step straight at the destination. Yields nothing
/// once the driver is within one step.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedLocationSource;

impl LocationSource for SimulatedLocationSource {
    fn next_position(
        &self,
        _driver_id: Uuid,
        from: GeoPoint,
        destination: GeoPoint,
        now: DateTime<Utc>,
    ) -> Option<DriverPosition> {
        step_towards(&from, &destination, SIMULATED_STEP_DEGREES).map(|point| DriverPosition {
            lat: point.lat,
            lng: point.lng,
            timestamp: now,
            accuracy: 10.0,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TrackingSettings {
    pub tracking_base_url: String,
    pub session_ttl: Duration,
    pub default_language: String,
    pub default_timezone: String,
}

impl TrackingSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tracking_base_url: config.tracking_base_url.trim_end_matches('/').to_string(),
            session_ttl: Duration::hours(config.session_ttl_hours),
            default_language: config.default_language.clone(),
            default_timezone: config.default_timezone.clone(),
        }
    }
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Customer-facing projection of deliveries, kept current from bus events and
/// two timers, with push notifications to tracking sessions.
pub struct TrackingEngine {
    tracking: DashMap<Uuid, DeliveryTracking>,
    predictions: DashMap<Uuid, EtaPrediction>,
    notified_etas: DashMap<Uuid, DateTime<Utc>>,
    sessions: DashMap<Uuid, CustomerTrackingSession>,
    active: DashSet<Uuid>,
    routing: Arc<RoutingEngine>,
    bus: Arc<EventBus>,
    metrics: Metrics,
    settings: TrackingSettings,
    weather: Box<dyn WeatherFactor>,
    locations: Box<dyn LocationSource>,
}

impl TrackingEngine {
    pub fn new(
        routing: Arc<RoutingEngine>,
        bus: Arc<EventBus>,
        metrics: Metrics,
        settings: TrackingSettings,
    ) -> Self {
        Self {
            tracking: DashMap::new(),
            predictions: DashMap::new(),
            notified_etas: DashMap::new(),
            sessions: DashMap::new(),
            active: DashSet::new(),
            routing,
            bus,
            metrics,
            settings,
            weather: Box::new(RandomWeather),
            locations: Box::new(SimulatedLocationSource),
        }
    }

    pub fn with_weather(mut self, weather: impl WeatherFactor + 'static) -> Self {
        self.weather = Box::new(weather);
        self
    }

    pub fn with_location_source(mut self, locations: impl LocationSource + 'static) -> Self {
        self.locations = Box::new(locations);
        self
    }

    pub fn shareable_link(&self, delivery_id: Uuid) -> String {
        format!("{}/track/{delivery_id}", self.settings.tracking_base_url)
    }

    fn sync_active_gauge(&self) {
        self.metrics.active_deliveries.set(self.active.len() as i64);
    }

    pub fn initialize_tracking(&self, delivery: &DeliveryOrder) {
        if self.tracking.contains_key(&delivery.id) {
            debug!(delivery_id = %delivery.id, "delivery already tracked");
            return;
        }

        let now = Utc::now();
        let eta = delivery
            .estimated_delivery_time
            .unwrap_or(now + Duration::minutes(DEFAULT_ETA_MINUTES));
        let next_stop = delivery.estimated_delivery_time.map(|arrival| NextStop {
            address: delivery.delivery_location.address.clone(),
            estimated_arrival: arrival,
        });
        let shareable_link = self.shareable_link(delivery.id);

        self.tracking.insert(
            delivery.id,
            DeliveryTracking {
                delivery_id: delivery.id,
                tracking_code: delivery.tracking_code.clone(),
                current_status: delivery.status,
                estimated_delivery_time: eta,
                actual_delivery_time: None,
                driver_info: None,
                current_location: None,
                route_progress: RouteProgress {
                    completed_stops: 0,
                    total_stops: STOPS_PER_DELIVERY,
                    next_stop,
                },
                tracking_history: Vec::new(),
                last_update: now,
                shareable_link: shareable_link.clone(),
            },
        );
        self.notified_etas.insert(delivery.id, eta);
        self.active.insert(delivery.id);
        self.sync_active_gauge();

        self.calculate_eta_prediction(delivery.id);

        info!(delivery_id = %delivery.id, link = %shareable_link, "tracking initialized");
        self.bus.publish(DeliveryEvent::DeliveryTrackingInitialized {
            delivery_id: delivery.id,
            shareable_link,
        });
    }

    /// Mirrors a lifecycle step into the projection and tells every session.
    pub fn handle_status_update(&self, delivery_id: Uuid, status: DeliveryStatus) {
        let now = Utc::now();
        let eta = {
            let Some(mut tracking) = self.tracking.get_mut(&delivery_id) else {
                debug!(delivery_id = %delivery_id, "status update for untracked delivery");
                return;
            };
            if !tracking.current_status.can_transition_to(status) {
                warn!(
                    delivery_id = %delivery_id,
                    from = %tracking.current_status,
                    to = %status,
                    "tracking ignored status transition"
                );
                return;
            }

            tracking.current_status = status;
            tracking.last_update = now;
            match status {
                DeliveryStatus::PickedUp => tracking.route_progress.completed_stops = 1,
                DeliveryStatus::Delivered => {
                    tracking.route_progress.completed_stops = tracking.route_progress.total_stops;
                    tracking.route_progress.next_stop = None;
                    tracking.actual_delivery_time = Some(now);
                }
                _ => {}
            }
            tracking.estimated_delivery_time
        };

        if status.is_terminal() {
            self.active.remove(&delivery_id);
            self.sync_active_gauge();
        }

        self.notify_sessions(
            delivery_id,
            NotificationKind::StatusUpdate,
            format!("Status updated: {status}"),
            NotificationData {
                event_type: TrackingEventType::from(status),
                status: Some(status),
                estimated_arrival: Some(eta),
                location: None,
            },
        );
    }

    /// History entry for a status the routing engine accepted.
    pub fn record_status_change(
        &self,
        delivery_id: Uuid,
        status: DeliveryStatus,
        metadata: Option<StatusMetadata>,
    ) {
        let driver_id = self
            .routing
            .get_delivery_order(delivery_id)
            .and_then(|order| order.assigned_driver_id);

        self.append_history(
            delivery_id,
            TrackingEventType::from(status),
            Some(format!("Delivery status: {status}")),
            driver_id,
            metadata,
        );
    }

    fn append_history(
        &self,
        delivery_id: Uuid,
        event_type: TrackingEventType,
        message: Option<String>,
        driver_id: Option<Uuid>,
        metadata: Option<StatusMetadata>,
    ) {
        let update = {
            let Some(mut tracking) = self.tracking.get_mut(&delivery_id) else {
                debug!(delivery_id = %delivery_id, "history for untracked delivery dropped");
                return;
            };

            let now = Utc::now();
            let update = TrackingUpdate {
                id: Uuid::new_v4(),
                delivery_id,
                event_type,
                timestamp: now,
                location: tracking.current_location,
                driver_id,
                message,
                estimated_arrival: Some(tracking.estimated_delivery_time),
                metadata,
            };
            tracking.tracking_history.push(update.clone());
            tracking.last_update = now;
            update
        };

        self.bus.publish(DeliveryEvent::TrackingUpdateAdded {
            delivery_id,
            update: Box::new(update),
        });
    }

    pub fn handle_route_optimized(&self, route: &DeliveryRoute, driver: &DeliveryDriver) {
        let summary = DriverSummary {
            driver_id: driver.id,
            name: driver.name.clone(),
            phone: driver.phone.clone(),
            vehicle: driver.vehicle_type,
        };

        for stop in &route.stops {
            {
                let Some(mut tracking) = self.tracking.get_mut(&stop.order_id) else {
                    continue;
                };
                if tracking
                    .current_status
                    .can_transition_to(DeliveryStatus::Assigned)
                {
                    tracking.current_status = DeliveryStatus::Assigned;
                }
                tracking.driver_info = Some(summary.clone());
                tracking.route_progress.next_stop = Some(NextStop {
                    address: stop.location.address.clone(),
                    estimated_arrival: stop.estimated_arrival,
                });
                tracking.estimated_delivery_time = stop.estimated_arrival;
                tracking.last_update = Utc::now();
            }
            self.notified_etas
                .insert(stop.order_id, stop.estimated_arrival);

            self.notify_sessions(
                stop.order_id,
                NotificationKind::DriverAssigned,
                format!("{} is assigned to your delivery", driver.name),
                NotificationData {
                    event_type: TrackingEventType::DriverAssigned,
                    status: Some(DeliveryStatus::Assigned),
                    estimated_arrival: Some(stop.estimated_arrival),
                    location: None,
                },
            );
        }
    }

    /// Applies a fix to every tracked delivery assigned to the driver,
    /// finished ones included.
    pub fn handle_location_update(&self, driver_id: Uuid, position: DriverPosition) {
        let location = TrackedLocation {
            latitude: position.lat,
            longitude: position.lng,
            accuracy: position.accuracy,
            timestamp: position.timestamp,
        };

        let tracked: Vec<Uuid> = self.tracking.iter().map(|entry| *entry.key()).collect();
        for delivery_id in tracked {
            let assigned_here = self
                .routing
                .get_delivery_order(delivery_id)
                .is_some_and(|order| order.assigned_driver_id == Some(driver_id));
            if !assigned_here {
                continue;
            }

            {
                let Some(mut tracking) = self.tracking.get_mut(&delivery_id) else {
                    continue;
                };
                tracking.current_location = Some(location);
                tracking.last_update = Utc::now();
            }

            let eta = self
                .calculate_eta_prediction(delivery_id)
                .map(|prediction| prediction.current_eta);

            self.notify_sessions(
                delivery_id,
                NotificationKind::LocationUpdate,
                "Driver location updated".to_string(),
                NotificationData {
                    event_type: TrackingEventType::LocationUpdate,
                    status: None,
                    estimated_arrival: eta,
                    location: Some(location),
                },
            );
        }
    }

    /// Recomputes the ETA from the previous estimate. Sessions hear about it
    /// only when it moved more than the notify threshold since they last did.
    pub fn calculate_eta_prediction(&self, delivery_id: Uuid) -> Option<EtaPrediction> {
        self.predict_eta_at_hour(delivery_id, Local::now().hour())
    }

    fn predict_eta_at_hour(&self, delivery_id: Uuid, hour: u32) -> Option<EtaPrediction> {
        let order = self.routing.get_delivery_order(delivery_id)?;
        let now = Utc::now();
        let factors = analyze_factors(hour, order.priority, self.weather.as_ref());

        let eta = {
            let mut tracking = self.tracking.get_mut(&delivery_id)?;
            let eta = adjusted_eta(tracking.estimated_delivery_time, &factors);
            tracking.estimated_delivery_time = eta;
            tracking.last_update = now;
            eta
        };

        let prediction = EtaPrediction {
            delivery_id,
            current_eta: eta,
            confidence: confidence(&factors),
            factors,
            last_updated: now,
        };
        self.predictions.insert(delivery_id, prediction.clone());

        let last_notified = self.notified_etas.get(&delivery_id).map(|entry| *entry);
        if drifted(last_notified, eta) {
            self.notified_etas.insert(delivery_id, eta);
            let message = format!("ETA updated: {}", format_eta(eta, now));
            self.append_history(
                delivery_id,
                TrackingEventType::EtaUpdate,
                Some(message.clone()),
                order.assigned_driver_id,
                None,
            );
            self.notify_sessions(
                delivery_id,
                NotificationKind::EtaUpdate,
                message,
                NotificationData {
                    event_type: TrackingEventType::EtaUpdate,
                    status: None,
                    estimated_arrival: Some(eta),
                    location: None,
                },
            );
        }

        self.bus.publish(DeliveryEvent::EtaUpdated {
            delivery_id,
            eta,
            confidence: prediction.confidence,
            factors,
        });

        Some(prediction)
    }

    pub fn create_tracking_session(
        &self,
        delivery_id: Uuid,
        customer_id: String,
        language: Option<String>,
        timezone: Option<String>,
    ) -> CustomerTrackingSession {
        let now = Utc::now();
        let session = CustomerTrackingSession {
            session_id: Uuid::new_v4(),
            delivery_id,
            customer_id,
            start_time: now,
            last_activity: now,
            view_count: 0,
            share_count: 0,
            notifications_enabled: true,
            preferred_language: language
                .unwrap_or_else(|| self.settings.default_language.clone()),
            timezone: timezone.unwrap_or_else(|| self.settings.default_timezone.clone()),
        };
        self.sessions.insert(session.session_id, session.clone());

        info!(
            session_id = %session.session_id,
            delivery_id = %delivery_id,
            "tracking session created"
        );
        self.bus.publish(DeliveryEvent::TrackingSessionCreated {
            session: Box::new(session.clone()),
        });

        session
    }

    fn touch_session<F>(&self, session_id: Uuid, apply: F) -> Option<CustomerTrackingSession>
    where
        F: FnOnce(&mut CustomerTrackingSession),
    {
        let now = Utc::now();
        let mut session = self.sessions.get_mut(&session_id)?;
        if session.is_expired(now, self.settings.session_ttl) {
            return None;
        }
        apply(&mut session);
        session.last_activity = now;
        Some(session.clone())
    }

    pub fn get_session(&self, session_id: Uuid) -> Option<CustomerTrackingSession> {
        let session = self.sessions.get(&session_id)?;
        if session.is_expired(Utc::now(), self.settings.session_ttl) {
            return None;
        }
        Some(session.clone())
    }

    pub fn record_view(&self, session_id: Uuid) -> Option<CustomerTrackingSession> {
        self.touch_session(session_id, |session| {
            session.view_count = session.view_count.saturating_add(1)
        })
    }

    pub fn record_share(&self, session_id: Uuid) -> Option<CustomerTrackingSession> {
        self.touch_session(session_id, |session| {
            session.share_count = session.share_count.saturating_add(1)
        })
    }

    pub fn update_preferences(
        &self,
        session_id: Uuid,
        preferences: SessionPreferences,
    ) -> Option<CustomerTrackingSession> {
        self.touch_session(session_id, move |session| {
            if let Some(enabled) = preferences.notifications_enabled {
                session.notifications_enabled = enabled;
            }
            if let Some(language) = preferences.preferred_language {
                session.preferred_language = language;
            }
            if let Some(timezone) = preferences.timezone {
                session.timezone = timezone;
            }
        })
    }

    pub fn prune_expired_sessions(&self) -> usize {
        let now = Utc::now();
        let ttl = self.settings.session_ttl;
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !session.is_expired(now, ttl));
        before - self.sessions.len()
    }

    /// Fire-and-forget fan-out to the live, opted-in sessions of a delivery.
    pub fn notify_sessions(
        &self,
        delivery_id: Uuid,
        kind: NotificationKind,
        message: String,
        data: NotificationData,
    ) -> usize {
        let now = Utc::now();
        let ttl = self.settings.session_ttl;
        let recipients: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| {
                let session = entry.value();
                session.delivery_id == delivery_id
                    && session.notifications_enabled
                    && !session.is_expired(now, ttl)
            })
            .map(|entry| *entry.key())
            .collect();

        for session_id in &recipients {
            self.bus.publish(DeliveryEvent::CustomerNotification {
                session_id: *session_id,
                delivery_id,
                kind,
                message: message.clone(),
                data: data.clone(),
            });
            self.metrics
                .customer_notifications_total
                .with_label_values(&[kind.as_str()])
                .inc();
        }

        if !recipients.is_empty() {
            debug!(
                delivery_id = %delivery_id,
                kind = kind.as_str(),
                sessions = recipients.len(),
                "customers notified"
            );
        }
        recipients.len()
    }

    /// One simulated fix per driver, aimed at that driver's soonest drop-off.
    pub fn poll_locations(&self) -> usize {
        let now = Utc::now();
        let mut soonest: HashMap<Uuid, (DateTime<Utc>, DeliveryOrder)> = HashMap::new();

        let active: Vec<Uuid> = self.active.iter().map(|id| *id).collect();
        for delivery_id in active {
            let Some(order) = self.routing.get_delivery_order(delivery_id) else {
                continue;
            };
            let Some(driver_id) = order.assigned_driver_id else {
                continue;
            };
            let Some(eta) = self
                .tracking
                .get(&delivery_id)
                .map(|tracking| tracking.estimated_delivery_time)
            else {
                continue;
            };

            let replace = soonest
                .get(&driver_id)
                .is_none_or(|(best, _)| eta < *best);
            if replace {
                soonest.insert(driver_id, (eta, order));
            }
        }

        let mut published = 0;
        for (driver_id, (_, order)) in soonest {
            let tracked_from = self
                .tracking
                .get(&order.id)
                .and_then(|tracking| tracking.current_location)
                .map(|location| GeoPoint {
                    lat: location.latitude,
                    lng: location.longitude,
                });
            let from = tracked_from.or_else(|| {
                self.routing
                    .get_driver(driver_id)
                    .and_then(|driver| driver.current_location)
                    .map(|position| position.point())
            });
            let Some(from) = from else {
                continue;
            };

            if let Some(location) =
                self.locations
                    .next_position(driver_id, from, order.destination(), now)
            {
                self.bus.publish(DeliveryEvent::DriverLocationUpdate {
                    driver_id,
                    location,
                });
                published += 1;
            }
        }
        published
    }

    pub fn refresh_etas(&self) -> usize {
        let active: Vec<Uuid> = self.active.iter().map(|id| *id).collect();
        let refreshed = active
            .into_iter()
            .filter_map(|delivery_id| self.calculate_eta_prediction(delivery_id))
            .count();

        let pruned = self.prune_expired_sessions();
        if pruned > 0 {
            debug!(sessions = pruned, "expired tracking sessions pruned");
        }
        refreshed
    }

    pub fn get_tracking(&self, delivery_id: Uuid) -> Option<DeliveryTracking> {
        self.tracking.get(&delivery_id).map(|tracking| tracking.clone())
    }

    pub fn get_eta_prediction(&self, delivery_id: Uuid) -> Option<EtaPrediction> {
        self.predictions
            .get(&delivery_id)
            .map(|prediction| prediction.clone())
    }

    pub fn get_tracking_history(&self, delivery_id: Uuid) -> Vec<TrackingUpdate> {
        self.tracking
            .get(&delivery_id)
            .map(|tracking| tracking.tracking_history.clone())
            .unwrap_or_default()
    }

    pub fn is_active(&self, delivery_id: Uuid) -> bool {
        self.active.contains(&delivery_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn get_dashboard(&self) -> RealTimeDashboard {
        let now = Utc::now();
        let mut on_time = 0;
        let mut minutes_left = 0.0;
        let mut routes = HashSet::new();
        let mut total_distance = 0.0;

        let active: Vec<Uuid> = self.active.iter().map(|id| *id).collect();
        for delivery_id in &active {
            if let Some(tracking) = self.tracking.get(delivery_id) {
                let eta = tracking.estimated_delivery_time;
                if eta >= now {
                    on_time += 1;
                }
                minutes_left += (eta - now).num_seconds() as f64 / 60.0;
            }
            if let Some(route) = self.routing.route_for_delivery(*delivery_id) {
                if routes.insert(route.id) {
                    total_distance += route.total_distance;
                }
            }
        }

        let average_eta = if active.is_empty() {
            0.0
        } else {
            (minutes_left / active.len() as f64).max(0.0)
        };

        RealTimeDashboard {
            active_deliveries: active.len(),
            on_time_deliveries: on_time,
            average_eta,
            total_distance,
        }
    }

    fn handle_event(&self, event: DeliveryEvent) {
        match event {
            DeliveryEvent::DeliveryOrderCreated { delivery } => {
                self.initialize_tracking(&delivery)
            }
            DeliveryEvent::DeliveryStatusUpdate {
                delivery_id,
                status,
                ..
            } => self.handle_status_update(delivery_id, status),
            DeliveryEvent::DeliveryStatusChanged {
                delivery_id,
                status,
                metadata,
            } => self.record_status_change(delivery_id, status, metadata),
            DeliveryEvent::DriverLocationUpdate {
                driver_id,
                location,
            } => self.handle_location_update(driver_id, location),
            DeliveryEvent::RouteOptimized { route, driver, .. } => {
                self.handle_route_optimized(&route, &driver)
            }
            DeliveryEvent::CustomerTrackingRequest {
                delivery_id,
                customer_id,
            } => {
                self.create_tracking_session(delivery_id, customer_id, None, None);
            }
            other => debug!(topic = %other.topic(), "event not handled by tracking engine"),
        }
    }
}

fn ticker(period: TickDuration) -> tokio::time::Interval {
    let period = period.max(TickDuration::from_millis(1));
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Tracking worker. Bus events and both timers share one loop, so a timer
/// body never runs alongside an event handler.
pub async fn run_tracking_engine(
    engine: Arc<TrackingEngine>,
    mut event_rx: mpsc::UnboundedReceiver<DeliveryEvent>,
    poll_period: TickDuration,
    eta_period: TickDuration,
) {
    info!(
        poll_secs = poll_period.as_secs_f64(),
        eta_secs = eta_period.as_secs_f64(),
        "tracking engine started"
    );

    let mut poll = ticker(poll_period);
    let mut refresh = ticker(eta_period);

    loop {
        tokio::select! {
            maybe_event = event_rx.recv() => match maybe_event {
                Some(event) => engine.handle_event(event),
                None => break,
            },
            _ = poll.tick() => {
                let published = engine.poll_locations();
                debug!(published, "location poll finished");
            }
            _ = refresh.tick() => {
                let refreshed = engine.refresh_etas();
                debug!(refreshed, "eta refresh finished");
            }
        }
    }

    warn!("tracking engine stopped: bus channel closed");
}
