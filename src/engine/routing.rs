use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::engine::intake::{
    delivery_order_from_sale, validate_profile, validate_request, validate_sale,
};
use crate::engine::planner::{build_route, empty_route, plan_route};
use crate::error::AppError;
use crate::models::driver::{DeliveryDriver, DriverProfile, DriverStatus};
use crate::models::event::DeliveryEvent;
use crate::models::location::DriverPosition;
use crate::models::order::{DeliveryOrder, DeliveryStatistics, DeliveryStatus, StatusMetadata};
use crate::models::route::{
    DeliveryRoute, OptimizationGoals, RouteConstraints, RouteOptimizationRequest,
    RouteOptimizationResult, RouteStatus, StopStatus, TimeWindow,
};
use crate::models::sale::SaleOrder;
use crate::observability::metrics::Metrics;

/// Owns drivers, delivery orders and routes. Every optimization run, explicit
/// or swept, and every delivery status change holds `optimization_guard`, so a
/// pending order is routed once and never assigned after it was cancelled.
pub struct RoutingEngine {
    orders: DashMap<Uuid, DeliveryOrder>,
    drivers: DashMap<Uuid, DeliveryDriver>,
    routes: DashMap<Uuid, DeliveryRoute>,
    route_by_order: DashMap<Uuid, Uuid>,
    bus: Arc<EventBus>,
    metrics: Metrics,
    route_horizon: Duration,
    optimization_guard: Mutex<()>,
}

impl RoutingEngine {
    pub fn new(bus: Arc<EventBus>, metrics: Metrics, route_horizon: Duration) -> Self {
        Self {
            orders: DashMap::new(),
            drivers: DashMap::new(),
            routes: DashMap::new(),
            route_by_order: DashMap::new(),
            bus,
            metrics,
            route_horizon,
            optimization_guard: Mutex::new(()),
        }
    }

    fn lock_optimization(&self) -> MutexGuard<'_, ()> {
        self.optimization_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register_driver(&self, profile: DriverProfile) -> Result<DeliveryDriver, AppError> {
        validate_profile(&profile)?;

        let driver = DeliveryDriver::from_profile(profile, Utc::now());
        self.drivers.insert(driver.id, driver.clone());

        info!(driver_id = %driver.id, vehicle = ?driver.vehicle_type, "driver registered");
        self.bus.publish(DeliveryEvent::DriverRegistered {
            driver: Box::new(driver.clone()),
        });

        Ok(driver)
    }

    /// Persists the sale as a `PENDING` delivery, then sweeps. The returned
    /// copy reflects any assignment the sweep made.
    pub fn create_delivery_order(&self, sale: SaleOrder) -> Result<DeliveryOrder, AppError> {
        validate_sale(&sale)?;

        let order = delivery_order_from_sale(sale, Utc::now());
        self.orders.insert(order.id, order.clone());
        self.metrics.deliveries_created_total.inc();

        info!(
            delivery_id = %order.id,
            order_id = %order.order_id,
            tracking_code = %order.tracking_code,
            priority = ?order.priority,
            "delivery order created"
        );
        self.bus.publish(DeliveryEvent::DeliveryOrderCreated {
            delivery: Box::new(order.clone()),
        });

        self.optimize_pending_deliveries();

        Ok(self.get_delivery_order(order.id).unwrap_or(order))
    }

    pub fn optimize_routes(
        &self,
        request: RouteOptimizationRequest,
    ) -> Result<RouteOptimizationResult, AppError> {
        validate_request(&request)?;

        let _guard = self.lock_optimization();
        Ok(self.run_optimization(request, Utc::now()))
    }

    /// Routes every still-pending order across available drivers, oldest
    /// registration first. Returns the non-empty runs.
    pub fn optimize_pending_deliveries(&self) -> Vec<RouteOptimizationResult> {
        let _guard = self.lock_optimization();

        let pending_count = self.pending_orders().len();
        if pending_count == 0 {
            debug!("sweep skipped, nothing pending");
            return Vec::new();
        }

        self.bus
            .publish(DeliveryEvent::AutoRouteOptimizationTriggered {
                pending_orders: pending_count,
            });

        let now = Utc::now();
        let window = TimeWindow {
            start: now,
            end: now + self.route_horizon,
        };

        let mut results = Vec::new();
        for driver in self.get_available_drivers() {
            let pending = self.pending_orders();
            if pending.is_empty() {
                break;
            }

            let request = RouteOptimizationRequest {
                driver,
                pending_orders: pending,
                time_window: window,
                constraints: RouteConstraints::default(),
                optimization_goals: OptimizationGoals::default(),
            };
            let result = self.run_optimization(request, now);
            if !result.route.stops.is_empty() {
                results.push(result);
            }
        }

        info!(
            pending = pending_count,
            routes = results.len(),
            "optimization sweep finished"
        );
        results
    }

    /// Must be called with the optimization guard held.
    fn run_optimization(
        &self,
        request: RouteOptimizationRequest,
        now: DateTime<Utc>,
    ) -> RouteOptimizationResult {
        let started = Instant::now();
        let RouteOptimizationRequest {
            driver,
            pending_orders,
            time_window,
            constraints,
            optimization_goals,
        } = request;

        let mut candidates = Vec::with_capacity(pending_orders.len());
        let mut unassigned = Vec::new();
        for order in pending_orders {
            match self.orders.get(&order.id) {
                Some(stored) if stored.status == DeliveryStatus::Pending => {
                    candidates.push(stored.clone())
                }
                _ => unassigned.push(order),
            }
        }

        let plan = plan_route(
            &driver,
            &candidates,
            &time_window,
            &constraints,
            &optimization_goals,
        );
        unassigned.extend(plan.unassigned.iter().cloned());

        if plan.is_empty() {
            self.observe_run("empty", started);
            debug!(
                driver_id = %driver.id,
                unassigned = unassigned.len(),
                "no eligible orders for driver"
            );
            return RouteOptimizationResult {
                route: empty_route(driver.id, &time_window, now),
                unassigned_orders: unassigned,
                optimization_metrics: plan.metrics,
            };
        }

        let route = build_route(&driver, &time_window, &plan, now);
        for stop in &route.stops {
            if let Some(mut order) = self.orders.get_mut(&stop.order_id) {
                order.status = DeliveryStatus::Assigned;
                order.assigned_driver_id = Some(driver.id);
                order.estimated_pickup_time = Some(time_window.start);
                order.estimated_delivery_time = Some(stop.estimated_arrival);
                order.updated_at = now;
            }
            self.route_by_order.insert(stop.order_id, route.id);

            self.bus.publish(DeliveryEvent::DeliveryStatusChanged {
                delivery_id: stop.order_id,
                status: DeliveryStatus::Assigned,
                metadata: None,
            });
        }
        self.routes.insert(route.id, route.clone());

        info!(
            route_id = %route.id,
            driver_id = %driver.id,
            stops = route.stops.len(),
            unassigned = unassigned.len(),
            distance_km = route.total_distance,
            score = route.optimization_score,
            "route optimized"
        );
        self.bus.publish(DeliveryEvent::RouteOptimized {
            route: Box::new(route.clone()),
            driver: Box::new(driver),
            assigned_orders: route.stops.len(),
            unassigned_orders: unassigned.len(),
        });
        self.observe_run("planned", started);

        RouteOptimizationResult {
            route,
            unassigned_orders: unassigned,
            optimization_metrics: plan.metrics,
        }
    }

    fn observe_run(&self, outcome: &str, started: Instant) {
        self.metrics
            .route_optimization_latency_seconds
            .observe(started.elapsed().as_secs_f64());
        self.metrics
            .route_optimizations_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn update_driver_location(
        &self,
        driver_id: Uuid,
        location: DriverPosition,
    ) -> Option<DeliveryDriver> {
        let Some(mut driver) = self.drivers.get_mut(&driver_id) else {
            debug!(driver_id = %driver_id, "location for unknown driver ignored");
            return None;
        };

        driver.current_location = Some(location);
        driver.last_active = Utc::now();
        Some(driver.clone())
    }

    pub fn update_driver_status(
        &self,
        driver_id: Uuid,
        status: DriverStatus,
    ) -> Option<DeliveryDriver> {
        let mut driver = self.drivers.get_mut(&driver_id)?;
        driver.status = status;
        driver.last_active = Utc::now();

        info!(driver_id = %driver_id, status = ?status, "driver status changed");
        Some(driver.clone())
    }

    /// Applies one lifecycle step and republishes it as
    /// `DELIVERY_STATUS_CHANGED`. Terminal orders and backwards moves are
    /// rejected with `Conflict`.
    pub fn update_delivery_status(
        &self,
        delivery_id: Uuid,
        status: DeliveryStatus,
        metadata: Option<StatusMetadata>,
    ) -> Result<DeliveryOrder, AppError> {
        // An optimization run must not assign an order cancelled under it.
        let _guard = self.lock_optimization();
        let now = Utc::now();
        let updated = {
            let mut order = self
                .orders
                .get_mut(&delivery_id)
                .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

            if !order.status.can_transition_to(status) {
                return Err(AppError::Conflict(format!(
                    "delivery {delivery_id} cannot move from {} to {status}",
                    order.status
                )));
            }

            order.status = status;
            order.updated_at = now;
            if status == DeliveryStatus::Delivered {
                order.actual_delivery_time = Some(now);
            }
            order.clone()
        };

        self.advance_route(delivery_id, status, metadata.as_ref(), now);

        if status == DeliveryStatus::Delivered {
            if let Some(driver_id) = updated.assigned_driver_id {
                if let Some(mut driver) = self.drivers.get_mut(&driver_id) {
                    let minutes = (now - updated.created_at).num_seconds() as f64 / 60.0;
                    driver.record_completed_delivery(minutes);
                }
            }
        }

        info!(delivery_id = %delivery_id, status = %status, "delivery status changed");
        self.bus.publish(DeliveryEvent::DeliveryStatusChanged {
            delivery_id,
            status,
            metadata,
        });

        Ok(updated)
    }

    fn advance_route(
        &self,
        delivery_id: Uuid,
        status: DeliveryStatus,
        metadata: Option<&StatusMetadata>,
        now: DateTime<Utc>,
    ) {
        let Some(route_id) = self.route_by_order.get(&delivery_id).map(|entry| *entry) else {
            return;
        };
        let Some(mut route) = self.routes.get_mut(&route_id) else {
            return;
        };

        if matches!(
            status,
            DeliveryStatus::PickedUp | DeliveryStatus::InTransit | DeliveryStatus::Delivered
        ) && route.status == RouteStatus::Planned
        {
            route.status = RouteStatus::Active;
            route.actual_start_time = Some(now);
        }

        if let Some(stop) = route
            .stops
            .iter_mut()
            .find(|stop| stop.order_id == delivery_id)
        {
            match status {
                DeliveryStatus::Delivered => {
                    stop.status = StopStatus::Completed;
                    stop.actual_arrival.get_or_insert(now);
                    stop.actual_departure = Some(now);
                    if let Some(metadata) = metadata {
                        stop.photos.extend(metadata.photos.iter().cloned());
                        if metadata.signature.is_some() {
                            stop.signature = metadata.signature.clone();
                        }
                        if metadata.notes.is_some() {
                            stop.notes = metadata.notes.clone();
                        }
                    }
                }
                DeliveryStatus::Failed | DeliveryStatus::Returned => {
                    stop.status = StopStatus::Failed;
                }
                DeliveryStatus::Cancelled => stop.status = StopStatus::Skipped,
                _ => {}
            }
        }

        let open = matches!(route.status, RouteStatus::Planned | RouteStatus::Active);
        if open && route.stops.iter().all(|stop| stop.status.is_settled()) {
            let any_completed = route
                .stops
                .iter()
                .any(|stop| stop.status == StopStatus::Completed);
            route.status = if any_completed {
                RouteStatus::Completed
            } else {
                RouteStatus::Cancelled
            };
            route.actual_end_time = Some(now);
            info!(route_id = %route_id, status = ?route.status, "route closed");
        }
        route.updated_at = now;
    }

    pub fn get_delivery_order(&self, delivery_id: Uuid) -> Option<DeliveryOrder> {
        self.orders.get(&delivery_id).map(|order| order.clone())
    }

    pub fn get_driver(&self, driver_id: Uuid) -> Option<DeliveryDriver> {
        self.drivers.get(&driver_id).map(|driver| driver.clone())
    }

    pub fn list_drivers(&self) -> Vec<DeliveryDriver> {
        let mut drivers: Vec<DeliveryDriver> =
            self.drivers.iter().map(|entry| entry.value().clone()).collect();
        drivers.sort_by_key(|driver| driver.registered_at);
        drivers
    }

    pub fn get_available_drivers(&self) -> Vec<DeliveryDriver> {
        self.list_drivers()
            .into_iter()
            .filter(|driver| driver.status == DriverStatus::Available)
            .collect()
    }

    fn pending_orders(&self) -> Vec<DeliveryOrder> {
        let mut pending: Vec<DeliveryOrder> = self
            .orders
            .iter()
            .filter(|entry| entry.status == DeliveryStatus::Pending)
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by_key(|order| order.created_at);
        pending
    }

    pub fn get_pending_deliveries(&self) -> Vec<DeliveryOrder> {
        self.pending_orders()
    }

    pub fn get_route(&self, route_id: Uuid) -> Option<DeliveryRoute> {
        self.routes.get(&route_id).map(|route| route.clone())
    }

    pub fn route_for_delivery(&self, delivery_id: Uuid) -> Option<DeliveryRoute> {
        let route_id = *self.route_by_order.get(&delivery_id)?;
        self.get_route(route_id)
    }

    pub fn list_routes(&self) -> Vec<DeliveryRoute> {
        let mut routes: Vec<DeliveryRoute> =
            self.routes.iter().map(|entry| entry.value().clone()).collect();
        routes.sort_by_key(|route| route.created_at);
        routes
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn delivery_count(&self) -> usize {
        self.orders.len()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn get_delivery_statistics(&self) -> DeliveryStatistics {
        let mut stats = DeliveryStatistics::default();
        let mut total_minutes = 0.0;
        let mut on_time = 0usize;

        for entry in self.orders.iter() {
            let order = entry.value();
            stats.total_deliveries += 1;
            match order.status {
                DeliveryStatus::Pending => stats.pending_deliveries += 1,
                DeliveryStatus::Delivered => {
                    stats.completed_deliveries += 1;
                    if let Some(actual) = order.actual_delivery_time {
                        total_minutes += (actual - order.created_at).num_seconds() as f64 / 60.0;
                        if order
                            .estimated_delivery_time
                            .is_some_and(|estimate| actual <= estimate)
                        {
                            on_time += 1;
                        }
                    }
                }
                _ => {}
            }
        }

        if stats.completed_deliveries > 0 {
            let completed = stats.completed_deliveries as f64;
            stats.average_delivery_time = total_minutes / completed;
            stats.on_time_delivery_rate = on_time as f64 / completed;
        }
        stats
    }
}

/// Inbound side of the routing engine. Handles one bus event at a time.
pub async fn run_routing_engine(
    engine: Arc<RoutingEngine>,
    mut event_rx: mpsc::UnboundedReceiver<DeliveryEvent>,
) {
    info!("routing engine started");

    while let Some(event) = event_rx.recv().await {
        handle_event(&engine, event);
    }

    warn!("routing engine stopped: bus channel closed");
}

fn handle_event(engine: &RoutingEngine, event: DeliveryEvent) {
    match event {
        DeliveryEvent::OrderReadyForDelivery { order } => {
            if let Err(err) = engine.create_delivery_order(*order) {
                warn!(error = %err, "sale rejected");
            }
        }
        DeliveryEvent::DriverLocationUpdate {
            driver_id,
            location,
        } => {
            engine.update_driver_location(driver_id, location);
        }
        DeliveryEvent::DeliveryStatusUpdate {
            delivery_id,
            status,
            metadata,
        } => match engine.update_delivery_status(delivery_id, status, metadata) {
            Ok(_) => {}
            Err(AppError::NotFound(_)) => {
                debug!(delivery_id = %delivery_id, "status update for unknown delivery ignored");
            }
            Err(err) => warn!(delivery_id = %delivery_id, error = %err, "status update rejected"),
        },
        DeliveryEvent::RouteOptimizationRequest { request } => {
            if let Err(err) = engine.optimize_routes(*request) {
                warn!(error = %err, "optimization request rejected");
            }
        }
        other => debug!(topic = %other.topic(), "event not handled by routing engine"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::{sleep, Duration as StdDuration};

    use super::*;
    use crate::engine::fixtures::{driver_at, order_at, profile_at, sale_at};
    use crate::models::driver::VehicleCapacity;
    use crate::models::event::Topic;

    fn engine() -> (Arc<RoutingEngine>, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new(64));
        let engine = Arc::new(RoutingEngine::new(
            bus.clone(),
            Metrics::new(),
            Duration::hours(8),
        ));
        (engine, bus)
    }

    fn drain(rx: &mut UnboundedReceiver<DeliveryEvent>) -> Vec<DeliveryEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn window() -> TimeWindow {
        let start = Utc::now();
        TimeWindow {
            start,
            end: start + Duration::hours(8),
        }
    }

    fn request(driver: DeliveryDriver, orders: Vec<DeliveryOrder>) -> RouteOptimizationRequest {
        RouteOptimizationRequest {
            driver,
            pending_orders: orders,
            time_window: window(),
            constraints: RouteConstraints::default(),
            optimization_goals: OptimizationGoals::default(),
        }
    }

    #[test]
    fn registered_driver_is_available() {
        let (engine, bus) = engine();
        let mut rx = bus.subscribe(&[Topic::DriverRegistered]);

        let driver = engine
            .register_driver(profile_at(30.04, 31.24, 5.0))
            .unwrap();

        let available = engine.get_available_drivers();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, driver.id);
        assert_eq!(available[0].status, DriverStatus::Available);
        assert!(matches!(
            rx.try_recv().unwrap(),
            DeliveryEvent::DriverRegistered { .. }
        ));
    }

    #[test]
    fn unavailable_drivers_are_not_listed_as_available() {
        let (engine, _bus) = engine();
        let driver = engine
            .register_driver(profile_at(30.04, 31.24, 5.0))
            .unwrap();

        engine.update_driver_status(driver.id, DriverStatus::Offline);

        assert!(engine.get_available_drivers().is_empty());
        assert_eq!(engine.list_drivers().len(), 1);
    }

    #[test]
    fn new_order_is_swept_onto_an_available_driver() {
        let (engine, bus) = engine();
        let mut rx = bus.subscribe(&[
            Topic::DeliveryOrderCreated,
            Topic::AutoRouteOptimizationTriggered,
            Topic::DeliveryStatusChanged,
            Topic::RouteOptimized,
        ]);
        let driver = engine
            .register_driver(profile_at(30.0, 31.2, 10.0))
            .unwrap();

        let order = engine.create_delivery_order(sale_at(30.01, 31.21)).unwrap();

        assert_eq!(order.status, DeliveryStatus::Assigned);
        assert_eq!(order.assigned_driver_id, Some(driver.id));
        assert!(order.estimated_delivery_time.is_some());
        assert!(engine.get_pending_deliveries().is_empty());
        assert_eq!(engine.list_routes().len(), 1);
        assert!(engine.route_for_delivery(order.id).is_some());

        let topics: Vec<Topic> = drain(&mut rx).iter().map(DeliveryEvent::topic).collect();
        assert_eq!(
            topics,
            vec![
                Topic::DeliveryOrderCreated,
                Topic::AutoRouteOptimizationTriggered,
                Topic::DeliveryStatusChanged,
                Topic::RouteOptimized,
            ]
        );
    }

    #[test]
    fn order_without_drivers_stays_pending() {
        let (engine, bus) = engine();
        let mut rx = bus.subscribe(&[Topic::AutoRouteOptimizationTriggered, Topic::RouteOptimized]);

        let order = engine.create_delivery_order(sale_at(30.01, 31.21)).unwrap();

        assert_eq!(order.status, DeliveryStatus::Pending);
        assert_eq!(engine.get_pending_deliveries().len(), 1);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            DeliveryEvent::AutoRouteOptimizationTriggered { pending_orders: 1 }
        ));
    }

    #[test]
    fn malformed_sale_is_rejected() {
        let (engine, _bus) = engine();
        let mut sale = sale_at(30.01, 31.21);
        sale.items.clear();

        let err = engine.create_delivery_order(sale).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(engine.get_delivery_statistics().total_deliveries, 0);
    }

    #[test]
    fn out_of_area_order_yields_empty_route() {
        let (engine, bus) = engine();
        let mut rx = bus.subscribe(&[Topic::RouteOptimized]);
        let order = engine.create_delivery_order(sale_at(30.175, 31.24)).unwrap();
        let driver = driver_at(30.04, 31.24, 5.0);

        let result = engine
            .optimize_routes(request(driver, vec![order.clone()]))
            .unwrap();

        assert!(result.route.stops.is_empty());
        assert_eq!(result.route.total_distance, 0.0);
        assert_eq!(result.unassigned_orders.len(), 1);
        assert_eq!(result.unassigned_orders[0].id, order.id);
        assert!(engine.list_routes().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn orders_not_in_the_store_are_unassigned() {
        let (engine, _bus) = engine();
        let stranger = order_at(30.01, 31.21);

        let result = engine
            .optimize_routes(request(driver_at(30.0, 31.2, 10.0), vec![stranger.clone()]))
            .unwrap();

        assert!(result.route.stops.is_empty());
        assert_eq!(result.unassigned_orders[0].id, stranger.id);
    }

    #[test]
    fn assigned_orders_are_not_routed_twice() {
        let (engine, _bus) = engine();
        let order = engine.create_delivery_order(sale_at(30.01, 31.21)).unwrap();

        let first = engine
            .optimize_routes(request(driver_at(30.0, 31.2, 10.0), vec![order.clone()]))
            .unwrap();
        let second = engine
            .optimize_routes(request(driver_at(30.0, 31.2, 10.0), vec![order.clone()]))
            .unwrap();

        assert_eq!(first.route.stops.len(), 1);
        assert!(second.route.stops.is_empty());
        assert_eq!(second.unassigned_orders.len(), 1);
        assert_eq!(engine.list_routes().len(), 1);
    }

    #[test]
    fn invalid_window_is_a_bad_request() {
        let (engine, _bus) = engine();
        let mut req = request(driver_at(30.0, 31.2, 10.0), Vec::new());
        req.time_window.end = req.time_window.start - Duration::minutes(1);

        assert!(matches!(
            engine.optimize_routes(req),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn delivered_order_closes_stop_route_and_counts_for_driver() {
        let (engine, bus) = engine();
        let mut rx = bus.subscribe(&[Topic::DeliveryStatusChanged]);
        let driver = engine
            .register_driver(profile_at(30.0, 31.2, 10.0))
            .unwrap();
        let order = engine.create_delivery_order(sale_at(30.01, 31.21)).unwrap();
        drain(&mut rx);

        engine
            .update_delivery_status(order.id, DeliveryStatus::PickedUp, None)
            .unwrap();
        let route = engine.route_for_delivery(order.id).unwrap();
        assert_eq!(route.status, RouteStatus::Active);
        assert!(route.actual_start_time.is_some());

        let metadata = StatusMetadata {
            photos: vec!["pod.jpg".to_string()],
            signature: Some("sig".to_string()),
            ..StatusMetadata::default()
        };
        let delivered = engine
            .update_delivery_status(order.id, DeliveryStatus::Delivered, Some(metadata))
            .unwrap();

        assert!(delivered.actual_delivery_time.is_some());
        let route = engine.route_for_delivery(order.id).unwrap();
        assert_eq!(route.status, RouteStatus::Completed);
        assert!(route.actual_end_time.is_some());
        assert_eq!(route.stops[0].status, StopStatus::Completed);
        assert_eq!(route.stops[0].photos, vec!["pod.jpg".to_string()]);
        assert_eq!(route.stops[0].signature.as_deref(), Some("sig"));
        assert_eq!(engine.get_driver(driver.id).unwrap().completed_deliveries, 1);
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[test]
    fn terminal_orders_reject_further_updates() {
        let (engine, _bus) = engine();
        let order = engine.create_delivery_order(sale_at(30.01, 31.21)).unwrap();
        engine
            .update_delivery_status(order.id, DeliveryStatus::Cancelled, None)
            .unwrap();

        let err = engine
            .update_delivery_status(order.id, DeliveryStatus::Delivered, None)
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        let stored = engine.get_delivery_order(order.id).unwrap();
        assert_eq!(stored.status, DeliveryStatus::Cancelled);
        assert!(stored.actual_delivery_time.is_none());
    }

    #[test]
    fn cancelling_every_stop_cancels_the_route() {
        let (engine, _bus) = engine();
        engine
            .register_driver(profile_at(30.0, 31.2, 10.0))
            .unwrap();
        let order = engine.create_delivery_order(sale_at(30.01, 31.21)).unwrap();

        engine
            .update_delivery_status(order.id, DeliveryStatus::Cancelled, None)
            .unwrap();

        let route = engine.route_for_delivery(order.id).unwrap();
        assert_eq!(route.stops[0].status, StopStatus::Skipped);
        assert_eq!(route.status, RouteStatus::Cancelled);
    }

    #[test]
    fn unknown_delivery_update_is_not_found() {
        let (engine, _bus) = engine();
        assert!(matches!(
            engine.update_delivery_status(Uuid::new_v4(), DeliveryStatus::Delivered, None),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn location_update_overwrites_driver_position() {
        let (engine, _bus) = engine();
        let driver = engine
            .register_driver(profile_at(30.0, 31.2, 10.0))
            .unwrap();
        let fix = DriverPosition {
            lat: 30.02,
            lng: 31.22,
            timestamp: Utc::now(),
            accuracy: 5.0,
        };

        engine.update_driver_location(driver.id, fix);

        assert_eq!(engine.get_driver(driver.id).unwrap().current_location, Some(fix));
        assert!(engine.update_driver_location(Uuid::new_v4(), fix).is_none());
    }

    #[test]
    fn statistics_cover_delivered_orders() {
        let (engine, _bus) = engine();
        engine
            .register_driver(profile_at(30.0, 31.2, 10.0))
            .unwrap();
        let delivered = engine.create_delivery_order(sale_at(30.01, 31.21)).unwrap();
        engine.create_delivery_order(sale_at(30.02, 31.22)).unwrap();
        engine
            .update_delivery_status(delivered.id, DeliveryStatus::Delivered, None)
            .unwrap();

        let stats = engine.get_delivery_statistics();
        assert_eq!(stats.total_deliveries, 2);
        assert_eq!(stats.completed_deliveries, 1);
        assert_eq!(stats.on_time_delivery_rate, 1.0);
        assert!(stats.average_delivery_time >= 0.0);
    }

    #[test]
    fn empty_store_statistics_are_zero() {
        let (engine, _bus) = engine();
        assert_eq!(engine.get_delivery_statistics(), DeliveryStatistics::default());
    }

    #[tokio::test]
    async fn worker_turns_ready_sales_into_deliveries() {
        let (engine, bus) = engine();
        let rx = bus.subscribe(&[Topic::OrderReadyForDelivery]);
        tokio::spawn(run_routing_engine(engine.clone(), rx));

        bus.publish(DeliveryEvent::OrderReadyForDelivery {
            order: Box::new(sale_at(30.01, 31.21)),
        });

        for _ in 0..50 {
            if engine.get_delivery_statistics().total_deliveries == 1 {
                return;
            }
            sleep(StdDuration::from_millis(10)).await;
        }
        panic!("sale was never turned into a delivery");
    }

    #[test]
    fn cancellation_during_optimization_is_never_overwritten() {
        let (engine, _bus) = engine();
        let ids: Vec<Uuid> = (0..300)
            .map(|_| engine.create_delivery_order(sale_at(30.01, 31.21)).unwrap().id)
            .collect();

        let mut profile = profile_at(30.0, 31.2, 10.0);
        profile.vehicle_capacity = VehicleCapacity {
            weight: 10_000.0,
            volume: 100.0,
            packages: 500,
        };
        let driver = engine.register_driver(profile).unwrap();
        let pending = engine.get_pending_deliveries();
        assert_eq!(pending.len(), 300);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                engine
                    .optimize_routes(request(driver.clone(), pending.clone()))
                    .unwrap();
            });
            scope.spawn(|| {
                for id in ids.iter().rev() {
                    engine
                        .update_delivery_status(*id, DeliveryStatus::Cancelled, None)
                        .unwrap();
                }
            });
        });

        for id in &ids {
            let order = engine.get_delivery_order(*id).unwrap();
            assert_eq!(order.status, DeliveryStatus::Cancelled);
        }
        for route in engine.list_routes() {
            assert_eq!(route.status, RouteStatus::Cancelled);
        }
    }
}
