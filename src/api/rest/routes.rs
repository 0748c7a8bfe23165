use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::route::{
    DeliveryRoute, OptimizationGoals, RouteConstraints, RouteOptimizationRequest,
    RouteOptimizationResult, TimeWindow,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/routes", get(list_routes))
        .route("/routes/optimize", post(optimize_route))
        .route("/routes/sweep", post(sweep))
        .route("/routes/:id", get(get_route))
}

#[derive(Deserialize)]
pub struct OptimizeRouteRequest {
    pub driver_id: Uuid,
    /// Defaults to every pending delivery.
    pub order_ids: Option<Vec<Uuid>>,
    pub time_window: Option<TimeWindow>,
    #[serde(default)]
    pub constraints: RouteConstraints,
    #[serde(default)]
    pub optimization_goals: OptimizationGoals,
}

async fn optimize_route(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OptimizeRouteRequest>,
) -> Result<Json<RouteOptimizationResult>, AppError> {
    let driver = state
        .routing
        .get_driver(payload.driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", payload.driver_id)))?;

    let pending_orders = match payload.order_ids {
        Some(ids) => ids
            .into_iter()
            .map(|id| {
                state
                    .routing
                    .get_delivery_order(id)
                    .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => state.routing.get_pending_deliveries(),
    };

    let time_window = payload.time_window.unwrap_or_else(|| {
        let now = Utc::now();
        TimeWindow {
            start: now,
            end: now + Duration::hours(state.config.route_horizon_hours),
        }
    });

    let result = state.routing.optimize_routes(RouteOptimizationRequest {
        driver,
        pending_orders,
        time_window,
        constraints: payload.constraints,
        optimization_goals: payload.optimization_goals,
    })?;

    Ok(Json(result))
}

async fn sweep(State(state): State<Arc<AppState>>) -> Json<Vec<RouteOptimizationResult>> {
    Json(state.routing.optimize_pending_deliveries())
}

async fn list_routes(State(state): State<Arc<AppState>>) -> Json<Vec<DeliveryRoute>> {
    Json(state.routing.list_routes())
}

async fn get_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRoute>, AppError> {
    state
        .routing
        .get_route(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("route {id} not found")))
}
