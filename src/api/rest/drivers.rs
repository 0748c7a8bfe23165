use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{DeliveryDriver, DriverProfile, DriverStatus};
use crate::models::event::DeliveryEvent;
use crate::models::location::{DriverPosition, GeoPoint};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver).get(list_drivers))
        .route("/drivers/available", get(available_drivers))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/status", patch(update_driver_status))
        .route("/drivers/:id/location", patch(update_driver_location))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DriverProfile>,
) -> Result<(StatusCode, Json<DeliveryDriver>), AppError> {
    let driver = state.routing.register_driver(payload)?;
    Ok((StatusCode::CREATED, Json(driver)))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<DeliveryDriver>> {
    Json(state.routing.list_drivers())
}

async fn available_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<DeliveryDriver>> {
    Json(state.routing.get_available_drivers())
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryDriver>, AppError> {
    state
        .routing
        .get_driver(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<DeliveryDriver>, AppError> {
    state
        .routing
        .update_driver_status(id, payload.status)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))
}

/// Accepted fixes go onto the bus so routing and tracking both see them.
async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<(StatusCode, Json<DriverPosition>), AppError> {
    let point = GeoPoint {
        lat: payload.lat,
        lng: payload.lng,
    };
    if !point.is_valid() {
        return Err(AppError::BadRequest(format!(
            "invalid coordinates ({}, {})",
            payload.lat, payload.lng
        )));
    }
    if state.routing.get_driver(id).is_none() {
        return Err(AppError::NotFound(format!("driver {id} not found")));
    }

    let location = DriverPosition {
        lat: payload.lat,
        lng: payload.lng,
        timestamp: payload.timestamp.unwrap_or_else(Utc::now),
        accuracy: payload.accuracy.unwrap_or(10.0),
    };
    state.bus.publish(DeliveryEvent::DriverLocationUpdate {
        driver_id: id,
        location,
    });

    Ok((StatusCode::ACCEPTED, Json(location)))
}
