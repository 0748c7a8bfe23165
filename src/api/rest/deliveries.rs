use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::DeliveryEvent;
use crate::models::order::{DeliveryOrder, DeliveryStatistics, DeliveryStatus, StatusMetadata};
use crate::models::sale::SaleOrder;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery))
        .route("/deliveries/pending", get(pending_deliveries))
        .route("/deliveries/stats", get(delivery_statistics))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/status", patch(update_delivery_status))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DeliveryStatus,
    pub metadata: Option<StatusMetadata>,
}

#[derive(Serialize)]
pub struct StatusAccepted {
    pub delivery_id: Uuid,
    pub status: DeliveryStatus,
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SaleOrder>,
) -> Result<(StatusCode, Json<DeliveryOrder>), AppError> {
    let order = state.routing.create_delivery_order(payload)?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn pending_deliveries(State(state): State<Arc<AppState>>) -> Json<Vec<DeliveryOrder>> {
    Json(state.routing.get_pending_deliveries())
}

async fn delivery_statistics(State(state): State<Arc<AppState>>) -> Json<DeliveryStatistics> {
    Json(state.routing.get_delivery_statistics())
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryOrder>, AppError> {
    state
        .routing
        .get_delivery_order(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))
}

/// Checked against the current status, then handed to the engines over the
/// bus. The engines apply it asynchronously.
async fn update_delivery_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<(StatusCode, Json<StatusAccepted>), AppError> {
    let order = state
        .routing
        .get_delivery_order(id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;

    if !order.status.can_transition_to(payload.status) {
        return Err(AppError::Conflict(format!(
            "delivery {id} cannot move from {} to {}",
            order.status, payload.status
        )));
    }

    state.bus.publish(DeliveryEvent::DeliveryStatusUpdate {
        delivery_id: id,
        status: payload.status,
        metadata: payload.metadata,
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StatusAccepted {
            delivery_id: id,
            status: payload.status,
        }),
    ))
}
