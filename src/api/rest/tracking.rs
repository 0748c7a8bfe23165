use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::tracking::{
    CustomerTrackingSession, DeliveryTracking, EtaPrediction, RealTimeDashboard,
    SessionPreferences, TrackingUpdate,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tracking/dashboard", get(dashboard))
        .route("/tracking/:id", get(get_tracking))
        .route("/tracking/:id/eta", get(get_eta))
        .route("/tracking/:id/history", get(get_history))
        .route("/tracking/:id/sessions", post(create_session))
        .route(
            "/tracking/sessions/:session_id",
            get(view_session).patch(update_preferences),
        )
        .route("/tracking/sessions/:session_id/share", post(share_session))
        .route("/track/:id", get(get_tracking))
}

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub customer_id: String,
    pub preferred_language: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Serialize)]
pub struct ShareResponse {
    pub session: CustomerTrackingSession,
    pub shareable_link: String,
}

fn session_not_found(session_id: Uuid) -> AppError {
    AppError::NotFound(format!("tracking session {session_id} not found"))
}

async fn dashboard(State(state): State<Arc<AppState>>) -> Json<RealTimeDashboard> {
    Json(state.tracking.get_dashboard())
}

async fn get_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryTracking>, AppError> {
    state
        .tracking
        .get_tracking(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no tracking for delivery {id}")))
}

async fn get_eta(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<EtaPrediction>, AppError> {
    state
        .tracking
        .get_eta_prediction(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no eta for delivery {id}")))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<Vec<TrackingUpdate>> {
    Json(state.tracking.get_tracking_history(id))
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CustomerTrackingSession>), AppError> {
    if payload.customer_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "customer_id cannot be empty".to_string(),
        ));
    }

    let session = state.tracking.create_tracking_session(
        id,
        payload.customer_id,
        payload.preferred_language,
        payload.timezone,
    );
    Ok((StatusCode::CREATED, Json(session)))
}

async fn view_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<CustomerTrackingSession>, AppError> {
    state
        .tracking
        .record_view(session_id)
        .map(Json)
        .ok_or_else(|| session_not_found(session_id))
}

async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<SessionPreferences>,
) -> Result<Json<CustomerTrackingSession>, AppError> {
    state
        .tracking
        .update_preferences(session_id, payload)
        .map(Json)
        .ok_or_else(|| session_not_found(session_id))
}

async fn share_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ShareResponse>, AppError> {
    let session = state
        .tracking
        .record_share(session_id)
        .ok_or_else(|| session_not_found(session_id))?;
    let shareable_link = state.tracking.shareable_link(session.delivery_id);

    Ok(Json(ShareResponse {
        session,
        shareable_link,
    }))
}
