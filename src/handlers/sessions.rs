use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::auth::{AuthContext, Role},
    models::session::{SessionPatch, SessionStatus},
    services::sessions as session_service,
    state::AppState,
    validation::sessions::*,
};

/// The request payload for aggregating bookings into a session.
#[derive(Deserialize, Debug)]
pub struct CreateSessionRequest {
    pub booking_ids: Vec<Uuid>,
    pub title: Option<String>,
    pub scheduled_date: DateTime<Utc>,
    pub duration_minutes: i32,
    pub max_students: i32,
    pub language: Option<String>,
    pub level: Option<String>,
}

/// The request payload for a generic status change.
#[derive(Deserialize, Debug)]
pub struct ChangeStatusRequest {
    pub status: SessionStatus,
}

/// Handles session creation (aggregation). Trainers only.
#[axum::debug_handler]
pub async fn create_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse> {
    tracing::info!(
        "📦 Create session attempt by {} with {} booking(s)",
        auth.user_id,
        payload.booking_ids.len()
    );

    if auth.role != Role::Trainer {
        return Err(AppError::AccessDenied);
    }

    validate_booking_ids(&payload.booking_ids)?;
    validate_schedule(payload.duration_minutes, payload.max_students)?;
    validate_title(payload.title.as_deref())?;

    let session = session_service::create_session(
        &state,
        &auth,
        session_service::CreateSessionRequest {
            booking_ids: payload.booking_ids,
            title: payload.title,
            scheduled_date: payload.scheduled_date,
            duration_minutes: payload.duration_minutes,
            max_students: payload.max_students,
            language: payload.language,
            level: payload.level,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(session)).into_response())
}

/// Handles a generic status change. Owner or admin.
#[axum::debug_handler]
pub async fn change_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<ChangeStatusRequest>,
) -> Result<Response> {
    tracing::info!(
        "🔄 Status change for session {} to {} by {}",
        session_id,
        payload.status,
        auth.user_id
    );

    let session =
        session_service::change_status(&state, &auth, session_id, payload.status).await?;

    Ok((StatusCode::OK, Json(session)).into_response())
}

/// Handles the dedicated force-end operation. Owner or admin.
#[axum::debug_handler]
pub async fn end_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    tracing::info!("🏁 End session {} by {}", session_id, auth.user_id);

    let session = session_service::end_session(&state, &auth, session_id).await?;

    Ok((StatusCode::OK, Json(session)).into_response())
}

/// Handles a bounded field patch. Owner or admin.
#[axum::debug_handler]
pub async fn patch_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
    Json(patch): Json<SessionPatch>,
) -> Result<Response> {
    tracing::info!("✏️ Patch session {} by {}", session_id, auth.user_id);

    validate_patch(&patch)?;

    let session = session_service::patch_session(&state, &auth, session_id, patch).await?;

    Ok((StatusCode::OK, Json(session)).into_response())
}

/// Handles a session metadata read. Owner, enrolled student, or admin.
#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let session = session_service::get_session(&state, &auth, session_id).await?;

    Ok((StatusCode::OK, Json(session)).into_response())
}
