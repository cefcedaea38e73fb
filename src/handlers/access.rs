use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::{
    error::Result,
    models::auth::AuthContext,
    services::access as access_service,
    state::AppState,
};

/// Handles a room-access request for a session.
///
/// Any authenticated caller may ask; the privilege resolver decides. On
/// success the response carries the room id, the caller's room-scoped
/// subject id, a short-lived signed token, and the caller's role and display
/// name for the participant list.
#[axum::debug_handler]
pub async fn request_access(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    tracing::info!(
        "🎫 Access token request for session {} by {} ({})",
        session_id,
        auth.user_id,
        auth.role
    );

    let access = access_service::request_access(&state, &auth, session_id).await?;

    Ok((StatusCode::OK, Json(access)).into_response())
}
