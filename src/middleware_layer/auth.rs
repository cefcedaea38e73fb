use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{models::auth::AuthContext, state::AppState};

use redis::AsyncCommands;

/// Extracts the auth session token from the request cookies.
///
/// # Arguments
///
/// * `cookies` - The request cookies.
///
/// # Returns
///
/// An `Option` containing the auth session ID if found.
fn extract_session_token(cookies: &Cookies) -> Option<Uuid> {
    cookies
        .get("session_id")
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

/// A middleware that requires an authenticated caller.
///
/// The account service writes an `AuthContext` JSON into Redis at login; this
/// core only reads it and injects the context as a request extension.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `cookies` - The request cookies.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response` or an error `StatusCode`.
pub async fn require_auth(
    State(mut state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    tracing::debug!("🔐 Checking authentication...");

    let session_id = extract_session_token(&cookies)
        .ok_or_else(|| {
            tracing::warn!("❌ No session_id cookie found");
            StatusCode::FORBIDDEN
        })?;

    tracing::debug!("🔑 Found session_id: {}", session_id);

    let auth_json: String = state
        .redis
        .get(format!("auth:{}", session_id))
        .await
        .map_err(|e| {
            tracing::warn!("❌ Redis error or auth session not found: {}", e);
            StatusCode::FORBIDDEN
        })?;

    let auth: AuthContext = sonic_rs::from_str(&auth_json)
        .map_err(|e| {
            tracing::warn!("❌ Invalid auth session JSON: {}", e);
            StatusCode::FORBIDDEN
        })?;

    if chrono::Utc::now() > auth.expires_at {
        tracing::warn!("❌ Auth session expired for user: {}", auth.user_id);

        let _: () = state
            .redis
            .del(format!("auth:{}", session_id))
            .await
            .unwrap_or(());

        return Err(StatusCode::FORBIDDEN);
    }

    tracing::debug!("✅ User authenticated: {} ({})", auth.user_id, auth.role);

    request.extensions_mut().insert(auth);

    Ok(next.run(request).await)
}
