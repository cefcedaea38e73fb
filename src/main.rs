use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};

use http::{Method, header};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod state;
mod db;
mod crypto {
    pub mod room_token;
}

mod models {
    pub mod auth;
    pub mod booking;
    pub mod session;
}

mod repositories {
    pub mod booking;
    pub mod session;
    pub mod stats;
}

mod services {
    pub mod access;
    pub mod privileges;
    pub mod sessions;
}

mod handlers {
    pub mod access;
    pub mod sessions;
}

mod middleware_layer {
    pub mod auth;
}

mod validation {
    pub mod sessions;
}

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    match db::run_migrations(&state.db).await {
        Ok(()) => {
            tracing::info!("✅ Database migrations applied");
        }
        Err(e) => {
            tracing::error!("❌ Failed to run migrations: {}", e);
            return Err(e.into());
        }
    }

    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:3000".parse().unwrap(),
            "http://127.0.0.1:3000".parse().unwrap(),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::COOKIE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    let token_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(30)
            .use_headers()
            .finish()
            .unwrap(),
    );

    let session_routes = Router::new()
        .route("/api/sessions", post(handlers::sessions::create_session))
        .route(
            "/api/sessions/{session_id}",
            get(handlers::sessions::get_session).patch(handlers::sessions::patch_session),
        )
        .route(
            "/api/sessions/{session_id}/status",
            put(handlers::sessions::change_status),
        )
        .route(
            "/api/sessions/{session_id}/end",
            put(handlers::sessions::end_session),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    let token_routes = Router::new()
        .route(
            "/api/sessions/{session_id}/access-token",
            post(handlers::access::request_access),
        )
        .layer(tower_governor::GovernorLayer::new(token_governor_conf.clone()))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    let app = Router::new()
        .merge(session_routes)
        .merge(token_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(cors);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("🚀 Server listening on http://{}", addr);
    tracing::info!("✅ All systems operational");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
