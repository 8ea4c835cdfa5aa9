use axum::{middleware, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::fanout;
use crate::identity::IdentitySecret;
use crate::presence;
use crate::router as message_router;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// GET /api/health — liveness probe.
async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "live_connections": state.registry.total_connections(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Inject the identity secret into request extensions so the Identity
/// extractor can find it.
async fn inject_identity_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(IdentitySecret(state.identity_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting on message submission: 1 message/second sustained per
    // IP with a burst of 10. Uses PeerIpKeyExtractor which reads from
    // ConnectInfo<SocketAddr>.
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(1)
            .burst_size(10)
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Spawn background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    // REST submit with rate limiting
    let message_routes = Router::new()
        .route(
            "/api/messages",
            axum::routing::post(message_router::submit_message),
        )
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Presence queries (identity token required via extractor)
    let presence_routes = Router::new()
        .route("/api/presence", axum::routing::get(presence::get_presence))
        .route(
            "/api/presence/{user_id}",
            axum::routing::get(presence::get_user_presence),
        );

    // Backend-to-backend: the persistence service's like handler reports
    // results here. Deploy on an internal network, not the public edge.
    let hub_routes = Router::new().route(
        "/api/hub/notify-like",
        axum::routing::post(fanout::notify_like_handler),
    );

    // WebSocket endpoint (auth via query param, not header)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/api/health", axum::routing::get(health_check));

    Router::new()
        .merge(message_routes)
        .merge(presence_routes)
        .merge(hub_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_identity_secret,
        ))
        .with_state(state)
}
