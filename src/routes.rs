use axum::{middleware, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::aid::{needs, offers};
use crate::auth::middleware::JwtSecret;
use crate::auth::register;
use crate::chat::{conversations, messages};
use crate::matching::coordinator;
use crate::notify::{announce, crud as notification_crud};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting: 5 requests per minute per IP on auth endpoints
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(12) // 1 token every 12 seconds = 5 per minute
            .burst_size(5)
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Spawn background task to clean up rate limiter state
    let limiter_for_cleanup = governor_limiter.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            limiter_for_cleanup.retain_recent();
        }
    });

    let auth_routes = Router::new()
        .route("/api/auth/register", axum::routing::post(register::register))
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Needs and offers (JWT required — Claims extractor validates token)
    let aid_routes = Router::new()
        .route("/api/needs", axum::routing::post(needs::create_need))
        .route("/api/needs/{id}", axum::routing::get(needs::get_need))
        .route("/api/offers", axum::routing::post(offers::create_offer))
        .route("/api/offers/{id}", axum::routing::get(offers::get_offer));

    let match_routes = Router::new()
        .route("/api/matches", axum::routing::post(coordinator::propose))
        .route("/api/matches", axum::routing::get(coordinator::list))
        .route("/api/matches/{id}", axum::routing::get(coordinator::get))
        .route(
            "/api/matches/{id}/status",
            axum::routing::post(coordinator::transition),
        )
        .route(
            "/api/matches/{id}",
            axum::routing::delete(coordinator::withdraw),
        );

    let conversation_routes = Router::new()
        .route(
            "/api/conversations",
            axum::routing::post(conversations::create_conversation),
        )
        .route(
            "/api/conversations",
            axum::routing::get(conversations::list_conversations),
        )
        .route(
            "/api/conversations/{id}",
            axum::routing::get(conversations::get_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            axum::routing::post(messages::send_message),
        )
        .route(
            "/api/conversations/{id}/messages",
            axum::routing::get(messages::get_messages),
        )
        .route(
            "/api/conversations/{id}/read",
            axum::routing::post(messages::mark_conversation_read),
        )
        .route(
            "/api/messages/unread-count",
            axum::routing::get(messages::unread_count),
        );

    let notification_routes = Router::new()
        .route(
            "/api/notifications",
            axum::routing::get(notification_crud::list_notifications),
        )
        .route(
            "/api/notifications/unread-count",
            axum::routing::get(notification_crud::unread_count),
        )
        .route(
            "/api/notifications/read-all",
            axum::routing::post(notification_crud::mark_all_read),
        )
        .route(
            "/api/notifications/{id}/read",
            axum::routing::post(notification_crud::mark_read),
        )
        .route(
            "/api/notifications/{id}/action",
            axum::routing::post(notification_crud::mark_action_taken),
        )
        .route(
            "/api/notifications/{id}",
            axum::routing::delete(notification_crud::delete_notification),
        );

    let announcement_routes = Router::new().route(
        "/api/announcements",
        axum::routing::post(announce::publish_announcement),
    );

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(auth_routes)
        .merge(aid_routes)
        .merge(match_routes)
        .merge(conversation_routes)
        .merge(notification_routes)
        .merge(announcement_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
