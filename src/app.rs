use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tower_cookies::CookieManagerLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::{handlers, middleware_layer, state::AppState};

/// Largest request body any endpoint accepts.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Builds every route of the service.
///
/// Transport concerns that need a real socket (rate limiting by peer,
/// CORS) are layered on by the binary.
pub fn router(state: AppState) -> Router {
    let loader_routes = Router::new()
        .route("/loader/prehandshake", post(handlers::loader::prehandshake))
        .route("/loader/heartbeat", post(handlers::loader::heartbeat))
        .route("/loader/auth", post(handlers::loader::auth))
        .with_state(state.clone());

    let webhook_routes = Router::new()
        .route("/nowpayments/ipn", post(handlers::payments::nowpayments_ipn))
        .route("/health", get(handlers::health::health))
        .with_state(state.clone());

    let user_routes = Router::new()
        .route("/payments/create", post(handlers::payments::create_payment))
        .route(
            "/account/subscriptions",
            get(handlers::payments::account_subscriptions),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_user,
        ))
        .with_state(state.clone());

    let support_routes = Router::new()
        .route("/support/keys/info", post(handlers::support::key_info))
        .route("/support/users/security", post(handlers::support::user_security))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_support,
        ))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route(
            "/admin/loader-build/register",
            post(handlers::admin::register_build),
        )
        .route("/admin/reconcile", post(handlers::admin::reconcile))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_admin,
        ))
        .with_state(state);

    Router::new()
        .merge(loader_routes)
        .merge(webhook_routes)
        .merge(user_routes)
        .merge(support_routes)
        .merge(admin_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
