//! API routes

use axum::{
    http::HeaderName,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use super::handlers::{self, AppState, REQUEST_ID_HEADER};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        // Probes
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))

        // Alert intake
        .route("/oneview-webhook", post(handlers::oneview_webhook))
        .route("/force-poll", post(handlers::force_poll))
        .route("/test-connection", get(handlers::test_connection))

        // Observability
        .route("/metrics", get(handlers::render_metrics))

        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .with_state(state)
}
