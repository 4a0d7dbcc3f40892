//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

/// Headroom over the archive limit for multipart boundaries and headers.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state
        .config
        .server
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD);
    let upload_limit = usize::try_from(upload_limit).unwrap_or(usize::MAX);

    let mut router = Router::new()
        // Auth discovery
        .route("/v1/auth/whoami", get(handlers::whoami))
        // Health check (unauthenticated for load balancers)
        .route("/v1/health", get(handlers::health_check))
        // Sites
        .route(
            "/v1/sites",
            post(handlers::upload_site)
                .get(handlers::list_sites)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/v1/sites/{identifier}",
            get(handlers::get_site)
                .patch(handlers::rename_site)
                .delete(handlers::delete_site),
        )
        // Admin endpoints (all require the sites:admin scope)
        .route("/v1/admin/users", post(handlers::create_user))
        .route("/v1/admin/users/{user_id}", delete(handlers::delete_user))
        .route("/v1/admin/tokens", post(handlers::create_token));

    // The metrics endpoint is unauthenticated; see crate::metrics.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    // Middleware layers are applied in reverse order (outermost first).
    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
