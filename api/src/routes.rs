use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::{auth_middleware, handlers, metrics_handler, state::AppState};

/// Room for a 2 MiB avatar plus the other form parts.
const PROFILE_BODY_LIMIT: usize = 4 * 1024 * 1024;

pub fn observability_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(metrics_handler::metrics_endpoint))
}

pub fn auth_routes() -> Router<AppState> {
    let authenticated = Router::new()
        .route("/api/auth/change-password", post(handlers::change_password))
        .route(
            "/api/auth/update-profile",
            post(handlers::update_profile).layer(DefaultBodyLimit::max(PROFILE_BODY_LIMIT)),
        )
        .route_layer(middleware::from_fn(auth_middleware::require_identity));

    Router::new()
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/reset-password", post(handlers::reset_password))
        .merge(authenticated)
}

pub fn edamam_routes() -> Router<AppState> {
    Router::new()
        .route("/api/edamam/food-search", post(handlers::food_search))
        .route("/api/edamam/nutrition-analysis", post(handlers::nutrition_analysis))
        .route("/api/edamam/recipe-search", post(handlers::recipe_search))
}

/// Every route with the 404 fallback; layers and state are added by the caller.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth_routes())
        .merge(edamam_routes())
        .merge(observability_routes())
        .fallback(handlers::route_not_found)
}
