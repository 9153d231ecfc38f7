use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use shared::FieldMap;

use crate::audit::redact;
use crate::state::AppState;
use crate::validation::extractors::Validated;
use crate::validation::requests::{
    is_recipe_detail_request, pagination_params, recipe_api_params, ChangePasswordRequest,
    FoodSearchRequest, LoginRequest, NutritionAnalysisRequest, PasswordResetRequest,
    RecipeSearchRequest, RegisterRequest, UpdateProfileRequest,
};

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let uptime = state.started_at.elapsed().as_secs();
    let now = chrono::Utc::now().to_rfc3339();

    tracing::info!(uptime_secs = uptime, "health check passed");
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": now,
            "uptime_secs": uptime
        })),
    )
}

/// Validated fields go back to the caller with secrets masked; the
/// downstream action is performed by the service behind this one.
fn accepted(endpoint: &str, fields: &FieldMap) -> Json<Value> {
    Json(json!({
        "status": "validated",
        "endpoint": endpoint,
        "data": redact(fields),
    }))
}

pub async fn login(request: Validated<LoginRequest>) -> Json<Value> {
    accepted("login", &request.fields)
}

pub async fn register(request: Validated<RegisterRequest>) -> Json<Value> {
    accepted("register", &request.fields)
}

pub async fn reset_password(request: Validated<PasswordResetRequest>) -> Json<Value> {
    accepted("password_reset", &request.fields)
}

pub async fn change_password(request: Validated<ChangePasswordRequest>) -> Json<Value> {
    if let Some(identity) = &request.context.identity {
        tracing::info!(user_id = identity.id, "password change validated");
    }
    accepted("change_password", &request.fields)
}

pub async fn update_profile(request: Validated<UpdateProfileRequest>) -> Json<Value> {
    accepted("update_profile", &request.fields)
}

pub async fn food_search(request: Validated<FoodSearchRequest>) -> Json<Value> {
    accepted("food_search", &request.fields)
}

pub async fn nutrition_analysis(request: Validated<NutritionAnalysisRequest>) -> Json<Value> {
    accepted("nutrition_analysis", &request.fields)
}

pub async fn recipe_search(request: Validated<RecipeSearchRequest>) -> Json<Value> {
    let fields = request.into_fields();
    let (from, to) = pagination_params(&fields);
    Json(json!({
        "status": "validated",
        "endpoint": "recipe_search",
        "detail": is_recipe_detail_request(&fields),
        "pagination": { "from": from, "to": to },
        "data": recipe_api_params(&fields),
    }))
}

pub async fn route_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Route not found"})))
}
