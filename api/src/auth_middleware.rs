use axum::{extract::Request, middleware::Next, response::IntoResponse, response::Response};
use shared::Identity;

use crate::error::ApiError;

/// Header set by the authenticating gateway with the caller's numeric id.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Requires an authenticated caller and exposes it as an [`Identity`]
/// request extension. Session handling lives in front of this service.
pub async fn require_identity(mut request: Request, next: Next) -> Response {
    let Some(identity) = identity_from_headers(&request) else {
        return ApiError::unauthorized("authentication required").into_response();
    };

    tracing::debug!(user_id = identity.id, "authenticated request");
    request.extensions_mut().insert(identity);
    next.run(request).await
}

fn identity_from_headers(request: &Request) -> Option<Identity> {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let id = header(USER_ID_HEADER)?.parse::<i64>().ok()?;
    let email = header(USER_EMAIL_HEADER).unwrap_or_default().to_string();
    Some(Identity { id, email })
}
