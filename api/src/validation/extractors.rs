//! Axum extractor that runs a request body through the validation pipeline
//!
//! `Validated<E>` replaces `Json<T>` on validated routes: the handler only
//! runs when every rule and hook of `E` passed, and receives the sanitized,
//! coerced fields. Rejections answer 422 with the field-keyed error bag.
//! Bodies are JSON objects or `multipart/form-data` (see [`super::uploads`]).

use std::{
    marker::PhantomData,
    net::{IpAddr, SocketAddr},
};

use axum::{
    async_trait,
    body::Bytes,
    extract::{connect_info::ConnectInfo, FromRequest, Multipart, Request},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{fields_from_json, ErrorBag, FieldMap, Identity, RequestContext, ValidationResult};
use uuid::Uuid;

use super::requests::EndpointKind;
use super::uploads;
use crate::error::ApiError;
use crate::state::AppState;

pub const INVALID_DATA_MESSAGE: &str = "The given data was invalid.";
const INVALID_MULTIPART_MESSAGE: &str = "The request body must be valid multipart form data.";

/// Validated request fields for endpoint `E`.
pub struct Validated<E> {
    pub fields: FieldMap,
    pub context: RequestContext,
    _kind: PhantomData<E>,
}

impl<E> Validated<E> {
    pub fn into_fields(self) -> FieldMap {
        self.fields
    }
}

#[derive(Debug, Serialize)]
pub struct ValidationErrorResponse<'a> {
    pub message: &'static str,
    pub errors: &'a ErrorBag,
}

/// 422 with `{message, errors}`, plus `Retry-After` when a limit tripped.
pub fn invalid_response(errors: &ErrorBag) -> Response {
    let body = ValidationErrorResponse {
        message: INVALID_DATA_MESSAGE,
        errors,
    };
    let mut response = (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
        headers.insert(header::HeaderName::from_static("x-correlation-id"), value);
    }
    if let Some(seconds) = errors.retry_after() {
        if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
            headers.insert(header::RETRY_AFTER, value);
        }
    }
    response
}

fn body_error(message: &str) -> Response {
    let mut errors = ErrorBag::new();
    errors.add("body", message);
    invalid_response(&errors)
}

/// An empty non-multipart body is an empty field map; anything else must be a
/// JSON object.
fn parse_body(bytes: &[u8]) -> Result<FieldMap, &'static str> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(FieldMap::new());
    }
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|_| "The request body must be valid JSON.")?;
    fields_from_json(value).ok_or("The request body must be a JSON object.")
}

pub fn request_context(request: &Request) -> RequestContext {
    let mut ctx = RequestContext::new(extract_client_ip(request))
        .with_route(request.method().as_str(), request.uri().path());

    if let Some(agent) = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
    {
        ctx = ctx.with_user_agent(agent);
    }
    if let Some(identity) = request.extensions().get::<Identity>() {
        ctx = ctx.with_identity(identity.clone());
    }
    ctx
}

#[async_trait]
impl<E> FromRequest<AppState> for Validated<E>
where
    E: EndpointKind,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let context = request_context(&req);

        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());

        let raw = if uploads::is_multipart(content_type) {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|_| body_error(INVALID_MULTIPART_MESSAGE))?;
            uploads::read_multipart(multipart).await.map_err(|e| {
                tracing::debug!(error = %e, "multipart body rejected");
                body_error(INVALID_MULTIPART_MESSAGE)
            })?
        } else {
            let bytes = Bytes::from_request(req, state)
                .await
                .map_err(|_| body_error("Failed to read request body"))?;
            parse_body(&bytes).map_err(body_error)?
        };

        match state.pipeline.run(&raw, E::spec(), &context).await {
            Ok(ValidationResult::Valid(fields)) => Ok(Self {
                fields,
                context,
                _kind: PhantomData,
            }),
            Ok(ValidationResult::Invalid(errors)) => Err(invalid_response(&errors)),
            Err(err) => Err(ApiError::from(err).into_response()),
        }
    }
}

pub fn extract_client_ip(request: &Request) -> String {
    client_ip_from_headers(request.headers())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|connect_info| connect_info.0.ip())
        })
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn client_ip_from_headers(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(parse_x_forwarded_for)
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .and_then(parse_ip_addr)
        })
}

fn parse_x_forwarded_for(raw: &str) -> Option<IpAddr> {
    raw.split(',').map(str::trim).find_map(parse_ip_addr)
}

fn parse_ip_addr(raw: &str) -> Option<IpAddr> {
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_parse_body_shapes() {
        assert!(parse_body(b"").unwrap().is_empty());
        assert!(parse_body(b"  \n").unwrap().is_empty());
        assert_eq!(parse_body(br#"{"a": 1}"#).unwrap().len(), 1);
        assert!(parse_body(b"[1, 2]").is_err());
        assert!(parse_body(b"{not json").is_err());
    }

    #[test]
    fn test_client_ip_precedence() {
        let request = Request::builder()
            .header("x-forwarded-for", "garbage, 203.0.113.5, 10.0.0.1")
            .header("x-real-ip", "198.51.100.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_client_ip(&request), "203.0.113.5");

        let request = Request::builder()
            .header("x-real-ip", "198.51.100.1:443")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_client_ip(&request), "198.51.100.1");

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_client_ip(&request), "unknown");
    }

    #[test]
    fn test_context_carries_route_and_identity() {
        let mut request = Request::builder()
            .method("POST")
            .uri("/api/auth/change-password?x=1")
            .header("user-agent", "curl/8.4")
            .header("x-real-ip", "192.0.2.9")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(Identity {
            id: 12,
            email: "jane@example.com".into(),
        });

        let ctx = request_context(&request);
        assert_eq!(ctx.method, "POST");
        assert_eq!(ctx.path, "/api/auth/change-password");
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8.4"));
        assert_eq!(ctx.identity.map(|i| i.id), Some(12));
    }

    #[test]
    fn test_invalid_response_sets_retry_after() {
        let mut errors = ErrorBag::new();
        errors.add("email", "Too many login attempts. Please try again in 30 seconds.");
        errors.set_retry_after(30);

        let response = invalid_response(&errors);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
        assert!(response.headers().contains_key("x-correlation-id"));
    }
}
