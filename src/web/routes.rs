//! Application routes behind the interception pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;

use super::client_ip::ClientIp;
use super::identity::Identity;
use super::rate_limit::RateLimited;

/// Over budget on a stage that lets the request through
fn is_rate_limited(marker: &Option<Extension<RateLimited>>) -> bool {
    marker.is_some()
}

pub async fn index() -> &'static str {
    "ok"
}

/// Anonymous sensitive endpoint (limited per client address)
pub async fn sensitive_info(
    rate_limited: Option<Extension<RateLimited>>,
) -> Json<serde_json::Value> {
    Json(json!({
        "status": "info",
        "message": "This is a sensitive endpoint. Please be gentle with your requests.",
        "rate_limit": "5 requests per minute for anonymous users",
        "rate_limited": is_rate_limited(&rate_limited),
    }))
}

pub async fn sensitive_submit(
    client_ip: Option<Extension<ClientIp>>,
    rate_limited: Option<Extension<RateLimited>>,
) -> Json<serde_json::Value> {
    Json(json!({
        "status": "success",
        "message": "Request processed successfully",
        "ip": client_ip.map(|Extension(ClientIp(ip))| ip),
        "rate_limited": is_rate_limited(&rate_limited),
    }))
}

fn authentication_required() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "status": "error",
            "message": "Authentication required",
        })),
    )
        .into_response()
}

/// Authenticated sensitive endpoint (limited per identity)
pub async fn auth_sensitive_info(
    identity: Option<Extension<Identity>>,
    rate_limited: Option<Extension<RateLimited>>,
) -> Response {
    let Some(Extension(Identity(user))) = identity else {
        return authentication_required();
    };

    Json(json!({
        "status": "info",
        "message": "This is a sensitive endpoint for authenticated users.",
        "rate_limit": "10 requests per minute for authenticated users",
        "user": user,
        "rate_limited": is_rate_limited(&rate_limited),
    }))
    .into_response()
}

pub async fn auth_sensitive_submit(
    identity: Option<Extension<Identity>>,
    client_ip: Option<Extension<ClientIp>>,
    rate_limited: Option<Extension<RateLimited>>,
) -> Response {
    let Some(Extension(Identity(user))) = identity else {
        return authentication_required();
    };

    Json(json!({
        "status": "success",
        "message": "Authenticated request processed successfully",
        "user": user,
        "ip": client_ip.map(|Extension(ClientIp(ip))| ip),
        "rate_limited": is_rate_limited(&rate_limited),
    }))
    .into_response()
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
