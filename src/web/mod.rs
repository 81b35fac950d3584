//! Web server module

pub mod client_ip;
pub mod identity;
pub mod interceptor;
pub mod rate_limit;
mod routes;

use anyhow::Result;
use axum::{middleware, routing::get, Router};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Config, RateLimitConfig};
use identity::TokenTable;
use interceptor::{InterceptLayer, Interceptor};
use rate_limit::RateLimitStage;

/// The two rate limited scopes of the application
#[derive(Clone)]
pub struct RateLimits {
    pub anonymous: Arc<RateLimitStage>,
    pub authenticated: Arc<RateLimitStage>,
}

impl RateLimits {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            anonymous: Arc::new(RateLimitStage::new(
                "anonymous",
                &config.anonymous,
                rate_limit::by_client_ip,
            )),
            authenticated: Arc::new(RateLimitStage::new(
                "authenticated",
                &config.authenticated,
                rate_limit::by_identity,
            )),
        }
    }
}

/// Build the application with the interception pipeline in front of every route.
///
/// Layer order, outermost first: tracing, interceptor (IP, blocklist, logging),
/// identity, then per-route rate limits.
pub fn app(interceptor: Arc<Interceptor>, limits: RateLimits, tokens: Arc<TokenTable>) -> Router {
    let sensitive = Router::new()
        .route(
            "/sensitive/",
            get(routes::sensitive_info).post(routes::sensitive_submit),
        )
        .route_layer(middleware::from_fn_with_state(
            limits.anonymous.clone(),
            rate_limit::enforce,
        ));

    let auth_sensitive = Router::new()
        .route(
            "/auth-sensitive/",
            get(routes::auth_sensitive_info).post(routes::auth_sensitive_submit),
        )
        .route_layer(middleware::from_fn_with_state(
            limits.authenticated.clone(),
            rate_limit::enforce,
        ));

    Router::new()
        .route("/", get(routes::index))
        .merge(sensitive)
        .merge(auth_sensitive)
        .fallback(routes::not_found)
        .layer(middleware::from_fn_with_state(tokens, identity::authenticate))
        .layer(InterceptLayer::new(interceptor))
        .layer(TraceLayer::new_for_http())
}

/// Periodically drop rate limit counters from finished windows
pub fn start_background_tasks(limits: RateLimits) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            limits.anonymous.limiter().cleanup();
            limits.authenticated.limiter().cleanup();
        }
    });
}

pub async fn start_server(config: &Config, interceptor: Arc<Interceptor>) -> Result<()> {
    let limits = RateLimits::from_config(&config.rate_limit);
    let tokens = Arc::new(TokenTable::from_users(&config.auth.users));

    start_background_tasks(limits.clone());

    let app = app(interceptor, limits, tokens);

    let addr = format!("{}:{}", config.server.host, config.server.http_port);
    info!("Web server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
