//! Request interception middleware
//!
//! Every request goes through: resolve client IP -> blocklist check -> inner
//! service -> geolocation -> request log. A blocked address gets a 403 and the
//! inner service never runs. Geolocation and logging happen in a spawned task
//! after the inner response is available, so neither can delay or change it.
//! The only internal failure a client can observe is a blocklist store error,
//! which fails closed with a 500.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{debug, error, info};

use super::client_ip::{self, ClientIp};
use crate::blocklist::BlocklistGate;
use crate::db::{LogSender, RequestLogEntry};
use crate::error::PersistError;
use crate::geo::GeoLocationCache;

pub const FORBIDDEN_BODY: &str = "Forbidden: your IP address has been blocked";

/// Shared per-process pipeline state
pub struct Interceptor {
    gate: BlocklistGate,
    geo: GeoLocationCache,
    log_tx: LogSender,
}

impl Interceptor {
    pub fn new(gate: BlocklistGate, geo: GeoLocationCache, log_tx: LogSender) -> Self {
        Self { gate, geo, log_tx }
    }

    /// Enrich with geolocation and queue the log entry. Never fails outward.
    async fn record(&self, ip: String, path: String) {
        let entry = RequestLogEntry::new(ip, path);

        let geo = self.geo.resolve(&entry.ip_address).await;
        let entry = match geo.location() {
            Some(loc) => entry.with_geo(loc.country.clone(), loc.city.clone(), loc.region.clone()),
            None => entry,
        };

        if let Err(e) = self.queue(entry) {
            debug!("{}", e);
        }
    }

    fn queue(&self, entry: RequestLogEntry) -> Result<(), PersistError> {
        self.log_tx.send(entry).map_err(|e| {
            PersistError::Log(anyhow::anyhow!(
                "log buffer closed, dropped entry for {}",
                e.0.ip_address
            ))
        })
    }
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, FORBIDDEN_BODY).into_response()
}

fn block_check_failed() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

/// Layer for the request interception pipeline
#[derive(Clone)]
pub struct InterceptLayer {
    interceptor: Arc<Interceptor>,
}

impl InterceptLayer {
    pub fn new(interceptor: Arc<Interceptor>) -> Self {
        Self { interceptor }
    }
}

impl<S> Layer<S> for InterceptLayer {
    type Service = InterceptService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InterceptService {
            inner,
            interceptor: self.interceptor.clone(),
        }
    }
}

/// Middleware service running the interception pipeline
#[derive(Clone)]
pub struct InterceptService<S> {
    inner: S,
    interceptor: Arc<Interceptor>,
}

impl<S> Service<Request<Body>> for InterceptService<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let interceptor = self.interceptor.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let ip = client_ip::resolve_from_request(&request);
            let path = request.uri().path().to_string();

            match interceptor.gate.is_blocked(&ip).await {
                Ok(false) => {}
                Ok(true) => {
                    info!(ip = %ip, path = %path, "Rejected blocked address");
                    return Ok(forbidden());
                }
                Err(e) => {
                    error!("{}", e);
                    return Ok(block_check_failed());
                }
            }

            request.extensions_mut().insert(ClientIp(ip.clone()));
            let response = inner.call(request).await?;

            // Fire and forget: the response goes out without waiting on this
            tokio::spawn(async move {
                interceptor.record(ip, path).await;
            });

            Ok(response)
        })
    }
}
