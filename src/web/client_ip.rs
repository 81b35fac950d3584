//! Client address resolution
//!
//! `X-Forwarded-For` wins when present (its first entry is the original client),
//! otherwise the socket peer is used. Whatever comes out must parse as an IPv4 or
//! IPv6 literal; if it doesn't we fall back to the peer address and finally to
//! [`SENTINEL_IP`]. Resolution never fails.

use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, Request},
};
use std::net::{IpAddr, SocketAddr};

pub const SENTINEL_IP: &str = "0.0.0.0";

/// Resolved client address, attached to the request for later stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

fn is_ip_literal(candidate: &str) -> bool {
    candidate.parse::<IpAddr>().is_ok()
}

/// First comma-separated entry of `X-Forwarded-For`, trimmed.
/// `Some("")` when the header exists but is empty or not valid text.
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("x-forwarded-for")?;
    let first = value
        .to_str()
        .ok()
        .and_then(|ips| ips.split(',').next())
        .map(|ip| ip.trim().to_string())
        .unwrap_or_default();
    Some(first)
}

pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let peer_ip = peer.map(|addr| addr.ip().to_canonical().to_string());

    let candidate = forwarded_for(headers).or_else(|| peer_ip.clone());
    if let Some(ip) = candidate.filter(|c| is_ip_literal(c)) {
        return ip;
    }

    peer_ip
        .filter(|p| is_ip_literal(p))
        .unwrap_or_else(|| SENTINEL_IP.to_string())
}

/// Resolve using the connection info axum attached to the request, if any
pub fn resolve_from_request<B>(request: &Request<B>) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    resolve_client_ip(request.headers(), peer)
}
