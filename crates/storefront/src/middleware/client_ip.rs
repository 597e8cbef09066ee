//! Client IP resolution behind Cloudflare and Fly.io.
//!
//! The first of these that holds a parseable address wins:
//! `CF-Connecting-IP`, the first `X-Forwarded-For` entry, `X-Real-IP`,
//! `Fly-Client-IP`, then the socket peer. Requests with none of them are
//! keyed as `unknown`.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};

/// Key used when no address can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the client address from proxy headers, then the peer address.
#[must_use]
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let header_ip = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    };

    header_ip("cf-connecting-ip")
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        })
        .or_else(|| header_ip("x-real-ip"))
        .or_else(|| header_ip("fly-client-ip"))
        .or_else(|| peer.map(|addr| addr.ip()))
}

/// The requesting client's address as a rate-limit key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIp(pub String);

impl ClientIp {
    #[must_use]
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        Self(
            resolve_client_ip(headers, peer)
                .map_or_else(|| UNKNOWN_CLIENT.to_string(), |ip| ip.to_string()),
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientIp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::from_parts(&parts.headers, peer))
    }
}
