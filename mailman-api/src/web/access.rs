//! Source-address allowlist.
//!
//! Applied around the whole router: requests from peers outside the
//! allowlist get `403 FORBIDDEN` before any route is matched. Only the TCP
//! peer address is consulted; forwarding headers are ignored.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

/// Immutable set of peer addresses allowed to use the API.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ips: Arc<HashSet<IpAddr>>,
}

impl AllowList {
    pub fn new(ips: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            ips: Arc::new(ips.into_iter().map(|ip| ip.to_canonical()).collect()),
        }
    }

    /// Whether `ip` may reach the API. IPv4-mapped IPv6 peers match their
    /// IPv4 form.
    pub fn allows(&self, ip: IpAddr) -> bool {
        self.ips.contains(&ip.to_canonical())
    }

    pub fn len(&self) -> usize {
        self.ips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }
}

/// Reject requests whose peer address is not allowlisted.
pub async fn restrict_to_allowlist(
    State(allowlist): State<AllowList>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    match peer {
        Some(ip) if allowlist.allows(ip) => next.run(request).await,
        _ => {
            warn!(
                peer = ?peer,
                method = %request.method(),
                path = %request.uri().path(),
                "request_forbidden"
            );
            forbidden()
        }
    }
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        [(header::CONTENT_TYPE, "text/plain")],
        "FORBIDDEN",
    )
        .into_response()
}
