//! Read-only view of an inbound request.

use axum::{
    extract::{ConnectInfo, MatchedPath, Request},
    http::{header, HeaderMap},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::auth::Principal;

pub const UNMATCHED_HANDLER: &str = "unmatched";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub method: String,
    /// Path including the query string.
    pub path: String,
    pub client_ip: IpAddr,
    pub user_agent: String,
    pub principal: Option<Principal>,
    pub handler: String,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            client_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            user_agent: String::new(),
            principal: None,
            handler: UNMATCHED_HANDLER.to_string(),
        }
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = ip;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_principal(mut self, principal: Option<Principal>) -> Self {
        self.principal = principal;
        self
    }

    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = handler.into();
        self
    }

    /// Captures the context of an axum request. The principal is whatever an
    /// outer resolution layer stored in the extensions.
    pub fn from_request(request: &Request, trust_forwarded_for: bool) -> Self {
        let path = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());

        let handler = request
            .extensions()
            .get::<MatchedPath>()
            .map(|mp| mp.as_str().to_string())
            .unwrap_or_else(|| UNMATCHED_HANDLER.to_string());

        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Self {
            method: request.method().as_str().to_string(),
            path,
            client_ip: client_ip(request, trust_forwarded_for),
            user_agent,
            principal: request.extensions().get::<Principal>().cloned(),
            handler,
        }
    }
}

/// Client address of a request: the first `X-Forwarded-For` entry when
/// trusted, else the connection peer, else `0.0.0.0`. Shared with the rate
/// limiter so both key on the same address.
pub fn client_ip(request: &Request, trust_forwarded_for: bool) -> IpAddr {
    let forwarded = if trust_forwarded_for {
        forwarded_client_ip(request.headers())
    } else {
        None
    };

    forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// First valid address in `X-Forwarded-For`.
fn forwarded_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok())
}
