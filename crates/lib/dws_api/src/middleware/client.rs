//! Caller origin extraction.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use dws_core::models::auth::ClientMeta;

/// Client IP and user agent of the current request.
///
/// The IP is the first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// socket peer address.
#[derive(Debug, Clone)]
pub struct Client(pub ClientMeta);

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn client_ip(parts: &Parts) -> String {
    if let Some(forwarded) = header_str(&parts.headers, "x-forwarded-for")
        && let Some(first) = forwarded.split(',').map(str::trim).find(|h| !h.is_empty())
    {
        return first.to_string();
    }
    if let Some(real) = header_str(&parts.headers, "x-real-ip") {
        return real.to_string();
    }
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl<S> FromRequestParts<S> for Client
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        Ok(Client(ClientMeta::new(client_ip(parts), user_agent)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)], peer: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        if let Some(peer) = peer {
            parts
                .extensions
                .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        }
        parts
    }

    #[test]
    fn forwarded_for_first_hop_wins() {
        let p = parts(
            &[
                ("x-forwarded-for", " 203.0.113.7 , 10.0.0.1"),
                ("x-real-ip", "198.51.100.2"),
            ],
            Some("127.0.0.1:4000"),
        );
        assert_eq!(client_ip(&p), "203.0.113.7");
    }

    #[test]
    fn falls_back_to_real_ip_then_peer() {
        let p = parts(&[("x-real-ip", "198.51.100.2")], Some("127.0.0.1:4000"));
        assert_eq!(client_ip(&p), "198.51.100.2");

        let p = parts(&[], Some("192.0.2.9:4000"));
        assert_eq!(client_ip(&p), "192.0.2.9");

        assert_eq!(client_ip(&parts(&[], None)), "unknown");
    }
}
