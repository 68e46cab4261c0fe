use axum::{
    Router,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::metrics::Metrics;
use crate::rate_limit::ClientTracker;

pub const FORWARDED_FOR: &str = "x-forwarded-for";

// Shared state for the admission middleware
#[derive(Clone)]
pub struct AdmissionControl {
    pub tracker: Arc<ClientTracker>,
    pub metrics: Option<Arc<Metrics>>,
}

impl AdmissionControl {
    pub fn new(tracker: Arc<ClientTracker>, metrics: Option<Arc<Metrics>>) -> Self {
        Self { tracker, metrics }
    }

    /// Wraps every route of `router`, including the fallback, in the limiter.
    pub fn install<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(self, rate_limit))
    }
}

/// Resolves the identity a request is counted against.
///
/// The first entry of `X-Forwarded-For` wins when the header is present,
/// valid UTF-8 and its first entry is non-empty; otherwise the peer IP with
/// its port stripped. Requests with neither end up in one shared bucket under
/// the empty identity.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty());

    if let Some(first) = forwarded {
        return first.to_string();
    }

    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

pub async fn rate_limit(
    State(admission): State<AdmissionControl>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = client_identity(request.headers(), peer);

    let decision = admission.tracker.check(&identity);

    if let Some(metrics) = &admission.metrics {
        metrics
            .tracked_clients
            .set(admission.tracker.tracked_clients() as i64);
    }

    if !decision.allowed {
        info!(
            identity = %identity,
            path = %request.uri().path(),
            count = decision.count,
            expires_in = ?decision.retry_after,
            "request denied"
        );
        if let Some(metrics) = &admission.metrics {
            metrics.rate_limit_rejections.inc();
        }
        return too_many_requests(decision.retry_after);
    }

    debug!(
        identity = %identity,
        path = %request.uri().path(),
        count = decision.count,
        "request allowed"
    );
    next.run(request).await
}

fn too_many_requests(retry_after: Duration) -> Response {
    // whole seconds, rounded up, never 0
    let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, seconds.max(1).to_string())],
        "Rate limit exceeded",
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn peer(addr: &str) -> Option<SocketAddr> {
        Some(addr.parse().unwrap())
    }

    #[test]
    fn takes_first_forwarded_entry() {
        let headers = forwarded("1.2.3.4, 5.6.7.8");
        assert_eq!(client_identity(&headers, peer("9.9.9.9:54321")), "1.2.3.4");
    }

    #[test]
    fn single_forwarded_entry_is_kept_whole() {
        let headers = forwarded("1.2.3.4");
        assert_eq!(client_identity(&headers, None), "1.2.3.4");
    }

    #[test]
    fn forwarded_entry_is_trimmed() {
        let headers = forwarded("  10.0.0.1  ,10.0.0.2");
        assert_eq!(client_identity(&headers, None), "10.0.0.1");
    }

    #[test]
    fn falls_back_to_peer_without_port() {
        assert_eq!(
            client_identity(&HeaderMap::new(), peer("9.9.9.9:54321")),
            "9.9.9.9"
        );
    }

    #[test]
    fn ipv6_peer_loses_brackets_and_port() {
        assert_eq!(client_identity(&HeaderMap::new(), peer("[::1]:8080")), "::1");
    }

    #[test]
    fn empty_forwarded_header_falls_back_to_peer() {
        let headers = forwarded("");
        assert_eq!(client_identity(&headers, peer("9.9.9.9:1")), "9.9.9.9");

        let headers = forwarded(" , 5.6.7.8");
        assert_eq!(client_identity(&headers, peer("9.9.9.9:1")), "9.9.9.9");
    }

    #[test]
    fn non_utf8_forwarded_header_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR,
            HeaderValue::from_bytes(b"1.2.3.4\xff, 5.6.7.8").unwrap(),
        );

        assert_eq!(client_identity(&headers, peer("9.9.9.9:1")), "9.9.9.9");
    }

    #[test]
    fn unknown_peer_maps_to_empty_identity() {
        assert_eq!(client_identity(&HeaderMap::new(), None), "");
    }

    #[test]
    fn retry_after_rounds_up() {
        let response = too_many_requests(Duration::from_millis(1500));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");

        let response = too_many_requests(Duration::ZERO);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }
}
