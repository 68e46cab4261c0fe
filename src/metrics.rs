use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

// Prometheus collectors, owned by the app instead of living in process globals
pub struct Metrics {
    registry: Registry,
    pub requests_total: IntCounterVec,
    pub request_duration: HistogramVec,
    pub rate_limit_rejections: IntCounter,
    pub tracked_clients: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "route", "status"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Duration of HTTP requests in seconds",
            ),
            &["method", "route"],
        )?;
        let rate_limit_rejections = IntCounter::new(
            "rate_limit_rejections_total",
            "Requests rejected by the rate limiter",
        )?;
        let tracked_clients = IntGauge::new(
            "rate_limit_tracked_clients",
            "Client identities currently held by the rate limiter",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(rate_limit_rejections.clone()))?;
        registry.register(Box::new(tracked_clients.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            rate_limit_rejections,
            tracked_clients,
        })
    }

    // Text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Records count and latency for every request, labelled by route template.
pub async fn track_metrics(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    // unmatched paths share one label so scanners can't blow up cardinality
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics
        .requests_total
        .with_label_values(&[method.as_str(), route.as_str(), status.as_str()])
        .inc();
    metrics
        .request_duration
        .with_label_values(&[method.as_str(), route.as_str()])
        .observe(start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_registered_collectors() {
        let metrics = Metrics::new().unwrap();
        metrics
            .requests_total
            .with_label_values(&["GET", "/health", "200"])
            .inc();
        metrics.rate_limit_rejections.inc();
        metrics.tracked_clients.set(3);

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"http_requests_total{method="GET",route="/health",status="200"} 1"#));
        assert!(text.contains("rate_limit_rejections_total 1"));
        assert!(text.contains("rate_limit_tracked_clients 3"));
    }

    #[test]
    fn instances_do_not_share_counters() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();

        first.rate_limit_rejections.inc();

        assert_eq!(first.rate_limit_rejections.get(), 1);
        assert_eq!(second.rate_limit_rejections.get(), 0);
    }
}
