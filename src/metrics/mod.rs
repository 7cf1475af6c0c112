/*!
 * # Metrics Module
 *
 * In-process counters and histograms for the BuyTrack API, exported in the
 * Prometheus text format at `/metrics`.
 *
 * Recorded series:
 *
 * - `http_requests_total` and `http_responses_{2xx,3xx,4xx,5xx}_total`
 * - `http_request_duration_seconds`
 * - `orders_created_total`
 * - `pdf_rendered_total`, `pdf_render_failures_total`, `pdf_render_duration_seconds`
 * - `auth_success_total`, `auth_failures_total`
 */

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Count and sum of observed durations. The sum is kept in microseconds.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    sum_micros: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    pub fn observe(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum_seconds(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
    histograms: DashMap<String, Histogram>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_counter(&self, name: &str) -> Counter {
        self.counters
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn get_or_create_histogram(&self, name: &str) -> Histogram {
        self.histograms
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Renders every series in the Prometheus text format, sorted by name.
    pub fn export_metrics(&self) -> String {
        let mut counters: Vec<(String, u64)> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get()))
            .collect();
        counters.sort();

        let mut histograms: Vec<(String, u64, f64)> = self
            .histograms
            .iter()
            .map(|entry| {
                let h = entry.value();
                (entry.key().clone(), h.get_count(), h.get_sum_seconds())
            })
            .collect();
        histograms.sort_by(|a, b| a.0.cmp(&b.0));

        let mut output = String::new();
        for (name, value) in counters {
            let _ = writeln!(output, "# TYPE {} counter", name);
            let _ = writeln!(output, "{} {}", name, value);
        }
        for (name, count, sum) in histograms {
            let _ = writeln!(output, "# TYPE {} summary", name);
            let _ = writeln!(output, "{}_count {}", name, count);
            let _ = writeln!(output, "{}_sum {:.6}", name, sum);
        }
        output
    }
}

// Global metrics registry
lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

pub fn increment_counter(name: &str) {
    METRICS.get_or_create_counter(name).inc();
}

pub fn observe_duration(name: &str, duration: Duration) {
    METRICS.get_or_create_histogram(name).observe(duration);
}

pub fn record_order_created() {
    increment_counter("orders_created_total");
}

pub fn record_pdf_rendered(duration: Duration) {
    increment_counter("pdf_rendered_total");
    observe_duration("pdf_render_duration_seconds", duration);
}

pub fn record_pdf_failed() {
    increment_counter("pdf_render_failures_total");
}

pub fn record_auth_attempt(success: bool) {
    if success {
        increment_counter("auth_success_total");
    } else {
        increment_counter("auth_failures_total");
    }
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

/// Counts every request by response status class and records its latency.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;

    increment_counter("http_requests_total");
    increment_counter(&format!(
        "http_responses_{}_total",
        status_class(response.status())
    ));
    observe_duration("http_request_duration_seconds", start.elapsed());

    response
}

/// `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_metrics(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_lists_counters_then_summaries() {
        let registry = MetricsRegistry::new();
        registry.get_or_create_counter("b_total").inc();
        registry.get_or_create_counter("a_total").inc();
        registry.get_or_create_counter("a_total").inc();
        registry
            .get_or_create_histogram("render_seconds")
            .observe(Duration::from_millis(1500));

        let text = registry.export_metrics();
        let a = text.find("a_total 2").unwrap();
        let b = text.find("b_total 1").unwrap();
        assert!(a < b);
        assert!(text.contains("render_seconds_count 1"));
        assert!(text.contains("render_seconds_sum 1.500000"));
    }

    #[test]
    fn status_classes() {
        assert_eq!(status_class(StatusCode::OK), "2xx");
        assert_eq!(status_class(StatusCode::NOT_FOUND), "4xx");
        assert_eq!(status_class(StatusCode::BAD_GATEWAY), "5xx");
    }

    #[test]
    fn counters_share_state_across_handles() {
        let registry = MetricsRegistry::new();
        let first = registry.get_or_create_counter("orders_created_total");
        first.inc();
        assert_eq!(registry.get_or_create_counter("orders_created_total").get(), 1);
    }
}
