//! Prometheus metrics of the HTTP surface and of payment reconciliation.

use std::time::Duration;

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};

/// Metrics collects and exposes HTTP server metrics.
pub struct Metrics {
    registry: Registry,
    http_requests_total: CounterVec,
    http_request_duration_seconds: HistogramVec,
    errors_total: CounterVec,
    network_traffic_bytes: CounterVec,
    payment_events_total: CounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "endpoint"],
        )?;

        let errors_total = CounterVec::new(
            Opts::new("errors_total", "Total number of errors"),
            &["source", "endpoint"],
        )?;

        let network_traffic_bytes = CounterVec::new(
            Opts::new("network_traffic_bytes", "Network traffic in bytes"),
            &["direction"],
        )?;

        let payment_events_total = CounterVec::new(
            Opts::new(
                "payment_events_total",
                "Payment reconciliation events by channel and outcome",
            ),
            &["channel", "outcome"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(network_traffic_bytes.clone()))?;
        registry.register(Box::new(payment_events_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            errors_total,
            network_traffic_bytes,
            payment_events_total,
        })
    }

    pub fn record_request(&self, method: &str, endpoint: &str, status: u16, duration: Duration) {
        self.http_requests_total
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration.as_secs_f64());
    }

    pub fn record_error(&self, source: &str, endpoint: &str) {
        self.errors_total.with_label_values(&[source, endpoint]).inc();
    }

    pub fn record_network_traffic(&self, direction: &str, bytes: usize) {
        self.network_traffic_bytes
            .with_label_values(&[direction])
            .inc_by(bytes as f64);
    }

    pub fn record_payment_event(&self, channel: &str, outcome: &str) {
        self.payment_events_total
            .with_label_values(&[channel, outcome])
            .inc();
    }

    /// Renders all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();

        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| e.to_string())?;
        String::from_utf8(buffer).map_err(|e| e.to_string())
    }
}
