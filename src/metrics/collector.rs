// src/metrics/collector.rs
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;
use anyhow::Result;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Request metrics
    pub requests_total: IntCounterVec,

    // Upstream metrics
    pub upstream_requests_total: IntCounterVec,
    pub upstream_response_seconds: HistogramVec,

    // Tunnels
    pub upgraded_connections_active: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Total requests by routing decision"),
            &["decision"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let upstream_requests_total = IntCounterVec::new(
            Opts::new("gateway_upstream_requests_total", "Forwarded requests by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(upstream_requests_total.clone()))?;

        let upstream_response_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gateway_upstream_response_seconds",
                "Time until the upstream response head arrived",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(upstream_response_seconds.clone()))?;

        let upgraded_connections_active = IntGauge::new(
            "gateway_upgraded_connections_active",
            "Upgraded (WebSocket) connections currently tunnelled",
        )?;
        registry.register(Box::new(upgraded_connections_active.clone()))?;

        Ok(Self {
            requests_total,
            upstream_requests_total,
            upstream_response_seconds,
            upgraded_connections_active,
        })
    }

    pub fn record_decision(&self, decision: &str) {
        self.requests_total.with_label_values(&[decision]).inc();
    }

    pub fn record_upstream(&self, outcome: &str, duration: std::time::Duration) {
        self.upstream_requests_total
            .with_label_values(&[outcome])
            .inc();

        self.upstream_response_seconds
            .with_label_values(&[outcome])
            .observe(duration.as_secs_f64());
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
