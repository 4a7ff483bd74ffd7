// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Market data --------
pub static FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ticker_fetches_total",
            "bybit ticker fetches (labels: category, outcome=ok|empty|error)",
        ),
        &["category", "outcome"],
    )
    .unwrap()
});

// -------- Insight engine --------
pub static INSIGHT_REPORTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("insight_reports_total", "insight reports computed").unwrap());

pub static INSIGHT_FACETS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("insight_facets_total", "facets present in computed reports"),
        &["facet"],
    )
    .unwrap()
});

// -------- API / Slack --------
pub static HTTP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("http_requests_total", "api requests (labels: route, status)"),
        &["route", "status"],
    )
    .unwrap()
});

pub static SLACK_MESSAGES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "slack_messages_total",
            "slack webhook deliveries (outcome=ok|error|skipped)",
        ),
        &["outcome"],
    )
    .unwrap()
});

// ---- Config visibility ----
pub static CONFIG_QUOTE_ASSET: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_quote_asset", "quote asset appended to symbols (label: asset)"),
        &["asset"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(FETCHES.clone())),
        REGISTRY.register(Box::new(INSIGHT_REPORTS.clone())),
        REGISTRY.register(Box::new(INSIGHT_FACETS.clone())),
        REGISTRY.register(Box::new(HTTP_REQUESTS.clone())),
        REGISTRY.register(Box::new(SLACK_MESSAGES.clone())),
        REGISTRY.register(Box::new(CONFIG_QUOTE_ASSET.clone())),
    ] {
        let _ = m;
    }
}

/// Hitung report + facet yang muncul
pub fn observe_report(report: &crate::insight::InsightReport) {
    INSIGHT_REPORTS.inc();
    for (facet, _) in report.entries() {
        INSIGHT_FACETS.with_label_values(&[facet]).inc();
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}
