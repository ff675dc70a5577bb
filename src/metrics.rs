//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("habwatch_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");

    // Queue Metrics
    pub static ref QUEUE_ITEMS_ENQUEUED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("habwatch_queue_items_enqueued_total", "Total number of queue items enqueued"),
        &["hotel"]
    ).expect("metric can be created");
    pub static ref QUEUE_ITEMS_PROCESSED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("habwatch_queue_items_processed_total", "Total number of queue items resolved"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref QUEUE_DEPTH: IntGaugeVec = IntGaugeVec::new(
        Opts::new("habwatch_queue_depth", "Current number of queue items per status"),
        &["status"]
    ).expect("metric can be created");
    pub static ref LEASES_RECLAIMED_TOTAL: prometheus::IntCounter = prometheus::IntCounter::new(
        "habwatch_leases_reclaimed_total",
        "Total number of expired processing leases reclaimed"
    ).expect("metric can be created");

    // Tracker Metrics
    pub static ref ACTIVITIES_DETECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("habwatch_activities_detected_total", "Total number of activities detected"),
        &["activity_type"]
    ).expect("metric can be created");
    pub static ref CYCLE_DURATION_SECONDS: prometheus::Histogram = prometheus::Histogram::with_opts(
        HistogramOpts::new(
            "habwatch_cycle_duration_seconds",
            "Duration of one process_queue cycle in seconds"
        ).buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0])
    ).expect("metric can be created");

    // Hotel API Metrics
    pub static ref HOTEL_API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("habwatch_hotel_api_requests_total", "Total number of hotel API requests"),
        &["resource", "status"]
    ).expect("metric can be created");
    pub static ref HOTEL_API_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "habwatch_hotel_api_request_duration_seconds",
            "Hotel API request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["resource"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("habwatch_errors_total", "Total number of errors"),
        &["error_type", "endpoint"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("HTTP_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(QUEUE_ITEMS_ENQUEUED_TOTAL.clone()))
        .expect("QUEUE_ITEMS_ENQUEUED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(QUEUE_ITEMS_PROCESSED_TOTAL.clone()))
        .expect("QUEUE_ITEMS_PROCESSED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(QUEUE_DEPTH.clone()))
        .expect("QUEUE_DEPTH can be registered");
    REGISTRY
        .register(Box::new(LEASES_RECLAIMED_TOTAL.clone()))
        .expect("LEASES_RECLAIMED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ACTIVITIES_DETECTED_TOTAL.clone()))
        .expect("ACTIVITIES_DETECTED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CYCLE_DURATION_SECONDS.clone()))
        .expect("CYCLE_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(HOTEL_API_REQUESTS_TOTAL.clone()))
        .expect("HOTEL_API_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(HOTEL_API_REQUEST_DURATION_SECONDS.clone()))
        .expect("HOTEL_API_REQUEST_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
