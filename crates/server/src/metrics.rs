//! Prometheus metrics for the plinth server.
//!
//! Exposes counters for uploads, archive rejections, identifier collisions,
//! site record recovery and routing reloads.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no identifiers or user data, only aggregate counts. The
//! endpoint should still be network-restricted to the scraper.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Upload metrics
pub static UPLOADS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("plinth_uploads_total", "Total uploads by outcome"),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "plinth_upload_duration_seconds",
            "Time from receiving an archive to the site being recorded",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("metric creation failed")
});

pub static VALIDATION_REJECTIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "plinth_validation_rejections_total",
            "Archive rejections by kind (one per offending entry)",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

// Identifier metrics
pub static IDENTIFIER_COLLISIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "plinth_identifier_collisions_total",
            "Identifier draws that collided, by the stage that detected it",
        ),
        &["stage"],
    )
    .expect("metric creation failed")
});

// Lifecycle metrics
pub static SITES_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("plinth_sites_deleted_total", "Total sites deleted")
        .expect("metric creation failed")
});

pub static SITES_RENAMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("plinth_sites_renamed_total", "Total sites renamed")
        .expect("metric creation failed")
});

pub static SITE_RESURRECTIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "plinth_site_resurrections_total",
        "Site records restored after their directory could not be removed",
    )
    .expect("metric creation failed")
});

pub static SITE_RESURRECTION_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "plinth_site_resurrection_failures_total",
        "Site records that could not be restored, leaving an orphaned directory",
    )
    .expect("metric creation failed")
});

// Background metrics
pub static ROUTING_RELOADS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("plinth_routing_reloads_total", "Routing reloads by outcome"),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static SCRATCH_FILES_SWEPT: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "plinth_scratch_files_swept_total",
        "Stale upload buffers removed from the scratch directory",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Safe to call more than once; only the first call registers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(UPLOADS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(VALIDATION_REJECTIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IDENTIFIER_COLLISIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SITES_DELETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SITES_RENAMED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SITE_RESURRECTIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SITE_RESURRECTION_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ROUTING_RELOADS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SCRATCH_FILES_SWEPT.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        register_metrics();
        register_metrics();
    }

    #[test]
    fn test_labelled_counters_are_exported() {
        register_metrics();
        UPLOADS.with_label_values(&["created"]).inc();
        VALIDATION_REJECTIONS
            .with_label_values(&["path_traversal"])
            .inc();

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&REGISTRY.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("plinth_uploads_total{outcome=\"created\"}"));
        assert!(text.contains("plinth_validation_rejections_total{kind=\"path_traversal\"}"));
    }
}
