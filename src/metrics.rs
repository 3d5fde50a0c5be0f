//! OpenTelemetry metrics for the Notebook controller
//!
//! Provides:
//! - Child object creation (successes and failures, by kind)
//! - Idle culling (count and last cull time per notebook)
//! - Reconcile duration and error counts

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::KeyValue;

use crate::Error;

/// Global meter for Notebook metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("notebook-controller"));

// ============================================================================
// Child Object Metrics
// ============================================================================

/// Counter of child objects created
///
/// Labels:
/// - `kind`: PersistentVolumeClaim, StatefulSet, Service, Ingress, Certificate, VirtualService
/// - `namespace`: notebook namespace
pub static CHILD_CREATIONS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("notebook_child_creations_total")
        .with_description("Total number of notebook child objects created")
        .with_unit("{objects}")
        .build()
});

/// Counter of failed child object creations
///
/// Labels:
/// - `kind`: child kind
/// - `namespace`: notebook namespace
pub static CHILD_CREATION_FAILURES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("notebook_child_creation_failures_total")
        .with_description("Total number of failed notebook child object creations")
        .with_unit("{objects}")
        .build()
});

// ============================================================================
// Culling Metrics
// ============================================================================

/// Counter of culled notebooks
///
/// Labels:
/// - `namespace`: notebook namespace
/// - `name`: notebook name
pub static CULLINGS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("notebook_culling_total")
        .with_description("Total number of idle notebooks culled")
        .with_unit("{notebooks}")
        .build()
});

/// Unix time of the last cull per notebook
pub static CULLING_TIMESTAMP: Lazy<Gauge<f64>> = Lazy::new(|| {
    METER
        .f64_gauge("notebook_culling_timestamp_seconds")
        .with_description("Unix time at which the notebook was last culled")
        .with_unit("s")
        .build()
});

// ============================================================================
// Reconcile Metrics
// ============================================================================

/// Histogram of reconcile duration
///
/// Labels:
/// - `result`: success, error
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("notebook_reconcile_duration_seconds")
        .with_description("Duration of notebook reconciliation in seconds")
        .with_unit("s")
        .build()
});

/// Counter of reconcile errors
///
/// Labels:
/// - `error_type`: conflict, transient, permanent
pub static RECONCILE_ERRORS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("notebook_reconcile_errors_total")
        .with_description("Total number of notebook reconciliation errors")
        .with_unit("{errors}")
        .build()
});

/// Label for reconcile errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Optimistic concurrency conflict
    Conflict,
    /// Will be retried
    Transient,
    /// Needs a spec change
    Permanent,
}

impl ErrorType {
    /// Classify a reconcile error
    pub fn of(error: &Error) -> Self {
        if error.is_conflict() {
            Self::Conflict
        } else if error.is_retryable() {
            Self::Transient
        } else {
            Self::Permanent
        }
    }

    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

// ============================================================================
// Metric Recording Helpers
// ============================================================================

/// Record a notebook reconciliation with timing
pub struct ReconcileTimer {
    start: std::time::Instant,
}

impl ReconcileTimer {
    /// Start timing a reconciliation
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Record successful completion
    pub fn success(self) {
        RECONCILE_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[KeyValue::new("result", "success")],
        );
    }

    /// Record error completion
    pub fn error(self, error_type: ErrorType) {
        RECONCILE_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[KeyValue::new("result", "error")],
        );
        RECONCILE_ERRORS.add(1, &[KeyValue::new("error_type", error_type.as_str())]);
    }
}

/// Record a child object creation
pub fn record_child_created(kind: &str, namespace: &str) {
    CHILD_CREATIONS.add(
        1,
        &[
            KeyValue::new("kind", kind.to_string()),
            KeyValue::new("namespace", namespace.to_string()),
        ],
    );
}

/// Record a failed child object creation
pub fn record_child_creation_failed(kind: &str, namespace: &str) {
    CHILD_CREATION_FAILURES.add(
        1,
        &[
            KeyValue::new("kind", kind.to_string()),
            KeyValue::new("namespace", namespace.to_string()),
        ],
    );
}

/// Record that a notebook was culled at `at`
pub fn record_cull(namespace: &str, name: &str, at: DateTime<Utc>) {
    let labels = [
        KeyValue::new("namespace", namespace.to_string()),
        KeyValue::new("name", name.to_string()),
    ];
    CULLINGS.add(1, &labels);
    CULLING_TIMESTAMP.record(at.timestamp() as f64, &labels);
}
