//! Prometheus metrics for observability and monitoring.
//!
//! This module describes the metrics recorded by the Store runtime and by the
//! booking workflow, and installs a Prometheus recorder. Serving the rendered
//! text to a scraper is left to the host:
//! - Reducer execution and effect handling (`store.*`)
//! - Deferred bookings, limit checks and OTP challenges (`booking.*`)
//!
//! # Example
//!
//! ```rust,no_run
//! use azurea_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//! let text = recorder.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder.
///
/// Installs the global recorder and renders the exposition text. It does not
/// listen on any address.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Create a recorder that has not been installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// If a recorder is already installed (e.g., in tests) this logs a warning
    /// and succeeds without a handle.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the global recorder was not installed by this value.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Store
    describe_counter!("store.commands.total", "Total number of actions sent to stores");
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time taken to run a reducer for one action"
    );
    describe_histogram!("store.effects.count", "Number of effects returned per action");
    describe_counter!("store.effects.executed", "Effects executed, labelled by type");
    describe_counter!("store.shutdown.initiated", "Graceful shutdowns started");
    describe_counter!("store.shutdown.completed", "Graceful shutdowns that drained all effects");
    describe_counter!("store.shutdown.timeout", "Graceful shutdowns that timed out");
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Actions rejected because the store was shutting down"
    );

    // Booking workflow
    describe_counter!("booking.drafts.held", "Drafts held while the guest authenticates");
    describe_counter!(
        "booking.drafts.overwritten",
        "Held drafts replaced by a newer draft"
    );
    describe_counter!("booking.drafts.discarded", "Held drafts discarded before resumption");
    describe_counter!("booking.drafts.resumed", "Held drafts resumed after authentication");
    describe_counter!(
        "booking.submissions",
        "Booking submissions, labelled by outcome"
    );
    describe_counter!(
        "booking.duplicates_rejected",
        "Submissions refused because the draft was already consumed or in flight"
    );
    describe_counter!("booking.limit.blocked", "Submissions blocked by the daily booking limit");
    describe_counter!(
        "booking.limit.fail_open",
        "Booking limit checks that failed and defaulted to allowed"
    );
    describe_counter!("booking.otp.sent", "OTP codes sent or re-sent");
    describe_counter!(
        "booking.otp.resend_rejected",
        "Resend requests rejected during the cooldown window"
    );
    describe_counter!("booking.otp.stale_results", "OTP results ignored for a replaced challenge");
}
