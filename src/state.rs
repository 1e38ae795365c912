//! # Application State Management
//!
//! Shared state that every HTTP request handler can reach. Handlers run
//! concurrently on a thread pool, so everything in here has to be safe to
//! share between threads.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Lets many handlers share ownership of one value
//! - **Memory safety**: The value is dropped when the last clone goes away
//! - **Thread safety**: Safe to hand across threads
//!
//! ### Interior Arcs
//! `NoteStore` and `AudioStore` carry their own `Arc` internally, so cloning
//! `AppState` is a handful of reference-count bumps, never a copy of data.
//!
//! ### RwLock only where needed
//! Configuration is fixed after startup and the model engine manages its own
//! locking, so the metrics counters are the only field behind a lock here.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::config::AppConfig;
use crate::db::NoteStore;
use crate::storage::AudioStore;
use crate::transcription::TranscriptionEngine;

/// The application state shared across all HTTP request handlers.
///
/// Cloned once per worker by actix; all clones observe the same stores,
/// engine and metrics.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, immutable once the server is up
    pub config: Arc<AppConfig>,

    /// Notes table handle
    pub notes: NoteStore,

    /// Uploaded audio artifacts on disk
    pub audio: AudioStore,

    /// Whisper engine; loads the model once and serializes inference
    pub engine: Arc<TranscriptionEngine>,

    /// Request counters, updated by middleware on every request
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started, for uptime reporting
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of error responses since server start
    pub error_count: u64,

    /// Transcription jobs currently running
    pub active_jobs: u32,

    /// Per-endpoint statistics, keyed like "POST /api/v1/transcribe"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Request statistics for one endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,

    /// Cumulative processing time across all requests (milliseconds)
    pub total_duration_ms: u64,

    pub error_count: u64,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        notes: NoteStore,
        audio: AudioStore,
        engine: TranscriptionEngine,
    ) -> Self {
        Self {
            config: Arc::new(config),
            notes,
            audio,
            engine: Arc::new(engine),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Increment the total request counter (middleware, every request).
    ///
    /// The locks here are only ever held for the duration of a counter
    /// update, so `.unwrap()` on poison is acceptable: a panic while holding
    /// the lock means the process is already going down.
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Increment the total error counter (any 4xx/5xx response).
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record one finished request against its endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Mark a transcription job as started.
    pub fn job_started(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_jobs += 1;
    }

    /// Mark a transcription job as finished, whatever its outcome.
    pub fn job_finished(&self) {
        let mut metrics = self.metrics.write().unwrap();
        // Guard against underflow if bookkeeping ever goes wrong.
        if metrics.active_jobs > 0 {
            metrics.active_jobs -= 1;
        }
    }

    /// Snapshot the counters for reporting, releasing the lock before any
    /// serialization happens.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_jobs: metrics.active_jobs,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    /// Server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average response time for this endpoint in milliseconds.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;

    fn test_state() -> AppState {
        let config = AppConfig::default();
        let notes = NoteStore::open_in_memory().unwrap();
        let audio = AudioStore::new("uploads-test");
        let engine = TranscriptionEngine::new(ModelConfig {
            location: "openai/whisper-base".to_string(),
            preload: false,
            language: "en".to_string(),
        });
        AppState::new(config, notes, audio, engine)
    }

    #[test]
    fn test_request_counters() {
        let state = test_state();
        state.increment_request_count();
        state.increment_request_count();
        state.increment_error_count();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.error_count, 1);
    }

    #[test]
    fn test_endpoint_metrics_accumulate() {
        let state = test_state();
        state.record_endpoint_request("GET /api/v1/notes", 10, false);
        state.record_endpoint_request("GET /api/v1/notes", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /api/v1/notes"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.error_count, 1);
        assert!((metric.average_duration_ms() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_active_jobs_never_underflow() {
        let state = test_state();
        state.job_finished();
        assert_eq!(state.get_metrics_snapshot().active_jobs, 0);

        state.job_started();
        state.job_started();
        state.job_finished();
        assert_eq!(state.get_metrics_snapshot().active_jobs, 1);
    }
}
