//! # Health and Status Endpoint
//!
//! One liveness endpoint that doubles as a status summary: uptime, request
//! counters, model readiness and the resolved compute device. Frontends poll
//! it to decide whether the first transcription will be fast (model resident)
//! or slow (cold load still ahead).

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::device::DeviceManager;
use crate::state::AppState;

/// ## Endpoint: `GET /health`
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();
    let engine = state.engine.status();
    let note_count = state.notes.count().unwrap_or(-1);

    let endpoints: Vec<serde_json::Value> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "average_duration_ms": metric.average_duration_ms(),
            })
        })
        .collect();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "model": {
            "location": engine.location,
            "ready": engine.ready,
            "device": engine.device,
        },
        "device": DeviceManager::summary(),
        "notes": {
            "count": note_count,
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "active_jobs": metrics.active_jobs,
            "endpoints": endpoints,
        },
    }))
}
