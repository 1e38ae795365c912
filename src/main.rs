//! # Voice Notes Backend - Main Application Entry Point
//!
//! HTTP server that turns uploaded audio into persisted text notes by running
//! a Whisper model over fixed-length audio windows.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, config.toml, environment)
//! - **state**: shared application state and request metrics
//! - **db** / **storage**: the notes table and the audio artifact directory
//! - **audio**: decoding, down-mixing and windowing of uploads
//! - **transcription**: model residency, per-window inference, the job pipeline
//! - **handlers**: JSON/NDJSON route layer
//! - **middleware**: request logging and metrics collection
//! - **error**: error taxonomy and HTTP error responses

mod audio;
mod config;
mod db;
mod device;
mod error;
mod handlers;
mod health;
mod middleware;
mod state;
mod storage;
mod transcription;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::AppConfig;
use db::NoteStore;
use state::AppState;
use storage::AudioStore;
use transcription::TranscriptionEngine;

/// Global shutdown flag set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// Startup order matters: logging first so every later failure is visible,
/// then config, then the stores (schema creation, upload directory), then the
/// engine. The model preload is best-effort - a failure is logged and the
/// first transcription request retries the load.
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voice-notes-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{}, model '{}', window {}s",
        config.server.host,
        config.server.port,
        config.model.location,
        config.transcription.window_seconds
    );

    let notes = NoteStore::open(&config.storage.database_path)
        .with_context(|| format!("failed to open database {}", config.storage.database_path))?;
    let audio_store = AudioStore::new(&config.storage.upload_dir);
    audio_store
        .ensure_root()
        .with_context(|| format!("failed to create upload dir {}", config.storage.upload_dir))?;

    let engine = TranscriptionEngine::new(config.model.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let cors_permissive = config.server.cors_permissive;
    let preload = config.model.preload;

    let app_state = AppState::new(config, notes, audio_store, engine);

    if preload {
        if let Err(e) = app_state.engine.ensure_loaded().await {
            warn!("Model preload failed, will retry on first request: {:#}", e);
        }
    }

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = if cors_permissive {
            Cors::permissive()
        } else {
            Cors::default()
        };

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/notes", web::get().to(handlers::list_notes))
                    .route("/notes", web::post().to(handlers::create_note))
                    .route("/notes/{id}", web::get().to(handlers::get_note))
                    .route("/notes/{id}", web::put().to(handlers::update_note))
                    .route("/notes/{id}", web::delete().to(handlers::delete_note))
                    .route("/notes/{id}/download", web::get().to(handlers::download_note))
                    .route("/transcribe", web::post().to(handlers::transcribe))
                    .route("/audio/{filename}", web::get().to(handlers::serve_audio))
                    .route("/ping", web::post().to(handlers::heartbeat)),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Race the server against the shutdown signal.
    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Structured logging to the console; `RUST_LOG` overrides the default
/// filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_notes_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Listen for SIGTERM/SIGINT and set the shutdown flag, so in-flight requests
/// get to finish before the process exits.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
