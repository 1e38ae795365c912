//! # Transcription Engine
//!
//! Owns the loaded Whisper model and hands out per-window transcriptions.
//!
//! ## Loading Discipline:
//! The model is loaded at most once per location. `ensure_loaded` holds the
//! model mutex across the whole load, so concurrent callers racing on a cold
//! engine all wait for the single load instead of duplicating it. If the
//! configured location ever changes, the next call loads the new checkpoint
//! and replaces the old one.
//!
//! ## Inference Discipline:
//! Whisper decoding is CPU/GPU-heavy and the model's KV caches make it
//! stateful, so inference runs on a blocking thread under the same mutex.
//! One window is transcribed at a time; concurrent requests queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tokio::sync::Mutex;

use crate::config::ModelConfig;
use crate::device::DeviceManager;
use crate::transcription::model::{ModelFiles, WhisperModel};

struct LoadedModel {
    location: String,
    model: WhisperModel,
}

/// Shared handle to the Whisper model, cheap to clone via `Arc`.
pub struct TranscriptionEngine {
    config: ModelConfig,
    state: Arc<Mutex<Option<LoadedModel>>>,
    ready: AtomicBool,
}

/// Snapshot of engine state for health reporting.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStatus {
    pub ready: bool,
    pub location: String,
    pub device: String,
}

impl TranscriptionEngine {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(None)),
            ready: AtomicBool::new(false),
        }
    }

    /// Load the configured model if it is not already resident.
    ///
    /// Safe to call eagerly at startup (preload) and again from every
    /// request; after the first successful load it returns immediately.
    pub async fn ensure_loaded(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        if guard
            .as_ref()
            .map(|loaded| loaded.location == self.config.location)
            .unwrap_or(false)
        {
            return Ok(());
        }

        tracing::info!("Loading Whisper model from '{}'", self.config.location);
        let files = ModelFiles::locate(&self.config.location).await?;
        let device = DeviceManager::resolved_device();
        let location = self.config.location.clone();
        let model = tokio::task::spawn_blocking(move || WhisperModel::load(&files, device))
            .await
            .map_err(|e| anyhow!("model loading task failed: {}", e))??;

        tracing::info!(
            "Model '{}' ready on {}",
            location,
            DeviceManager::describe(model.device())
        );
        *guard = Some(LoadedModel { location, model });
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Transcribe a single window of 16kHz mono audio.
    ///
    /// Takes the samples by value so they can move onto the blocking thread
    /// that runs inference. Windows from concurrent requests are serialized
    /// by the model mutex.
    pub async fn transcribe_window(&self, pcm: Vec<f32>) -> Result<String> {
        self.ensure_loaded().await?;

        let state = Arc::clone(&self.state);
        let language = self.language_hint();
        tokio::task::spawn_blocking(move || {
            // blocking_lock is fine here: this closure runs on a dedicated
            // blocking thread, never on the async executor.
            let mut guard = state.blocking_lock();
            match guard.as_mut() {
                Some(loaded) => loaded.model.transcribe_window(&pcm, language.as_deref()),
                None => bail!("no model loaded"),
            }
        })
        .await
        .map_err(|e| anyhow!("transcription task failed: {}", e))?
    }

    /// Whether a model has been loaded successfully at least once.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            ready: self.is_ready(),
            location: self.config.location.clone(),
            device: DeviceManager::describe(&DeviceManager::resolved_device()),
        }
    }

    fn language_hint(&self) -> Option<String> {
        if self.config.language.is_empty() {
            None
        } else {
            Some(self.config.language.clone())
        }
    }
}
