//! # Chunked Transcription Pipeline
//!
//! Drives one uploaded recording from decoded samples to a persisted note,
//! reporting progress along the way.
//!
//! ## Job Lifecycle:
//! 1. Decode the upload to 16kHz mono and split it into windows
//! 2. Transcribe windows in order, one inference at a time
//! 3. Emit a progress event after each window completes
//! 4. Join the non-empty window texts and decide the outcome
//!
//! ## Outcomes:
//! - **Saved**: text was produced; a note row now references the audio file
//! - **Discarded**: every window came back empty; the upload is deleted
//! - **Failed**: decoding or persistence blew up; the upload is deleted
//!
//! A failed *window* is not a failed job: inference errors are logged, the
//! window contributes no text, and the job moves on. Progress consumers see
//! exactly one terminal event (`done` or `error`) unless they disconnect
//! first, in which case the job is abandoned and no terminal is sent.

use std::future::Future;

use anyhow::{anyhow, Result};
use candle_transformers::models::whisper as m;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::audio;
use crate::db::{Note, NoteStore};
use crate::storage::AudioStore;

/// Message shown when a recording produced no usable text.
pub const NO_TEXT_MESSAGE: &str = "No transcription text was produced.";

/// Message shown when the job itself failed.
pub const FAILURE_MESSAGE: &str = "Error during transcription.";

/// Outcome of transcribing a single window.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    /// 1-based position of the window within the recording
    pub index: usize,
    /// Total number of windows in the recording
    pub total: usize,
    /// Trimmed transcription text, empty when the window produced nothing
    pub text: String,
    /// Whether inference failed for this window
    pub failed: bool,
}

/// Progress protocol records, one JSON object per line on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Progress {
        chunk: usize,
        total: usize,
    },
    Done {
        saved: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        message: String,
    },
}

/// Final state of a transcription job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Saved,
    Discarded,
    Failed,
}

/// Everything a caller needs to answer for a finished job.
#[derive(Debug)]
pub struct JobOutcome {
    pub state: JobState,
    /// The persisted note, present only when `state` is `Saved`
    pub note: Option<Note>,
    /// Human-readable detail for unsaved outcomes
    pub message: Option<String>,
    pub chunks_total: usize,
    pub chunks_failed: usize,
}

impl JobOutcome {
    fn failed(chunks_total: usize, chunks_failed: usize, message: Option<String>) -> Self {
        Self {
            state: JobState::Failed,
            note: None,
            message,
            chunks_total,
            chunks_failed,
        }
    }
}

/// Run a transcription job for a stored upload.
///
/// `infer` transcribes one window of 16kHz mono samples; injecting it keeps
/// the pipeline independent of how the model is hosted. Events are pushed
/// into `events` as the job advances. If the receiver goes away mid-job the
/// remaining windows are skipped and the upload is removed, since nobody is
/// left to act on the result.
pub async fn run_transcription_job<F, Fut>(
    notes: &NoteStore,
    audio_store: &AudioStore,
    stored_name: &str,
    window_seconds: usize,
    events: mpsc::Sender<ProgressEvent>,
    mut infer: F,
) -> JobOutcome
where
    F: FnMut(Vec<f32>) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let windows = match prepare_windows(audio_store, stored_name, window_seconds).await {
        Ok(windows) => windows,
        Err(e) => {
            tracing::error!("Failed to prepare {} for transcription: {:#}", stored_name, e);
            return fail_job(audio_store, stored_name, &events, 0, 0).await;
        }
    };

    let total = windows.len();
    tracing::info!("Transcribing {} window(s) from {}", total, stored_name);

    let mut texts: Vec<String> = Vec::new();
    let mut chunks_failed = 0usize;

    for (i, window) in windows.into_iter().enumerate() {
        let result = transcribe_window(&mut infer, window, i + 1, total).await;
        if result.failed {
            chunks_failed += 1;
        } else if !result.text.is_empty() {
            texts.push(result.text);
        }

        let progress = ProgressEvent::Progress {
            chunk: result.index,
            total: result.total,
        };
        if events.send(progress).await.is_err() {
            // Receiver is gone, so the client disconnected. Stop burning
            // inference time and drop the upload; there is no terminal event
            // because nobody is listening for one.
            tracing::info!("Progress listener went away, abandoning job for {}", stored_name);
            discard_upload(audio_store, stored_name).await;
            return JobOutcome::failed(total, chunks_failed, None);
        }
    }

    let content = texts.join(" ").trim().to_string();

    if content.is_empty() {
        tracing::info!("No text produced for {}, discarding upload", stored_name);
        discard_upload(audio_store, stored_name).await;
        let message = NO_TEXT_MESSAGE.to_string();
        let done = ProgressEvent::Done {
            saved: false,
            message: Some(message.clone()),
        };
        let _ = events.send(done).await;
        return JobOutcome {
            state: JobState::Discarded,
            note: None,
            message: Some(message),
            chunks_total: total,
            chunks_failed,
        };
    }

    match notes.insert(&content, Some(stored_name)) {
        Ok(note) => {
            tracing::info!(
                "Saved note {} ({} chars from {} window(s), {} failed)",
                note.id,
                content.len(),
                total,
                chunks_failed
            );
            let done = ProgressEvent::Done {
                saved: true,
                message: None,
            };
            let _ = events.send(done).await;
            JobOutcome {
                state: JobState::Saved,
                note: Some(note),
                message: None,
                chunks_total: total,
                chunks_failed,
            }
        }
        Err(e) => {
            tracing::error!("Failed to persist note for {}: {}", stored_name, e);
            fail_job(audio_store, stored_name, &events, total, chunks_failed).await
        }
    }
}

/// Decode the stored upload and cut it into inference-sized windows.
///
/// Decoding and resampling are pure CPU work, so they run off the async
/// executor.
async fn prepare_windows(
    audio_store: &AudioStore,
    stored_name: &str,
    window_seconds: usize,
) -> Result<Vec<Vec<f32>>> {
    let path = audio_store.path_of(stored_name)?;
    tokio::task::spawn_blocking(move || {
        let samples = audio::load_waveform(&path, m::SAMPLE_RATE as u32)?;
        Ok(audio::segment_waveform(&samples, m::SAMPLE_RATE, window_seconds))
    })
    .await
    .map_err(|e| anyhow!("audio decoding task failed: {}", e))?
}

async fn transcribe_window<F, Fut>(
    infer: &mut F,
    window: Vec<f32>,
    index: usize,
    total: usize,
) -> ChunkResult
where
    F: FnMut(Vec<f32>) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let samples = window.len();
    match infer(window).await {
        Ok(text) => {
            let text = text.trim().to_string();
            tracing::debug!(
                "Window {}/{}: {} samples -> {} chars",
                index,
                total,
                samples,
                text.len()
            );
            ChunkResult {
                index,
                total,
                text,
                failed: false,
            }
        }
        Err(e) => {
            tracing::warn!("Window {}/{} failed: {:#}", index, total, e);
            ChunkResult {
                index,
                total,
                text: String::new(),
                failed: true,
            }
        }
    }
}

/// Terminal failure path: the upload is removed and listeners get one error
/// event. Send failures are ignored, the outcome already stands.
async fn fail_job(
    audio_store: &AudioStore,
    stored_name: &str,
    events: &mpsc::Sender<ProgressEvent>,
    chunks_total: usize,
    chunks_failed: usize,
) -> JobOutcome {
    discard_upload(audio_store, stored_name).await;
    let error = ProgressEvent::Error {
        message: FAILURE_MESSAGE.to_string(),
    };
    let _ = events.send(error).await;
    JobOutcome::failed(chunks_total, chunks_failed, Some(FAILURE_MESSAGE.to_string()))
}

async fn discard_upload(audio_store: &AudioStore, stored_name: &str) {
    if let Err(e) = audio_store.delete(stored_name).await {
        tracing::warn!("Failed to remove upload {}: {}", stored_name, e);
    }
}
