//! # Transcription Upload Handler
//!
//! Accepts an audio upload, stages it in the audio store, and runs the
//! chunked transcription pipeline over it.
//!
//! ## Two response modes:
//! - **Streaming** (`X-Transcribe-Stream: 1`): an NDJSON body flushed one
//!   progress record per line while the job runs, ending with exactly one
//!   terminal record (`done` or `error`). The job runs in a spawned task; if
//!   the client disconnects, the dropped receiver tells the pipeline to
//!   abandon the job and clean up the upload.
//! - **Synchronous** (no header): the request blocks until the job finishes
//!   and answers with one JSON object describing the outcome.
//!
//! Upload validation (field present, extension allow-listed, size cap)
//! happens before any file is written, so a rejected upload leaves no state
//! behind.

use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::storage::{AudioStore, AudioUpload};
use crate::transcription::{run_transcription_job, JobState, ProgressEvent, TranscriptionEngine};

/// Header that selects the streaming progress protocol.
const STREAM_HEADER: &str = "X-Transcribe-Stream";

/// How many progress events may queue before the producer awaits the
/// consumer. Small on purpose: it keeps progress delivery close to real time
/// without letting a slow reader buffer a whole job.
const EVENT_BUFFER: usize = 16;

/// Transcribe an uploaded audio file into a note.
///
/// ## Endpoint: `POST /api/v1/transcribe`
///
/// ## Request:
/// Multipart form data with the audio file in a field named "audio".
///
/// ## Response (synchronous):
/// ```json
/// { "saved": true, "note_id": 7 }
/// ```
/// or, when nothing was saved:
/// ```json
/// { "saved": false, "message": "No transcription text was produced." }
/// ```
///
/// ## Response (streaming):
/// `application/x-ndjson`, one record per line:
/// ```json
/// {"type":"progress","chunk":1,"total":3}
/// {"type":"progress","chunk":2,"total":3}
/// {"type":"progress","chunk":3,"total":3}
/// {"type":"done","saved":true}
/// ```
pub async fn transcribe(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: actix_multipart::Multipart,
) -> AppResult<HttpResponse> {
    let streaming = req
        .headers()
        .get(STREAM_HEADER)
        .and_then(|v| v.to_str().ok())
        == Some("1");

    let upload = stage_upload(&state, payload).await?;
    tracing::info!(
        "Accepted upload '{}' as {} ({} bytes)",
        upload.original_name,
        upload.stored_name,
        upload.bytes
    );

    if streaming {
        stream_job(state, upload)
    } else {
        run_job_blocking(state, upload).await
    }
}

/// Activity heartbeat from the frontend.
///
/// ## Endpoint: `POST /api/v1/ping`
pub async fn heartbeat() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

/// Read the multipart body, validate it, and write the audio field into the
/// store under a unique name.
async fn stage_upload(
    state: &AppState,
    mut payload: actix_multipart::Multipart,
) -> AppResult<AudioUpload> {
    let max_bytes = state.config.max_upload_bytes();
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let Some(disposition) = field.content_disposition() else {
            continue;
        };
        if disposition.get_name() != Some("audio") {
            continue;
        }
        let filename = disposition
            .get_filename()
            .map(|name| name.to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::InvalidUpload("Missing audio file.".to_string()))?;

        if !state.config.is_allowed_upload(&filename) {
            tracing::warn!("Rejected upload with disallowed extension: {}", filename);
            return Err(AppError::InvalidUpload(
                "Invalid audio file type.".to_string(),
            ));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(AppError::InvalidUpload(format!(
                    "Upload exceeds the {} MB limit",
                    state.config.storage.max_upload_mb
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        upload = Some((filename, bytes));
    }

    let (original_name, bytes) = upload
        .ok_or_else(|| AppError::InvalidUpload("Missing audio file.".to_string()))?;

    let stored_name = AudioStore::unique_name(&original_name);
    let size = bytes.len() as u64;
    state.audio.write(&stored_name, &bytes).await?;

    Ok(AudioUpload {
        stored_name,
        original_name,
        bytes: size,
    })
}

/// Streaming mode: spawn the job and answer immediately with an NDJSON body
/// fed from the job's event channel.
fn stream_job(state: web::Data<AppState>, upload: AudioUpload) -> AppResult<HttpResponse> {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    state.job_started();
    tokio::spawn(async move {
        let outcome = run_transcription_job(
            &state.notes,
            &state.audio,
            &upload.stored_name,
            state.config.transcription.window_seconds,
            tx,
            infer_with(Arc::clone(&state.engine)),
        )
        .await;
        state.job_finished();
        tracing::debug!(
            "Streaming job for {} finished: {:?} ({}/{} windows failed)",
            upload.stored_name,
            outcome.state,
            outcome.chunks_failed,
            outcome.chunks_total
        );
    });

    let body = ReceiverStream::new(rx).map(|event: ProgressEvent| {
        // Serializing ProgressEvent cannot fail; an empty line is the
        // harmless fallback if it somehow did.
        let mut line = serde_json::to_string(&event).unwrap_or_default();
        line.push('\n');
        Ok::<_, std::convert::Infallible>(web::Bytes::from(line))
    });

    // X-Accel-Buffering stops nginx-style proxies from buffering the body;
    // without it the client would see every record at once at the end.
    Ok(HttpResponse::Ok()
        .content_type("application/x-ndjson")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(body))
}

/// Synchronous mode: drain the event channel locally and report only the
/// outcome.
async fn run_job_blocking(
    state: web::Data<AppState>,
    upload: AudioUpload,
) -> AppResult<HttpResponse> {
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);

    state.job_started();
    let job = run_transcription_job(
        &state.notes,
        &state.audio,
        &upload.stored_name,
        state.config.transcription.window_seconds,
        tx,
        infer_with(Arc::clone(&state.engine)),
    );
    // The channel has to be drained concurrently or the producer would stall
    // once the buffer fills.
    let drain = async {
        while rx.recv().await.is_some() {}
    };
    let (outcome, ()) = tokio::join!(job, drain);
    state.job_finished();

    let mut body = json!({ "saved": outcome.state == JobState::Saved });
    if let Some(note) = &outcome.note {
        body["note_id"] = json!(note.id);
    }
    if let Some(message) = &outcome.message {
        body["message"] = json!(message);
    }
    Ok(HttpResponse::Ok().json(body))
}

type InferFuture = std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<String>> + Send>>;

/// Per-window inference closure over the shared engine.
fn infer_with(engine: Arc<TranscriptionEngine>) -> impl FnMut(Vec<f32>) -> InferFuture {
    move |pcm: Vec<f32>| {
        let engine = Arc::clone(&engine);
        Box::pin(async move { engine.transcribe_window(pcm).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::NoteStore;
    use actix_web::{http::StatusCode, test, App};

    fn test_state(upload_dir: &std::path::Path) -> AppState {
        let mut config = AppConfig::default();
        config.storage.upload_dir = upload_dir.display().to_string();
        let engine = TranscriptionEngine::new(config.model.clone());
        AppState::new(
            config,
            NoteStore::open_in_memory().unwrap(),
            AudioStore::new(upload_dir),
            engine,
        )
    }

    fn multipart_body(field: &str, filename: &str, data: &[u8]) -> (String, Vec<u8>) {
        let boundary = "testboundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                boundary, field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", boundary),
            body,
        )
    }

    #[actix_web::test]
    async fn test_disallowed_extension_never_reaches_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.audio.ensure_root().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/transcribe", web::post().to(transcribe)),
        )
        .await;

        let (content_type, body) = multipart_body("audio", "notes.txt", b"plain text");
        let req = test::TestRequest::post()
            .uri("/transcribe")
            .insert_header(("Content-Type", content_type))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.notes.count().unwrap(), 0);
        // Nothing was staged.
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 0);
    }

    #[actix_web::test]
    async fn test_missing_audio_field_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.audio.ensure_root().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/transcribe", web::post().to(transcribe)),
        )
        .await;

        let (content_type, body) = multipart_body("something_else", "memo.wav", b"RIFF");
        let req = test::TestRequest::post()
            .uri("/transcribe")
            .insert_header(("Content-Type", content_type))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_oversized_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.audio.ensure_root().unwrap();
        // 1 MB cap for the test.
        let mut config = (*state.config).clone();
        config.storage.max_upload_mb = 1;
        let state = AppState::new(
            config,
            state.notes.clone(),
            state.audio.clone(),
            TranscriptionEngine::new(state.config.model.clone()),
        );
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/transcribe", web::post().to(transcribe)),
        )
        .await;

        let oversized = vec![0u8; 1024 * 1024 + 1];
        let (content_type, body) = multipart_body("audio", "big.wav", &oversized);
        let req = test::TestRequest::post()
            .uri("/transcribe")
            .insert_header(("Content-Type", content_type))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 0);
    }

    #[actix_web::test]
    async fn test_heartbeat_is_no_content() {
        let app = test::init_service(
            App::new().route("/ping", web::post().to(heartbeat)),
        )
        .await;
        let req = test::TestRequest::post().uri("/ping").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
