//! # Audio Artifact Handler
//!
//! Serves retained audio artifacts back to the frontend so a saved note's
//! recording can be replayed. Filenames come from note rows, but the route
//! accepts arbitrary strings, so lookups go through the store's
//! traversal-safe path resolution.

use actix_web::{web, HttpResponse};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Serve a stored audio artifact.
///
/// ## Endpoint: `GET /api/v1/audio/{filename}`
pub async fn serve_audio(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let filename = path.into_inner();
    let file_path = state.audio.path_of(&filename)?;

    let bytes = match tokio::fs::read(&file_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("Audio file not found".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(HttpResponse::Ok()
        .content_type(content_type_for(&filename))
        .body(bytes))
}

/// Media type from the stored filename's extension.
fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext) {
        Some(ext) if ext.eq_ignore_ascii_case("wav") => "audio/wav",
        Some(ext) if ext.eq_ignore_ascii_case("mp3") => "audio/mpeg",
        Some(ext) if ext.eq_ignore_ascii_case("ogg") => "audio/ogg",
        Some(ext) if ext.eq_ignore_ascii_case("m4a") => "audio/mp4",
        Some(ext) if ext.eq_ignore_ascii_case("webm") => "audio/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::NoteStore;
    use crate::storage::AudioStore;
    use crate::transcription::TranscriptionEngine;
    use actix_web::{http::StatusCode, test, App};

    fn test_state(upload_dir: &std::path::Path) -> AppState {
        let config = AppConfig::default();
        let engine = TranscriptionEngine::new(config.model.clone());
        AppState::new(
            config,
            NoteStore::open_in_memory().unwrap(),
            AudioStore::new(upload_dir),
            engine,
        )
    }

    #[actix_web::test]
    async fn test_serves_stored_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.audio.ensure_root().unwrap();
        state.audio.write("abc_memo.wav", b"RIFFdata").await.unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/audio/{filename}", web::get().to(serve_audio)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/audio/abc_memo.wav")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "audio/wav"
        );
        let body = test::read_body(resp).await;
        assert_eq!(&body[..], b"RIFFdata");
    }

    #[actix_web::test]
    async fn test_unknown_artifact_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.audio.ensure_root().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/audio/{filename}", web::get().to(serve_audio)),
        )
        .await;

        let req = test::TestRequest::get().uri("/audio/nope.wav").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_traversal_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.audio.ensure_root().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/audio/{filename}", web::get().to(serve_audio)),
        )
        .await;

        // Encoded slash so the path stays one segment.
        let req = test::TestRequest::get()
            .uri("/audio/..%2Fnotes.db")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[::core::prelude::v1::test]
    fn test_content_types() {
        assert_eq!(content_type_for("a.wav"), "audio/wav");
        assert_eq!(content_type_for("a.MP3"), "audio/mpeg");
        assert_eq!(content_type_for("a.webm"), "audio/webm");
        assert_eq!(content_type_for("mystery"), "application/octet-stream");
    }
}
