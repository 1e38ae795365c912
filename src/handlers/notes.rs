//! # Note CRUD Handlers
//!
//! JSON endpoints for the persisted notes themselves. Transcription creates
//! notes through the pipeline; everything here is the direct-manipulation
//! surface: manual note creation, listing, editing, download and deletion.
//!
//! ## Audio-store invariant:
//! A note's `audio_path`, when present, always names a file that exists in
//! the audio store. Deletion keeps that invariant intact by removing the
//! referenced artifact together with the row.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Request body for creating or editing a note.
#[derive(Debug, Deserialize)]
pub struct NoteContent {
    pub content: String,
}

impl NoteContent {
    /// Trimmed content, rejecting empty or whitespace-only input. Notes are
    /// never stored empty.
    fn validated(&self) -> AppResult<&str> {
        let content = self.content.trim();
        if content.is_empty() {
            return Err(AppError::Validation(
                "Note content cannot be empty".to_string(),
            ));
        }
        Ok(content)
    }
}

/// List all notes, most recent first.
///
/// ## Endpoint: `GET /api/v1/notes`
pub async fn list_notes(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let notes = state.notes.list()?;
    Ok(HttpResponse::Ok().json(json!({ "notes": notes })))
}

/// Create a note from manually-typed text.
///
/// ## Endpoint: `POST /api/v1/notes`
///
/// Manual notes never reference an audio artifact; only the transcription
/// pipeline sets `audio_path`.
pub async fn create_note(
    state: web::Data<AppState>,
    body: web::Json<NoteContent>,
) -> AppResult<HttpResponse> {
    let content = body.validated()?;
    let note = state.notes.insert(content, None)?;
    tracing::info!("Created note {} ({} chars)", note.id, note.content.len());
    Ok(HttpResponse::Created().json(note))
}

/// Fetch a single note by id.
///
/// ## Endpoint: `GET /api/v1/notes/{id}`
pub async fn get_note(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let note = state
        .notes
        .get(id)?
        .ok_or_else(|| AppError::NotFound(format!("Note {} does not exist", id)))?;
    Ok(HttpResponse::Ok().json(note))
}

/// Replace a note's content.
///
/// ## Endpoint: `PUT /api/v1/notes/{id}`
pub async fn update_note(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<NoteContent>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let content = body.validated()?;
    if !state.notes.update_content(id, content)? {
        return Err(AppError::NotFound(format!("Note {} does not exist", id)));
    }
    tracing::info!("Updated note {}", id);
    let note = state
        .notes
        .get(id)?
        .ok_or_else(|| AppError::Persistence(format!("updated note {} not found", id)))?;
    Ok(HttpResponse::Ok().json(note))
}

/// Delete a note and, if it references an audio artifact, the artifact too.
///
/// ## Endpoint: `DELETE /api/v1/notes/{id}`
///
/// The row is removed first; a leftover audio file is only a stale artifact,
/// while a row pointing at a deleted file would break the invariant clients
/// rely on.
pub async fn delete_note(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let note = state
        .notes
        .delete(id)?
        .ok_or_else(|| AppError::NotFound(format!("Note {} does not exist", id)))?;

    if let Some(audio_path) = &note.audio_path {
        match state.audio.delete(audio_path).await {
            Ok(true) => tracing::info!("Deleted note {} and audio {}", id, audio_path),
            Ok(false) => tracing::warn!(
                "Note {} referenced missing audio {}; row deleted anyway",
                id,
                audio_path
            ),
            Err(e) => tracing::warn!("Failed to delete audio {} for note {}: {}", audio_path, id, e),
        }
    } else {
        tracing::info!("Deleted note {}", id);
    }

    Ok(HttpResponse::Ok().json(json!({ "deleted": id })))
}

/// Download a note's content as a plain-text attachment.
///
/// ## Endpoint: `GET /api/v1/notes/{id}/download`
pub async fn download_note(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let note = state
        .notes
        .get(id)?
        .ok_or_else(|| AppError::NotFound(format!("Note {} does not exist", id)))?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .insert_header((
            actix_web::http::header::CONTENT_DISPOSITION,
            format!("attachment; filename=transcription_{}.txt", id),
        ))
        .body(note.content))
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

    fn routes(cfg: &mut web::ServiceConfig) {
        cfg.route("/notes", web::get().to(list_notes))
            .route("/notes", web::post().to(create_note))
            .route("/notes/{id}", web::get().to(get_note))
            .route("/notes/{id}", web::put().to(update_note))
            .route("/notes/{id}", web::delete().to(delete_note))
            .route("/notes/{id}/download", web::get().to(download_note));
    }

    #[actix_web::test]
    async fn test_manual_note_has_no_audio_path() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let app =
            test::init_service(App::new().app_data(web::Data::new(state)).configure(routes))
                .await;

        let req = test::TestRequest::post()
            .uri("/notes")
            .set_json(json!({ "content": "  typed by hand  " }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let note: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(note["content"], "typed by hand");
        assert!(note["audio_path"].is_null());
    }

    #[actix_web::test]
    async fn test_empty_content_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/notes")
            .set_json(json!({ "content": "   " }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.notes.count().unwrap(), 0);
    }

    #[actix_web::test]
    async fn test_get_update_and_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let note = state.notes.insert("draft", None).unwrap();
        let app =
            test::init_service(App::new().app_data(web::Data::new(state)).configure(routes))
                .await;

        let req = test::TestRequest::get()
            .uri(&format!("/notes/{}", note.id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::put()
            .uri(&format!("/notes/{}", note.id))
            .set_json(json!({ "content": "final" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let updated: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(updated["content"], "final");

        let req = test::TestRequest::get().uri("/notes/9999").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_delete_removes_row_and_referenced_audio() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.audio.ensure_root().unwrap();
        state.audio.write("abc_memo.wav", b"RIFF").await.unwrap();
        let note = state.notes.insert("spoken", Some("abc_memo.wav")).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::delete()
            .uri(&format!("/notes/{}", note.id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        assert!(state.notes.get(note.id).unwrap().is_none());
        assert!(!state.audio.exists("abc_memo.wav").await);
    }

    #[actix_web::test]
    async fn test_delete_without_audio_touches_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.audio.ensure_root().unwrap();
        state.audio.write("other.wav", b"RIFF").await.unwrap();
        let note = state.notes.insert("typed", None).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::delete()
            .uri(&format!("/notes/{}", note.id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // An unrelated artifact stays untouched.
        assert!(state.audio.exists("other.wav").await);
    }

    #[actix_web::test]
    async fn test_download_is_a_text_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let note = state.notes.insert("hello world", None).unwrap();
        let app =
            test::init_service(App::new().app_data(web::Data::new(state)).configure(routes))
                .await;

        let req = test::TestRequest::get()
            .uri(&format!("/notes/{}/download", note.id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp
            .headers()
            .get(actix_web::http::header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(
            disposition,
            format!("attachment; filename=transcription_{}.txt", note.id)
        );
        let body = test::read_body(resp).await;
        assert_eq!(&body[..], b"hello world");
    }
}
