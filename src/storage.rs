//! # Audio Store
//!
//! Filesystem storage for uploaded audio. Artifacts live flat in one
//! directory under unique names (`{uuid-hex}_{sanitized original name}`), so
//! concurrent uploads of files with the same name never collide.
//!
//! An upload starts life as a transient [`AudioUpload`] owned by the
//! in-flight transcription job; the persistence step either promotes it (a
//! note now references the stored name) or deletes it.

use std::path::PathBuf;

use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// A staged upload, exclusively owned by one transcription job until the
/// keep/discard decision is made.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    /// Unique filename inside the audio store.
    pub stored_name: String,
    /// Name the client gave the file, for logging only.
    pub original_name: String,
    /// Size written to disk.
    pub bytes: u64,
}

/// Directory-backed artifact store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AudioStore {
    root: PathBuf,
}

impl AudioStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the storage directory if it does not exist.
    pub fn ensure_root(&self) -> AppResult<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Unique stored name for an uploaded file.
    pub fn unique_name(original: &str) -> String {
        format!("{}_{}", Uuid::new_v4().simple(), sanitize_filename(original))
    }

    /// Absolute path of a stored artifact. Rejects names that could escape
    /// the store directory; callers pass either names we generated or names
    /// taken from URLs.
    pub fn path_of(&self, stored_name: &str) -> AppResult<PathBuf> {
        if stored_name.is_empty()
            || stored_name == "."
            || stored_name == ".."
            || stored_name.contains('/')
            || stored_name.contains('\\')
        {
            return Err(AppError::NotFound("Audio file not found".to_string()));
        }
        Ok(self.root.join(stored_name))
    }

    /// Write a complete artifact in one call.
    pub async fn write(&self, stored_name: &str, data: &[u8]) -> AppResult<()> {
        let path = self.path_of(stored_name)?;
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    pub async fn exists(&self, stored_name: &str) -> bool {
        match self.path_of(stored_name) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Delete an artifact. Returns false if it was already gone.
    pub async fn delete(&self, stored_name: &str) -> AppResult<bool> {
        let path = self.path_of(stored_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Strip path components and replace anything outside `[A-Za-z0-9._-]`.
fn sanitize_filename(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original);
    let safe: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if safe.chars().all(|c| c == '_' || c == '.') {
        "upload".to_string()
    } else {
        safe
    }
}
